//! Catalog-wide configuration: where the database lives, which SQL dialect
//! it speaks, and the tunable indexing/merge policy flags the pipeline and
//! stack-merge engine consult.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// SQL dialect the catalog store is talking to. Only the merge engine's
/// insert-or-ignore-update form actually branches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::Sqlite
    }
}

/// Policy flags threaded through the identity resolver (C4) and the
/// stack-merge engine (C7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexOptions {
    pub stack: bool,
    pub strip_sequence: bool,
    pub skip_unchanged: bool,
    pub stack_by_meta: bool,
    pub stack_by_uuid: bool,
    pub merge_by_meta: bool,
    pub merge_by_uuid: bool,
    pub merge_by_visual: bool,
    pub yaml_restore: bool,
    pub yaml_backup: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            stack: true,
            strip_sequence: true,
            skip_unchanged: true,
            stack_by_meta: true,
            stack_by_uuid: true,
            merge_by_meta: true,
            merge_by_uuid: true,
            merge_by_visual: true,
            yaml_restore: false,
            yaml_backup: false,
        }
    }
}

/// Persisted configuration, serialized as JSON next to the catalog database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dialect: Dialect,
    pub options: IndexOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dialect: Dialect::default(),
            options: IndexOptions::default(),
        }
    }
}

/// Default catalog home: `$HOME/.local/share/<app>` style, one directory
/// per catalog, holding `catalog.db` and `config.json`.
pub fn catalog_home(app_name: &str) -> Result<PathBuf> {
    let base = dirs::home_dir().context("could not resolve home directory")?;
    Ok(base.join(format!(".{app_name}")))
}

pub fn config_path(home: &Path) -> PathBuf {
    home.join("config.json")
}

pub fn database_path(home: &Path) -> PathBuf {
    home.join("catalog.db")
}

pub fn ensure_home(home: &Path) -> Result<()> {
    fs::create_dir_all(home).with_context(|| format!("creating catalog home {home:?}"))?;
    Ok(())
}

pub fn read_config(home: &Path) -> Result<Config> {
    let path = config_path(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(&path).with_context(|| format!("reading {path:?}"))?;
    let config = serde_json::from_str(&raw).with_context(|| format!("parsing {path:?}"))?;
    Ok(config)
}

/// Write config atomically: write to a temp file in the same directory then
/// rename over the target, so a crash mid-write never leaves a truncated file.
pub fn write_config(home: &Path, config: &Config) -> Result<()> {
    ensure_home(home)?;
    let path = config_path(home);
    let tmp_path = path.with_extension("json.tmp");
    let raw = serde_json::to_string_pretty(config)?;
    fs::write(&tmp_path, raw).with_context(|| format!("writing {tmp_path:?}"))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("renaming into {path:?}"))?;
    Ok(())
}
