//! Abstract transactional repository (C2). Hides dialect differences behind
//! one seam: the merge engine's insert-or-ignore-update form.

pub mod sqlite;

use crate::config::Dialect;
use crate::error::IndexError;
use crate::model::{Details, Duplicate, File, Photo, Root};
use chrono::{DateTime, Utc};

pub use sqlite::SqliteStore;

type Result<T> = std::result::Result<T, IndexError>;

/// Which merge-candidate unions to evaluate for `find_photos_identical`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdenticalQuery<'a> {
    pub path: &'a str,
    pub name: &'a str,
    pub uuid: Option<&'a str>,
    pub meta_key: Option<MetaKey<'a>>,
    pub visual_key: Option<VisualKey<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct MetaKey<'a> {
    pub taken_at: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    pub cell_id: &'a str,
    pub camera_serial: &'a str,
    pub camera_id: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct VisualKey<'a> {
    pub diff: i32,
    pub colors: &'a str,
}

impl Default for MetaKey<'_> {
    fn default() -> Self {
        MetaKey {
            taken_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            lat: 0.0,
            lng: 0.0,
            cell_id: "",
            camera_serial: "",
            camera_id: 0,
        }
    }
}

impl Default for VisualKey<'_> {
    fn default() -> Self {
        VisualKey { diff: 0, colors: "" }
    }
}

/// The repository queries the rest of this core depends on, plus the minimal
/// row-level CRUD the indexer pipeline (C6) needs to persist what C1/C4/C5
/// produced. One implicit transaction per file where possible.
pub trait CatalogStore {
    fn dialect(&self) -> Dialect;

    // -- lookups used by the identity resolver (C4) --
    fn find_file_by_path(&self, name: &str, root: Root) -> Result<Option<File>>;
    fn find_file_by_hash(&self, hash: &str) -> Result<Option<File>>;
    fn find_photo_by_path_name(&self, path: &str, name: &str) -> Result<Option<Photo>>;
    fn find_photo_by_path_name_stackable(&self, path: &str, name: &str) -> Result<Option<Photo>>;
    fn find_photo_by_meta_key(&self, key: MetaKey<'_>) -> Result<Option<Photo>>;
    fn find_photo_by_uuid(&self, uuid: &str) -> Result<Option<Photo>>;

    // -- merge candidate discovery, ordered (quality DESC, id ASC) --
    fn find_photos_identical(&self, query: IdenticalQuery<'_>) -> Result<Vec<Photo>>;

    // -- merge operations --
    fn update_files_photo_owner(&self, from_photo_id: i64, to_photo_id: i64, to_photo_uid: &str) -> Result<u64>;
    fn tombstone_photo(&self, id: i64, now: DateTime<Utc>) -> Result<()>;
    fn reassign_or_drop_collision(&self, table: ReassignTable, from_id: i64, to_id: i64, from_uid: &str, to_uid: &str) -> Result<()>;

    // -- duplicate ledger persistence (backs C3) --
    fn add_duplicate(&self, dup: &Duplicate) -> Result<()>;
    fn purge_duplicate(&self, root: Root, name: &str) -> Result<()>;
    fn find_duplicate(&self, root: Root, name: &str) -> Result<Option<Duplicate>>;

    // -- row-level CRUD for the indexer pipeline (C6) --
    fn insert_photo(&self, photo: &Photo) -> Result<i64>;
    fn update_photo(&self, photo: &Photo) -> Result<()>;
    fn get_photo(&self, id: i64) -> Result<Option<Photo>>;
    fn insert_file(&self, file: &File) -> Result<i64>;
    fn update_file(&self, file: &File) -> Result<()>;
    fn get_files_for_photo(&self, photo_id: i64) -> Result<Vec<File>>;
    fn get_details(&self, photo_id: i64) -> Result<Details>;
    fn upsert_details(&self, details: &Details) -> Result<()>;
}

/// The three auxiliary tables the merge engine reassigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassignTable {
    Keywords,
    Labels,
    Albums,
}

impl ReassignTable {
    /// Keywords/labels key on `photo_id`; albums key on `photo_uid`.
    ///
    /// `ON CONFLICT` only attaches to `INSERT` in standard SQL, so the
    /// Postgres form expresses "update but drop the row rather than violate
    /// the unique key" as a `NOT EXISTS` guard instead; the Sqlite form uses
    /// the legacy `UPDATE OR IGNORE` extension for the same effect.
    pub(crate) fn sql(&self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (ReassignTable::Keywords, Dialect::Sqlite) => {
                "UPDATE OR IGNORE photos_keywords SET photo_id = ?2 WHERE photo_id = ?1"
            }
            (ReassignTable::Keywords, Dialect::Postgres) => {
                "UPDATE photos_keywords SET photo_id = ?2 WHERE photo_id = ?1 \
                 AND NOT EXISTS (SELECT 1 FROM photos_keywords k2 WHERE k2.photo_id = ?2 AND k2.keyword_id = photos_keywords.keyword_id)"
            }
            (ReassignTable::Labels, Dialect::Sqlite) => {
                "UPDATE OR IGNORE photos_labels SET photo_id = ?2 WHERE photo_id = ?1"
            }
            (ReassignTable::Labels, Dialect::Postgres) => {
                "UPDATE photos_labels SET photo_id = ?2 WHERE photo_id = ?1 \
                 AND NOT EXISTS (SELECT 1 FROM photos_labels l2 WHERE l2.photo_id = ?2 AND l2.label_id = photos_labels.label_id)"
            }
            (ReassignTable::Albums, Dialect::Sqlite) => {
                "UPDATE OR IGNORE photos_albums SET photo_uid = ?2 WHERE photo_uid = ?1"
            }
            (ReassignTable::Albums, Dialect::Postgres) => {
                "UPDATE photos_albums SET photo_uid = ?2 WHERE photo_uid = ?1 \
                 AND NOT EXISTS (SELECT 1 FROM photos_albums a2 WHERE a2.photo_uid = ?2 AND a2.album_uid = photos_albums.album_uid)"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassign_sql_differs_by_dialect() {
        let sqlite_sql = ReassignTable::Keywords.sql(Dialect::Sqlite);
        let postgres_sql = ReassignTable::Keywords.sql(Dialect::Postgres);
        assert!(sqlite_sql.contains("OR IGNORE"));
        assert!(postgres_sql.contains("NOT EXISTS"));
    }

    #[test]
    fn albums_key_on_uid_not_id() {
        let sql = ReassignTable::Albums.sql(Dialect::Sqlite);
        assert!(sql.contains("photo_uid"));
    }
}
