//! Identity resolver (C4). Classifies an incoming file against catalog state
//! and locates (or constructs) the owning Photo.

use crate::catalog::{CatalogStore, MetaKey};
use crate::config::IndexOptions;
use crate::error::IndexError;
use crate::facts::MediaFacts;
use crate::ledger::DuplicateLedger;
use crate::model::{Classification, Coordinates, File, FileKind, Photo, PhotoType, Root, Source, Sourced, StackMode};
use chrono::Utc;
use sha1::{Digest, Sha1};
use std::path::Path;

type Result<T> = std::result::Result<T, IndexError>;

/// Everything the resolver needs about where this file lives, separate from
/// the content facts C1 already extracted.
pub struct IdentityInput<'a> {
    pub root: Root,
    /// `(root, name)` identity key, e.g. `"2020/IMG_0001.jpg"`.
    pub file_name: &'a str,
    /// Directory-ish grouping path used for photo naming, e.g. `"2020"`.
    pub photo_path: &'a str,
    /// Sequence-stripped base filename (GLOSSARY), e.g. `"IMG_0001"`.
    pub base_name: &'a str,
    pub original_name: Option<&'a str>,
    /// Filesystem directory `file_name` is relative to, so a hash match's
    /// "is the old location still on disk" check can resolve
    /// a real path instead of treating the catalog-relative name as one.
    pub root_dir: &'a Path,
}

pub struct ResolveOutcome {
    pub photo: Photo,
    pub file: File,
    pub classification: Classification,
}

/// Filename base with a trailing `_<word>` or `-<word>` segment removed
/// (GLOSSARY: Sequence-stripped base), e.g. `"IMG_0001_edit"` -> `"IMG_0001"`.
pub fn sequence_stripped_base(name: &str) -> String {
    if let Some(pos) = name.rfind(['_', '-']) {
        let (prefix, suffix) = name.split_at(pos);
        let suffix = &suffix[1..];
        if !prefix.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return prefix.to_string();
        }
    }
    name.to_string()
}

/// Opaque 16-char URL-safe id, derived from a seed unique to the row
/// being created rather than a dedicated UID-generator dependency.
pub fn generate_uid(seed: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(seed.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// `Some(None)` is not possible; `None` means "silently skip" (a
/// non-primary sidecar matching nothing is meaningless).
pub fn resolve<S: CatalogStore>(
    store: &S,
    ledger: &DuplicateLedger<'_, S>,
    facts: &MediaFacts,
    opts: &IndexOptions,
    input: &IdentityInput<'_>,
) -> Result<Option<ResolveOutcome>> {
    // Step 1: path match.
    if let Some(existing) = store.find_file_by_path(input.file_name, input.root)? {
        return Ok(Some(finish_existing_file(store, existing, false, facts)?));
    }

    // Step 2: hash match, only for non-sidecar Originals files. The hash is
    // computed here once and carried into `new_file` below so a brand-new
    // File row still has its content hash stored for the *next* scan's
    // lookup (hash-based dedup needs something to match against).
    let mut hash = None;
    if !facts.kind.is_sidecar() && input.root == Root::Originals {
        let computed = facts.hash().map_err(|e| IndexError::ExtractionError { path: facts.path.display().to_string(), source: e })?;
        if let Some(mut existing) = store.find_file_by_hash(&computed)? {
            if input.root_dir.join(&existing.name).exists() {
                ledger.mark_duplicate(input.root, input.file_name, &computed, facts.size, facts.mtime)?;
                let photo = store
                    .get_photo(existing.photo_id)?
                    .ok_or_else(|| IndexError::InvariantViolation(format!("file {} has no owning photo", existing.id)))?;
                return Ok(Some(ResolveOutcome { photo, file: existing, classification: Classification::ExactDuplicate }));
            }
            // RenamedFile: rewrite (root, name) in place; disk-rename of sidecar
            // companions is a best-effort collaborator action (DuplicateRenameError).
            existing.root = input.root;
            existing.name = input.file_name.to_string();
            existing.hash = Some(computed);
            return Ok(Some(finish_existing_file(store, existing, true, facts)?));
        }
        hash = Some(computed);
    }

    // Step 3: no File match. Search for a Photo to attach this file to as a new variant.
    if let Some(photo) = find_stack_candidate(store, facts, opts, input)? {
        let file = new_file(&photo, facts, input, hash);
        return Ok(Some(ResolveOutcome { photo, file, classification: Classification::NewVariant }));
    }

    if facts.kind.is_sidecar() {
        return Ok(None);
    }

    let photo = new_photo(facts, input);
    let file = new_file(&photo, facts, input, hash);
    Ok(Some(ResolveOutcome { photo, file, classification: Classification::NewFile }))
}

fn find_stack_candidate<S: CatalogStore>(store: &S, facts: &MediaFacts, opts: &IndexOptions, input: &IdentityInput<'_>) -> Result<Option<Photo>> {
    if let Some(photo) = store.find_photo_by_path_name(input.photo_path, input.base_name)? {
        return Ok(Some(photo));
    }

    let stripped = sequence_stripped_base(input.base_name);
    if opts.strip_sequence && stripped != input.base_name {
        if let Some(photo) = store.find_photo_by_path_name_stackable(input.photo_path, &stripped)? {
            return Ok(Some(photo));
        }
    }

    if opts.stack_by_meta && facts.meta.has_time_and_place() {
        if let (Some(taken_at), Some(lat), Some(lng), Some(serial)) =
            (facts.meta.taken_at, facts.meta.lat, facts.meta.lng, facts.meta.camera_serial.as_deref())
        {
            let key = MetaKey { taken_at, lat, lng, cell_id: "", camera_serial: serial, camera_id: 0 };
            if let Some(photo) = store.find_photo_by_meta_key(key)? {
                return Ok(Some(photo));
            }
        }
    }

    if opts.stack_by_uuid && facts.meta.has_document_id() {
        if let Some(uuid) = facts.meta.document_id.as_deref() {
            if let Some(photo) = store.find_photo_by_uuid(uuid)? {
                return Ok(Some(photo));
            }
        }
    }

    Ok(None)
}

fn finish_existing_file<S: CatalogStore>(store: &S, file: File, renamed: bool, facts: &MediaFacts) -> Result<ResolveOutcome> {
    let mut photo = store
        .get_photo(file.photo_id)?
        .ok_or_else(|| IndexError::InvariantViolation(format!("file {} has no owning photo", file.id)))?;

    let stat_changed = file.size != facts.size || file.mtime != facts.mtime;
    let changed = renamed || file.missing || stat_changed;
    let classification = if changed { Classification::ChangedFile } else { Classification::UnchangedFile };

    // Tombstone resurrection iff the file is primary or changed.
    if photo.is_tombstoned() && (file.primary || changed) {
        photo.quality = 0;
        photo.deleted_at = None;
    }

    Ok(ResolveOutcome { photo, file, classification })
}

fn new_photo(facts: &MediaFacts, input: &IdentityInput<'_>) -> Photo {
    let now = Utc::now();
    let photo_type = match facts.kind {
        FileKind::Raw => PhotoType::Raw,
        FileKind::Video => PhotoType::Video,
        _ => PhotoType::Image,
    };
    let uid = generate_uid(&format!("{}/{}", input.photo_path, input.base_name));

    let taken_at = facts
        .meta
        .taken_at
        .map(|t| Sourced::new(t, Source::Meta))
        .unwrap_or_else(Sourced::empty);
    let coordinates = match (facts.meta.lat, facts.meta.lng) {
        (Some(lat), Some(lng)) => Sourced::new(Coordinates { lat, lng, altitude: facts.meta.altitude }, Source::Meta),
        _ => Sourced::empty(),
    };

    Photo {
        id: 0,
        uid,
        path: input.photo_path.to_string(),
        name: input.base_name.to_string(),
        original_name: input.original_name.map(str::to_string),
        photo_type,
        type_src: Source::Auto,
        quality: 0,
        stack: StackMode::Default,
        private: false,
        panorama: false,
        title: Sourced::empty(),
        description: Sourced::empty(),
        taken_at,
        taken_at_local: facts.meta.taken_at_local,
        time_zone: facts.meta.time_zone.clone(),
        coordinates,
        cell_id: None,
        place_id: None,
        camera_id: None,
        lens_id: None,
        exposure: Sourced::empty(),
        resolution: 0.0,
        color: None,
        uuid: facts.meta.document_id.clone(),
        faces: 0,
        created_at: now,
        updated_at: now,
        checked_at: None,
        deleted_at: None,
    }
}

fn new_file(photo: &Photo, facts: &MediaFacts, input: &IdentityInput<'_>, hash: Option<String>) -> File {
    let uid = generate_uid(&format!("{}/{}", input.root.as_str(), input.file_name));
    File {
        id: 0,
        uid,
        photo_id: photo.id,
        photo_uid: photo.uid.clone(),
        root: input.root,
        name: input.file_name.to_string(),
        hash,
        size: facts.size,
        mtime: facts.mtime,
        mime: facts.mime.clone(),
        file_type: facts.kind,
        orientation: facts.meta.orientation,
        width: facts.width,
        height: facts.height,
        aspect_ratio: facts.aspect_ratio,
        portrait: facts.portrait,
        duration_ms: facts.duration_ms,
        codec: facts.codec.clone(),
        projection: facts.projection.clone(),
        instance_id: facts.meta.instance_id.clone(),
        main_color: facts.color.as_ref().map(|c| c.main_color.clone()),
        colors: facts.color.as_ref().map(|c| c.colors.clone()),
        luminance: facts.color.as_ref().map(|c| c.luminance.clone()),
        chroma: facts.color.as_ref().map(|c| c.chroma),
        diff: facts.color.as_ref().map(|c| c.diff),
        primary: false,
        sidecar: facts.kind.is_sidecar(),
        video: facts.kind.is_video(),
        missing: false,
        error: facts.error.clone(),
        deleted_at: None,
    }
}
