//! Stack-merge engine (C7). Consolidates Photo rows that represent the same
//! real-world photo into one, without losing any file or derived data.

use crate::catalog::{CatalogStore, IdenticalQuery, MetaKey, ReassignTable, VisualKey};
use crate::config::IndexOptions;
use crate::error::IndexError;
use crate::model::{Photo, Source, StackMode};
use chrono::Utc;
use std::sync::{Mutex, OnceLock};

type Result<T> = std::result::Result<T, IndexError>;

/// Process-wide exclusive lock held for the entire duration of one `merge`
/// call. A plain `Mutex` behind a `OnceLock` rather than a
/// separate lazy-static dependency, matching the stdlib-only synchronization
/// idiom the rest of this codebase's shared-state handling already uses.
fn merge_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Outcome of a `merge` call: the surviving Photo and every Photo it
/// absorbed, already mutated in-memory to reflect their tombstoned state
/// (`quality = -1`, `deleted_at` set) even though the caller is free to
/// re-fetch from the store.
pub struct MergeOutcome {
    pub original: Photo,
    pub merged: Vec<Photo>,
}

/// `rnd.IsUUID`-equivalent: standard `8-4-4-4-12` hex-dash form. Document IDs
/// like `xmp.did:ABC` used for stacking are deliberately *not* valid UUIDs
/// under this check, so merge-by-uuid only fires once a photo has actually
/// been assigned a proper UUID.
pub fn is_valid_uuid(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    let lens = [8, 4, 4, 4, 12];
    parts.len() == 5
        && parts.iter().zip(lens).all(|(p, want_len)| p.len() == want_len && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Candidate discovery: union of path/name, uuid, meta-key, and
/// visual-key matches, ordered `(quality DESC, id ASC)` by the store.
fn identical<S: CatalogStore>(store: &S, photo: &Photo, opts: &IndexOptions) -> Result<Vec<Photo>> {
    if photo.stack == StackMode::Unstacked || photo.name.is_empty() {
        return Ok(Vec::new());
    }

    let uuid = (opts.merge_by_uuid && photo.uuid.as_deref().is_some_and(is_valid_uuid)).then(|| photo.uuid.as_deref().unwrap());

    let coords = photo.coordinates.value;
    let meta_key = if opts.merge_by_meta && photo.taken_at.src == Source::Meta {
        match (photo.taken_at.value, coords) {
            (Some(taken_at), Some(coords)) => Some(MetaKey {
                taken_at,
                lat: coords.lat,
                lng: coords.lng,
                cell_id: photo.cell_id.as_deref().unwrap_or(""),
                camera_serial: photo.exposure.value.as_ref().and_then(|e| e.camera_serial.as_deref()).unwrap_or(""),
                camera_id: photo.camera_id.unwrap_or(0),
            }),
            _ => None,
        }
    } else {
        None
    };

    let visual_key = if opts.merge_by_visual {
        store
            .get_files_for_photo(photo.id)?
            .into_iter()
            .find(|f| f.primary)
            .and_then(|f| match (f.diff, f.colors) {
                (Some(diff), Some(colors)) => Some((diff, colors)),
                _ => None,
            })
    } else {
        None
    };

    store.find_photos_identical(IdenticalQuery {
        path: &photo.path,
        name: &photo.name,
        uuid,
        meta_key,
        visual_key: visual_key.as_ref().map(|(diff, colors)| VisualKey { diff: *diff, colors }),
    })
}

/// `Merge(photo, mergeByMeta, mergeByUuid, mergeByVisual) -> (original, mergedTombstones, err)`.
///
/// Serializes on the process-wide merge lock, so two concurrent
/// indexings can never pick two different "originals" for the same group.
/// Each sub-update is best-effort: a failure is
/// logged and recorded, but the remaining reassignments still run, and the
/// incoming photo's Files are never lost because reassignment is always the
/// first step for every absorbed candidate.
pub fn merge<S: CatalogStore>(store: &S, photo: &Photo, opts: &IndexOptions) -> Result<MergeOutcome> {
    let _guard = merge_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let candidates = identical(store, photo, opts)?;
    if candidates.len() < 2 {
        return Ok(MergeOutcome { original: photo.clone(), merged: Vec::new() });
    }

    let mut candidates = candidates.into_iter();
    let original = candidates.next().expect("len >= 2 checked above");
    let now = Utc::now();
    let mut merged = Vec::new();

    for mut candidate in candidates {
        if let Err(e) = store.update_files_photo_owner(candidate.id, original.id, &original.uid) {
            tracing::error!("merge: reassigning files from photo {} to {} failed: {e}", candidate.id, original.id);
        }
        if let Err(e) = store.tombstone_photo(candidate.id, now) {
            tracing::error!("merge: tombstoning photo {} failed: {e}", candidate.id);
        }
        for table in [ReassignTable::Keywords, ReassignTable::Labels, ReassignTable::Albums] {
            if let Err(e) = store.reassign_or_drop_collision(table, candidate.id, original.id, &candidate.uid, &original.uid) {
                tracing::error!("merge: reassigning {:?} from photo {} failed: {e}", table, candidate.id);
            }
        }
        candidate.quality = -1;
        candidate.deleted_at = Some(now);
        merged.push(candidate);
    }

    Ok(MergeOutcome { original, merged })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sqlite::SqliteStore;
    use crate::config::Dialect;
    use crate::db::migrations::run_migrations;
    use crate::model::{Coordinates, File, FileKind, PhotoType, Root, Sourced};
    use rusqlite::Connection;

    fn store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        SqliteStore::new(conn, Dialect::Sqlite)
    }

    fn blank_photo(uid: &str, path: &str, name: &str) -> Photo {
        let now = Utc::now();
        Photo {
            id: 0,
            uid: uid.to_string(),
            path: path.to_string(),
            name: name.to_string(),
            original_name: None,
            photo_type: PhotoType::Image,
            type_src: Source::Auto,
            quality: 0,
            stack: StackMode::Default,
            private: false,
            panorama: false,
            title: Sourced::empty(),
            description: Sourced::empty(),
            taken_at: Sourced::empty(),
            taken_at_local: None,
            time_zone: None,
            coordinates: Sourced::empty(),
            cell_id: None,
            place_id: None,
            camera_id: None,
            lens_id: None,
            exposure: Sourced::empty(),
            resolution: 0.0,
            color: None,
            uuid: None,
            faces: 0,
            created_at: now,
            updated_at: now,
            checked_at: None,
            deleted_at: None,
        }
    }

    fn blank_file(photo_id: i64, photo_uid: &str, name: &str, primary: bool) -> File {
        File {
            id: 0,
            uid: format!("f-{name}"),
            photo_id,
            photo_uid: photo_uid.to_string(),
            root: Root::Originals,
            name: name.to_string(),
            hash: None,
            size: 0,
            mtime: 0,
            mime: None,
            file_type: FileKind::Jpeg,
            orientation: None,
            width: None,
            height: None,
            aspect_ratio: None,
            portrait: false,
            duration_ms: None,
            codec: None,
            projection: None,
            instance_id: None,
            main_color: None,
            colors: None,
            luminance: None,
            chroma: None,
            diff: None,
            primary,
            sidecar: false,
            video: false,
            missing: false,
            error: None,
            deleted_at: None,
        }
    }

    #[test]
    fn is_valid_uuid_accepts_standard_form_only() {
        assert!(is_valid_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_valid_uuid("xmp.did:ABC"));
        assert!(!is_valid_uuid(""));
    }

    #[test]
    fn merge_is_a_noop_with_fewer_than_two_candidates() {
        let store = store();
        let mut photo = blank_photo("u1", "/p", "IMG_0001");
        photo.id = store.insert_photo(&photo).unwrap();
        store.insert_file(&blank_file(photo.id, &photo.uid, "IMG_0001.jpg", true)).unwrap();

        let outcome = merge(&store, &photo, &IndexOptions::default()).unwrap();
        assert_eq!(outcome.original.id, photo.id);
        assert!(outcome.merged.is_empty());
    }

    #[test]
    fn merge_by_path_name_picks_higher_quality_as_original() {
        let store = store();
        let mut low = blank_photo("u-low", "/p", "IMG_0001");
        low.quality = 1;
        low.id = store.insert_photo(&low).unwrap();
        store.insert_file(&blank_file(low.id, &low.uid, "IMG_0001.jpg", true)).unwrap();

        let mut high = blank_photo("u-high", "/p", "IMG_0001");
        high.quality = 5;
        high.id = store.insert_photo(&high).unwrap();
        store.insert_file(&blank_file(high.id, &high.uid, "IMG_0001_edit.jpg", true)).unwrap();

        let outcome = merge(&store, &low, &IndexOptions::default()).unwrap();
        assert_eq!(outcome.original.id, high.id);
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].id, low.id);
        assert_eq!(outcome.merged[0].quality, -1);
        assert!(outcome.merged[0].deleted_at.is_some());

        let files = store.get_files_for_photo(high.id).unwrap();
        assert_eq!(files.len(), 2, "original must own every File after the merge");
    }

    #[test]
    fn merge_by_visual_hamming_collapses_near_identical_colors() {
        let store = store();
        let mut a = blank_photo("u-a", "/p1", "A");
        a.quality = 2;
        a.id = store.insert_photo(&a).unwrap();
        let mut file_a = blank_file(a.id, &a.uid, "A.jpg", true);
        file_a.diff = Some(42);
        file_a.colors = Some("123456789".to_string());
        store.insert_file(&file_a).unwrap();

        let mut b = blank_photo("u-b", "/p2", "B");
        b.quality = 4;
        b.id = store.insert_photo(&b).unwrap();
        let mut file_b = blank_file(b.id, &b.uid, "B.jpg", true);
        file_b.diff = Some(43);
        file_b.colors = Some("12345678A".to_string());
        store.insert_file(&file_b).unwrap();

        let mut opts = IndexOptions::default();
        opts.merge_by_meta = false;
        opts.merge_by_uuid = false;
        let outcome = merge(&store, &a, &opts).unwrap();
        assert_eq!(outcome.original.id, b.id, "S5: higher-quality photo wins");
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].id, a.id);
    }

    #[test]
    fn merge_by_uuid_requires_valid_uuid_format() {
        let store = store();
        let mut a = blank_photo("u-a", "/p1", "A");
        a.uuid = Some("xmp.did:ABC".to_string());
        a.id = store.insert_photo(&a).unwrap();
        store.insert_file(&blank_file(a.id, &a.uid, "A.jpg", true)).unwrap();

        let mut b = blank_photo("u-b", "/p2", "B");
        b.uuid = Some("xmp.did:ABC".to_string());
        b.id = store.insert_photo(&b).unwrap();
        store.insert_file(&blank_file(b.id, &b.uid, "B.dng", true)).unwrap();

        let outcome = merge(&store, &a, &IndexOptions::default()).unwrap();
        assert_eq!(outcome.original.id, a.id, "document IDs are not valid UUIDs, so no merge fires");
        assert!(outcome.merged.is_empty());
    }

    #[test]
    fn merge_unstacked_photo_returns_no_candidates() {
        let store = store();
        let mut photo = blank_photo("u1", "/p", "IMG_0001");
        photo.stack = StackMode::Unstacked;
        photo.id = store.insert_photo(&photo).unwrap();

        let outcome = merge(&store, &photo, &IndexOptions::default()).unwrap();
        assert!(outcome.merged.is_empty());
        assert_eq!(outcome.original.id, photo.id);
    }

    #[test]
    fn merge_reassigns_keywords_to_the_original_photo() {
        let store = store();
        let mut low = blank_photo("u-low", "/p", "IMG_0001");
        low.quality = 1;
        low.id = store.insert_photo(&low).unwrap();
        store.insert_file(&blank_file(low.id, &low.uid, "IMG_0001.jpg", true)).unwrap();
        store
            .connection()
            .execute("INSERT INTO photos_keywords (photo_id, keyword_id) VALUES (?1, 1)", rusqlite::params![low.id])
            .unwrap();

        let mut high = blank_photo("u-high", "/p", "IMG_0001");
        high.quality = 5;
        high.id = store.insert_photo(&high).unwrap();
        store.insert_file(&blank_file(high.id, &high.uid, "IMG_0001_edit.jpg", true)).unwrap();

        merge(&store, &low, &IndexOptions::default()).unwrap();

        let owner: i64 = store
            .connection()
            .query_row("SELECT photo_id FROM photos_keywords WHERE keyword_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(owner, high.id, "keyword row follows its photo to the merge winner");
    }

    #[test]
    fn merge_by_location_and_taken_at_collapses_duplicate_photo_rows() {
        let store = store();
        let taken_at = Utc::now();
        let coords = Coordinates { lat: 48.858, lng: 2.294, altitude: None };

        let mut a = blank_photo("u-a", "/p1", "A");
        a.quality = 3;
        a.taken_at = Sourced::new(taken_at, Source::Meta);
        a.coordinates = Sourced::new(coords, Source::Meta);
        a.camera_id = Some(7);
        a.exposure = Sourced::new(crate::model::Exposure { camera_serial: Some("SN1".into()), ..Default::default() }, Source::Meta);
        a.id = store.insert_photo(&a).unwrap();
        store.insert_file(&blank_file(a.id, &a.uid, "A.jpg", true)).unwrap();

        let mut b = blank_photo("u-b", "/p2", "B");
        b.quality = 6;
        b.taken_at = Sourced::new(taken_at, Source::Meta);
        b.coordinates = Sourced::new(coords, Source::Meta);
        b.camera_id = Some(7);
        b.exposure = Sourced::new(crate::model::Exposure { camera_serial: Some("SN1".into()), ..Default::default() }, Source::Meta);
        b.id = store.insert_photo(&b).unwrap();
        store.insert_file(&blank_file(b.id, &b.uid, "B.jpg", true)).unwrap();

        let outcome = merge(&store, &a, &IndexOptions::default()).unwrap();
        assert_eq!(outcome.original.id, b.id);
        assert_eq!(outcome.merged.len(), 1);
    }
}
