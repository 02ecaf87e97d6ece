//! Concrete `rusqlite`-backed `CatalogStore`. Free functions over `&Connection`
//! wrapped in methods: prepare, `query_map`, collect.

use super::{CatalogStore, IdenticalQuery, MetaKey, ReassignTable};
use crate::config::Dialect;
use crate::error::IndexError;
use crate::model::{
    Coordinates, Details, Duplicate, Exposure, File, FileKind, Photo, PhotoType, Root, Source,
    Sourced, StackMode,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

type Result<T> = std::result::Result<T, IndexError>;

pub struct SqliteStore {
    conn: Connection,
    dialect: Dialect,
}

impl SqliteStore {
    pub fn new(conn: Connection, dialect: Dialect) -> Self {
        SqliteStore { conn, dialect }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

// ── shared helpers: prepare/query_map/collect, count>0 ────────────────────────

fn collect_rows<T, F>(conn: &Connection, sql: &str, params: impl rusqlite::Params, f: F) -> rusqlite::Result<Vec<T>>
where
    F: Fn(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, f)?;
    rows.collect()
}

// ── provenance tag (de)serialization ──────────────────────────────────────────

fn source_to_str(s: Source) -> &'static str {
    match s {
        Source::Auto => "auto",
        Source::Estimate => "estimate",
        Source::Name => "name",
        Source::Exif => "exif",
        Source::Xmp => "xmp",
        Source::Meta => "meta",
        Source::Location => "location",
        Source::Manual => "manual",
    }
}

fn source_from_str(s: &str) -> Source {
    match s {
        "estimate" => Source::Estimate,
        "name" => Source::Name,
        "exif" => Source::Exif,
        "xmp" => Source::Xmp,
        "meta" => Source::Meta,
        "location" => Source::Location,
        "manual" => Source::Manual,
        _ => Source::Auto,
    }
}

fn photo_type_to_str(t: PhotoType) -> &'static str {
    match t {
        PhotoType::Image => "image",
        PhotoType::Raw => "raw",
        PhotoType::Live => "live",
        PhotoType::Video => "video",
        PhotoType::Animated => "animated",
    }
}

fn photo_type_from_str(s: &str) -> PhotoType {
    match s {
        "raw" => PhotoType::Raw,
        "live" => PhotoType::Live,
        "video" => PhotoType::Video,
        "animated" => PhotoType::Animated,
        _ => PhotoType::Image,
    }
}

fn stack_from_i32(v: i32) -> StackMode {
    match v {
        -1 => StackMode::Unstacked,
        1 => StackMode::Stackable,
        _ => StackMode::Default,
    }
}

fn file_kind_to_str(k: FileKind) -> &'static str {
    match k {
        FileKind::Jpeg => "jpeg",
        FileKind::Raw => "raw",
        FileKind::Heif => "heif",
        FileKind::ImageOther => "image_other",
        FileKind::Video => "video",
        FileKind::Xmp => "xmp",
        FileKind::SidecarOther => "sidecar_other",
    }
}

fn file_kind_from_str(s: &str) -> FileKind {
    match s {
        "raw" => FileKind::Raw,
        "heif" => FileKind::Heif,
        "image_other" => FileKind::ImageOther,
        "video" => FileKind::Video,
        "xmp" => FileKind::Xmp,
        "sidecar_other" => FileKind::SidecarOther,
        _ => FileKind::Jpeg,
    }
}

fn parse_dt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|dt| dt.with_timezone(&Utc))
}

fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn row_to_photo(row: &Row<'_>) -> rusqlite::Result<Photo> {
    let type_src: String = row.get("type_src")?;
    let title_src: String = row.get("title_src")?;
    let description_src: String = row.get("description_src")?;
    let taken_src: String = row.get("taken_src")?;
    let coords_src: String = row.get("coords_src")?;
    let exposure_src: String = row.get("exposure_src")?;

    let lat: Option<f64> = row.get("lat")?;
    let lng: Option<f64> = row.get("lng")?;
    let altitude: Option<f64> = row.get("altitude")?;
    let coordinates = match (lat, lng) {
        (Some(lat), Some(lng)) => Sourced { value: Some(Coordinates { lat, lng, altitude }), src: source_from_str(&coords_src) },
        _ => Sourced::empty(),
    };

    let exposure = Exposure {
        camera_model: row.get("camera_model")?,
        camera_make: row.get("camera_make")?,
        camera_serial: row.get("camera_serial")?,
        lens_model: row.get("lens_model")?,
        focal_length: row.get("focal_length")?,
        f_number: row.get("f_number")?,
        iso: row.get("iso")?,
        shutter: row.get("shutter")?,
    };
    let exposure_is_set = exposure.camera_model.is_some()
        || exposure.camera_make.is_some()
        || exposure.camera_serial.is_some()
        || exposure.lens_model.is_some()
        || exposure.focal_length.is_some();

    let taken_at_local: Option<String> = row.get("taken_at_local")?;

    Ok(Photo {
        id: row.get("id")?,
        uid: row.get("uid")?,
        path: row.get("path")?,
        name: row.get("name")?,
        original_name: row.get("original_name")?,
        photo_type: photo_type_from_str(&row.get::<_, String>("photo_type")?),
        type_src: source_from_str(&type_src),
        quality: row.get("quality")?,
        stack: stack_from_i32(row.get("stack")?),
        private: row.get::<_, i64>("private")? != 0,
        panorama: row.get::<_, i64>("panorama")? != 0,
        title: Sourced { value: row.get("title")?, src: source_from_str(&title_src) },
        description: Sourced { value: row.get("description")?, src: source_from_str(&description_src) },
        taken_at: Sourced { value: parse_dt(row.get("taken_at")?), src: source_from_str(&taken_src) },
        taken_at_local: taken_at_local.and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S").ok()),
        time_zone: row.get("time_zone")?,
        coordinates,
        cell_id: row.get("cell_id")?,
        place_id: row.get("place_id")?,
        camera_id: row.get("camera_id")?,
        lens_id: row.get("lens_id")?,
        exposure: Sourced { value: exposure_is_set.then_some(exposure), src: source_from_str(&exposure_src) },
        resolution: row.get("resolution")?,
        color: row.get("color")?,
        uuid: row.get("uuid")?,
        faces: row.get("faces")?,
        created_at: parse_dt(row.get("created_at")?).unwrap_or_default(),
        updated_at: parse_dt(row.get("updated_at")?).unwrap_or_default(),
        checked_at: parse_dt(row.get("checked_at")?),
        deleted_at: parse_dt(row.get("deleted_at")?),
    })
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get("id")?,
        uid: row.get("uid")?,
        photo_id: row.get("photo_id")?,
        photo_uid: row.get("photo_uid")?,
        root: Root::parse(&row.get::<_, String>("root")?).unwrap_or(Root::Originals),
        name: row.get("name")?,
        hash: row.get("hash")?,
        size: row.get("size")?,
        mtime: row.get("mtime")?,
        mime: row.get("mime")?,
        file_type: file_kind_from_str(&row.get::<_, String>("file_type")?),
        orientation: row.get("orientation")?,
        width: row.get("width")?,
        height: row.get("height")?,
        aspect_ratio: row.get("aspect_ratio")?,
        portrait: row.get::<_, i64>("portrait")? != 0,
        duration_ms: row.get("duration_ms")?,
        codec: row.get("codec")?,
        projection: row.get("projection")?,
        instance_id: row.get("instance_id")?,
        main_color: row.get("main_color")?,
        colors: row.get("colors")?,
        luminance: row.get("luminance")?,
        chroma: row.get("chroma")?,
        diff: row.get("diff")?,
        primary: row.get::<_, i64>("primary_file")? != 0,
        sidecar: row.get::<_, i64>("sidecar")? != 0,
        video: row.get::<_, i64>("video")? != 0,
        missing: row.get::<_, i64>("missing")? != 0,
        error: row.get("error")?,
        deleted_at: parse_dt(row.get("deleted_at")?),
    })
}

const PHOTO_COLUMNS: &str = "id, uid, path, name, original_name, photo_type, type_src, quality, stack, \
    private, panorama, title, title_src, description, description_src, taken_at, taken_src, \
    taken_at_local, time_zone, lat, lng, altitude, coords_src, cell_id, place_id, camera_id, \
    lens_id, camera_model, camera_make, camera_serial, lens_model, focal_length, f_number, iso, \
    shutter, exposure_src, resolution, color, uuid, faces, created_at, updated_at, checked_at, deleted_at";

const FILE_COLUMNS: &str = "id, uid, photo_id, photo_uid, root, name, hash, size, mtime, mime, file_type, \
    orientation, width, height, aspect_ratio, portrait, duration_ms, codec, projection, instance_id, \
    main_color, colors, luminance, chroma, diff, primary_file, sidecar, video, missing, error, deleted_at";

impl CatalogStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn find_file_by_path(&self, name: &str, root: Root) -> Result<Option<File>> {
        let sql = format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE name = ?1 AND (root = ?2 OR root = '') AND deleted_at IS NULL"
        );
        self.conn
            .query_row(&sql, params![name, root.as_str()], row_to_file)
            .optional()
            .map_err(IndexError::from)
    }

    fn find_file_by_hash(&self, hash: &str) -> Result<Option<File>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE hash = ?1 AND deleted_at IS NULL LIMIT 1");
        self.conn.query_row(&sql, params![hash], row_to_file).optional().map_err(IndexError::from)
    }

    fn find_photo_by_path_name(&self, path: &str, name: &str) -> Result<Option<Photo>> {
        let sql = format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE path = ?1 AND name = ?2");
        self.conn.query_row(&sql, params![path, name], row_to_photo).optional().map_err(IndexError::from)
    }

    fn find_photo_by_path_name_stackable(&self, path: &str, name: &str) -> Result<Option<Photo>> {
        let sql = format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE path = ?1 AND name = ?2 AND stack != -1");
        self.conn.query_row(&sql, params![path, name], row_to_photo).optional().map_err(IndexError::from)
    }

    fn find_photo_by_meta_key(&self, key: MetaKey<'_>) -> Result<Option<Photo>> {
        // Exact match on (lat, lng, taken_at, camera_serial) with taken_src = Meta.
        // camera_id deliberately not filtered here: that FK is out of scope for
        // this core (no cameras catalog), so it is never populated and would make
        // this match vacuous. The merge-candidate query uses camera_id separately
        // once a real catalog fills it in.
        let sql = format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE lat = ?1 AND lng = ?2 \
             AND taken_at = ?3 AND taken_src = 'meta' AND camera_serial = ?4 \
             ORDER BY id ASC LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![key.lat, key.lng, fmt_dt(key.taken_at), key.camera_serial], row_to_photo)
            .optional()
            .map_err(IndexError::from)
    }

    fn find_photo_by_uuid(&self, uuid: &str) -> Result<Option<Photo>> {
        let sql = format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE uuid = ?1 ORDER BY id ASC LIMIT 1");
        self.conn.query_row(&sql, params![uuid], row_to_photo).optional().map_err(IndexError::from)
    }

    fn find_photos_identical(&self, query: IdenticalQuery<'_>) -> Result<Vec<Photo>> {
        // Candidates are combined by OR, then ordered (quality DESC, id ASC).
        let mut clauses = vec!["(path = ?1 AND name = ?2)".to_string()];
        let mut owned_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(query.path.to_string()), Box::new(query.name.to_string())];

        if let Some(uuid) = query.uuid {
            clauses.push(format!("(uuid = ?{} AND stack != -1)", owned_params.len() + 1));
            owned_params.push(Box::new(uuid.to_string()));
        }
        if let Some(meta) = query.meta_key {
            let base = owned_params.len();
            clauses.push(format!(
                "(taken_at = ?{} AND taken_src = 'meta' AND stack != -1 AND cell_id = ?{} AND camera_serial = ?{} AND camera_id = ?{})",
                base + 1, base + 2, base + 3, base + 4
            ));
            owned_params.push(Box::new(fmt_dt(meta.taken_at)));
            owned_params.push(Box::new(meta.cell_id.to_string()));
            owned_params.push(Box::new(meta.camera_serial.to_string()));
            owned_params.push(Box::new(meta.camera_id));
        }

        let visual_key = query.visual_key;
        let sql = format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE ({}) AND deleted_at IS NULL ORDER BY quality DESC, id ASC",
            clauses.join(" OR ")
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = owned_params.iter().map(|b| b.as_ref()).collect();
        let mut photos = collect_rows(&self.conn, &sql, param_refs.as_slice(), row_to_photo)?;

        if let Some(visual) = visual_key {
            let visual_ids = self.find_photo_ids_by_visual_key(visual.diff, visual.colors)?;
            for id in visual_ids {
                if !photos.iter().any(|p| p.id == id) {
                    if let Some(p) = self.get_photo(id)? {
                        photos.push(p);
                    }
                }
            }
            photos.sort_by(|a, b| b.quality.cmp(&a.quality).then(a.id.cmp(&b.id)));
        }

        Ok(photos)
    }

    fn update_files_photo_owner(&self, from_photo_id: i64, to_photo_id: i64, to_photo_uid: &str) -> Result<u64> {
        let n = self.conn.execute(
            "UPDATE files SET photo_id = ?1, photo_uid = ?2, primary_file = 0 WHERE photo_id = ?3",
            params![to_photo_id, to_photo_uid, from_photo_id],
        )?;
        Ok(n as u64)
    }

    fn tombstone_photo(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE photos SET quality = -1, deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![fmt_dt(now), id],
        )?;
        Ok(())
    }

    fn reassign_or_drop_collision(&self, table: ReassignTable, from_id: i64, to_id: i64, from_uid: &str, to_uid: &str) -> Result<()> {
        let sql = table.sql(self.dialect);
        let result = match table {
            ReassignTable::Albums => self.conn.execute(sql, params![from_uid, to_uid]),
            _ => self.conn.execute(sql, params![from_id, to_id]),
        };
        // best-effort: a collision on the unique key silently drops the row rather
        // than failing the merge; only surface genuine SQL errors.
        result.map(|_| ()).map_err(IndexError::from)
    }

    fn add_duplicate(&self, dup: &Duplicate) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO duplicates (root, name, hash, size, mtime) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![dup.root.as_str(), dup.name, dup.hash, dup.size, dup.mtime],
        )?;
        Ok(())
    }

    fn purge_duplicate(&self, root: Root, name: &str) -> Result<()> {
        self.conn.execute("DELETE FROM duplicates WHERE root = ?1 AND name = ?2", params![root.as_str(), name])?;
        Ok(())
    }

    fn find_duplicate(&self, root: Root, name: &str) -> Result<Option<Duplicate>> {
        self.conn
            .query_row(
                "SELECT root, name, hash, size, mtime FROM duplicates WHERE root = ?1 AND name = ?2",
                params![root.as_str(), name],
                |row| {
                    Ok(Duplicate {
                        root: Root::parse(&row.get::<_, String>(0)?).unwrap_or(Root::Originals),
                        name: row.get(1)?,
                        hash: row.get(2)?,
                        size: row.get(3)?,
                        mtime: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(IndexError::from)
    }

    fn insert_photo(&self, photo: &Photo) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO photos (
                uid, path, name, original_name, photo_type, type_src, quality, stack, private, panorama,
                title, title_src, description, description_src, taken_at, taken_src, taken_at_local, time_zone,
                lat, lng, altitude, coords_src, cell_id, place_id, camera_id, lens_id, camera_model, camera_make,
                camera_serial, lens_model, focal_length, f_number, iso, shutter, exposure_src,
                resolution, color, uuid, faces, created_at, updated_at, checked_at, deleted_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
                ?29, ?30, ?31, ?32, ?33, ?34, ?35,
                ?36, ?37, ?38, ?39, ?40, ?41, ?42, ?43
            )",
            photo_insert_params(photo).as_slice(),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_photo(&self, photo: &Photo) -> Result<()> {
        self.conn.execute(
            "UPDATE photos SET
                path = ?3, name = ?4, original_name = ?5, photo_type = ?6, type_src = ?7, quality = ?8,
                stack = ?9, private = ?10, panorama = ?11, title = ?12, title_src = ?13, description = ?14,
                description_src = ?15, taken_at = ?16, taken_src = ?17, taken_at_local = ?18, time_zone = ?19,
                lat = ?20, lng = ?21, altitude = ?22, coords_src = ?23, cell_id = ?24, place_id = ?25,
                camera_id = ?26, lens_id = ?27, camera_model = ?28, camera_make = ?29, camera_serial = ?30,
                lens_model = ?31, focal_length = ?32, f_number = ?33, iso = ?34, shutter = ?35, exposure_src = ?36,
                resolution = ?37, color = ?38, uuid = ?39, faces = ?40, updated_at = ?42, checked_at = ?43, deleted_at = ?44
             WHERE id = ?1",
            photo_update_params(photo).as_slice(),
        )?;
        Ok(())
    }

    fn get_photo(&self, id: i64) -> Result<Option<Photo>> {
        let sql = format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1");
        self.conn.query_row(&sql, params![id], row_to_photo).optional().map_err(IndexError::from)
    }

    fn insert_file(&self, file: &File) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO files (
                uid, photo_id, photo_uid, root, name, hash, size, mtime, mime, file_type, orientation,
                width, height, aspect_ratio, portrait, duration_ms, codec, projection, instance_id,
                main_color, colors, luminance, chroma, diff, primary_file, sidecar, video, missing, error, deleted_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
                ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30
            )",
            file_insert_params(file).as_slice(),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_file(&self, file: &File) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET
                photo_id = ?3, photo_uid = ?4, root = ?5, name = ?6, hash = ?7, size = ?8, mtime = ?9,
                mime = ?10, file_type = ?11, orientation = ?12, width = ?13, height = ?14, aspect_ratio = ?15,
                portrait = ?16, duration_ms = ?17, codec = ?18, projection = ?19, instance_id = ?20,
                main_color = ?21, colors = ?22, luminance = ?23, chroma = ?24, diff = ?25, primary_file = ?26,
                sidecar = ?27, video = ?28, missing = ?29, error = ?30, deleted_at = ?31
             WHERE id = ?1",
            file_update_params(file).as_slice(),
        )?;
        Ok(())
    }

    fn get_files_for_photo(&self, photo_id: i64) -> Result<Vec<File>> {
        let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE photo_id = ?1 AND deleted_at IS NULL ORDER BY id ASC");
        collect_rows(&self.conn, &sql, params![photo_id], row_to_file).map_err(IndexError::from)
    }

    fn get_details(&self, photo_id: i64) -> Result<Details> {
        let row = self
            .conn
            .query_row(
                "SELECT keywords, keywords_src, notes, notes_src, subject, subject_src, artist, artist_src, copyright, copyright_src \
                 FROM details WHERE photo_id = ?1",
                params![photo_id],
                |row| {
                    Ok(Details {
                        photo_id,
                        keywords: Sourced { value: row.get(0)?, src: source_from_str(&row.get::<_, String>(1)?) },
                        notes: Sourced { value: row.get(2)?, src: source_from_str(&row.get::<_, String>(3)?) },
                        subject: Sourced { value: row.get(4)?, src: source_from_str(&row.get::<_, String>(5)?) },
                        artist: Sourced { value: row.get(6)?, src: source_from_str(&row.get::<_, String>(7)?) },
                        copyright: Sourced { value: row.get(8)?, src: source_from_str(&row.get::<_, String>(9)?) },
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_else(|| Details::empty(photo_id)))
    }

    fn upsert_details(&self, details: &Details) -> Result<()> {
        self.conn.execute(
            "INSERT INTO details (photo_id, keywords, keywords_src, notes, notes_src, subject, subject_src, artist, artist_src, copyright, copyright_src)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(photo_id) DO UPDATE SET
                keywords = excluded.keywords, keywords_src = excluded.keywords_src,
                notes = excluded.notes, notes_src = excluded.notes_src,
                subject = excluded.subject, subject_src = excluded.subject_src,
                artist = excluded.artist, artist_src = excluded.artist_src,
                copyright = excluded.copyright, copyright_src = excluded.copyright_src",
            params![
                details.photo_id,
                details.keywords.value, source_to_str(details.keywords.src),
                details.notes.value, source_to_str(details.notes.src),
                details.subject.value, source_to_str(details.subject.src),
                details.artist.value, source_to_str(details.artist.src),
                details.copyright.value, source_to_str(details.copyright.src),
            ],
        )?;
        Ok(())
    }
}

impl SqliteStore {
    /// Visual-key candidate search: bucket by `diff` within ±2, then filter by Hamming
    /// distance on `colors` interpreted as a base-16 integer. Done in Rust
    /// rather than SQL because popcount-of-XOR has no portable SQL form.
    fn find_photo_ids_by_visual_key(&self, diff: i32, colors: &str) -> Result<Vec<i64>> {
        let candidates: Vec<(i64, String)> = collect_rows(
            &self.conn,
            "SELECT DISTINCT p.id, f.colors FROM photos p JOIN files f ON f.photo_id = p.id \
             WHERE f.diff BETWEEN ?1 AND ?2 AND f.colors IS NOT NULL AND p.deleted_at IS NULL",
            params![diff - 2, diff + 2],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let target = u64::from_str_radix(colors, 16).unwrap_or(0);
        Ok(candidates
            .into_iter()
            .filter(|(_, c)| {
                u64::from_str_radix(c, 16).map(|v| (v ^ target).count_ones() < 5).unwrap_or(false)
            })
            .map(|(id, _)| id)
            .collect())
    }
}

fn photo_insert_params(p: &Photo) -> Vec<Box<dyn rusqlite::ToSql>> {
    let (lat, lng, altitude) = p
        .coordinates
        .value
        .as_ref()
        .map(|c| (Some(c.lat), Some(c.lng), c.altitude))
        .unwrap_or((None, None, None));
    let exposure = p.exposure.value.clone().unwrap_or_default();
    macro_rules! b {
        ($v:expr) => {
            Box::new($v) as Box<dyn rusqlite::ToSql>
        };
    }
    vec![
        b!(p.uid.clone()),
        b!(p.path.clone()),
        b!(p.name.clone()),
        b!(p.original_name.clone()),
        b!(photo_type_to_str(p.photo_type)),
        b!(source_to_str(p.type_src)),
        b!(p.quality),
        b!(p.stack as i32),
        b!(p.private as i64),
        b!(p.panorama as i64),
        b!(p.title.value.clone()),
        b!(source_to_str(p.title.src)),
        b!(p.description.value.clone()),
        b!(source_to_str(p.description.src)),
        b!(p.taken_at.value.map(fmt_dt)),
        b!(source_to_str(p.taken_at.src)),
        b!(p.taken_at_local.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())),
        b!(p.time_zone.clone()),
        b!(lat),
        b!(lng),
        b!(altitude),
        b!(source_to_str(p.coordinates.src)),
        b!(p.cell_id.clone()),
        b!(p.place_id.clone()),
        b!(p.camera_id),
        b!(p.lens_id),
        b!(exposure.camera_model),
        b!(exposure.camera_make),
        b!(exposure.camera_serial),
        b!(exposure.lens_model),
        b!(exposure.focal_length),
        b!(exposure.f_number),
        b!(exposure.iso),
        b!(exposure.shutter),
        b!(source_to_str(p.exposure.src)),
        b!(p.resolution),
        b!(p.color),
        b!(p.uuid.clone()),
        b!(p.faces),
        b!(fmt_dt(p.created_at)),
        b!(fmt_dt(p.updated_at)),
        b!(p.checked_at.map(fmt_dt)),
        b!(p.deleted_at.map(fmt_dt)),
    ]
}

fn photo_update_params(p: &Photo) -> Vec<Box<dyn rusqlite::ToSql>> {
    let mut v = vec![Box::new(p.id) as Box<dyn rusqlite::ToSql>];
    v.extend(photo_insert_params(p));
    v
}

fn file_insert_params(f: &File) -> Vec<Box<dyn rusqlite::ToSql>> {
    macro_rules! b {
        ($v:expr) => {
            Box::new($v) as Box<dyn rusqlite::ToSql>
        };
    }
    vec![
        b!(f.uid.clone()),
        b!(f.photo_id),
        b!(f.photo_uid.clone()),
        b!(f.root.as_str()),
        b!(f.name.clone()),
        b!(f.hash.clone()),
        b!(f.size),
        b!(f.mtime),
        b!(f.mime.clone()),
        b!(file_kind_to_str(f.file_type)),
        b!(f.orientation),
        b!(f.width),
        b!(f.height),
        b!(f.aspect_ratio),
        b!(f.portrait as i64),
        b!(f.duration_ms),
        b!(f.codec.clone()),
        b!(f.projection.clone()),
        b!(f.instance_id.clone()),
        b!(f.main_color.clone()),
        b!(f.colors.clone()),
        b!(f.luminance.clone()),
        b!(f.chroma),
        b!(f.diff),
        b!(f.primary as i64),
        b!(f.sidecar as i64),
        b!(f.video as i64),
        b!(f.missing as i64),
        b!(f.error.clone()),
        b!(f.deleted_at.map(fmt_dt)),
    ]
}

fn file_update_params(f: &File) -> Vec<Box<dyn rusqlite::ToSql>> {
    let mut v = vec![Box::new(f.id) as Box<dyn rusqlite::ToSql>];
    v.extend(file_insert_params(f));
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::model::Coordinates;

    fn store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        SqliteStore::new(conn, Dialect::Sqlite)
    }

    fn sample_photo(uid: &str, path: &str, name: &str) -> Photo {
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

    #[test]
    fn insert_then_get_photo_round_trips() {
        let store = store();
        let photo = sample_photo("abc123", "/Pics", "IMG_0001");
        let id = store.insert_photo(&photo).unwrap();
        let loaded = store.get_photo(id).unwrap().unwrap();
        assert_eq!(loaded.uid, "abc123");
        assert_eq!(loaded.path, "/Pics");
        assert_eq!(loaded.name, "IMG_0001");
    }

    #[test]
    fn insert_then_get_photo_round_trips_coordinates_and_src() {
        let store = store();
        let mut photo = sample_photo("withcoords", "/Pics", "IMG_0002");
        photo.coordinates = Sourced::new(Coordinates { lat: 48.858, lng: 2.294, altitude: None }, Source::Meta);
        let id = store.insert_photo(&photo).unwrap();
        let loaded = store.get_photo(id).unwrap().unwrap();
        assert_eq!(loaded.coordinates.value.unwrap().lat, 48.858);
        assert_eq!(loaded.coordinates.src, Source::Meta);
    }

    #[test]
    fn find_photo_by_path_name_finds_inserted_row() {
        let store = store();
        let photo = sample_photo("findme", "/Pics", "IMG_0003");
        store.insert_photo(&photo).unwrap();
        let found = store.find_photo_by_path_name("/Pics", "IMG_0003").unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn find_file_by_path_matches_empty_root_as_wildcard() {
        let store = store();
        let photo = sample_photo("p1", "/Pics", "IMG_0004");
        let photo_id = store.insert_photo(&photo).unwrap();
        let file = File {
            id: 0,
            uid: "f1".into(),
            photo_id,
            photo_uid: "p1".into(),
            root: Root::Originals,
            name: "IMG_0004.jpg".into(),
            hash: Some("deadbeef".into()),
            size: 100,
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
            primary: true,
            sidecar: false,
            video: false,
            missing: false,
            error: None,
            deleted_at: None,
        };
        store.insert_file(&file).unwrap();
        let found = store.find_file_by_path("IMG_0004.jpg", Root::Originals).unwrap();
        assert!(found.is_some());
        let found_by_hash = store.find_file_by_hash("deadbeef").unwrap();
        assert!(found_by_hash.is_some());
    }

    #[test]
    fn tombstone_photo_sets_quality_and_deleted_at() {
        let store = store();
        let photo = sample_photo("tomb", "/Pics", "IMG_0005");
        let id = store.insert_photo(&photo).unwrap();
        store.tombstone_photo(id, Utc::now()).unwrap();
        let loaded = store.get_photo(id).unwrap().unwrap();
        assert_eq!(loaded.quality, -1);
        assert!(loaded.deleted_at.is_some());
    }

    #[test]
    fn find_photos_identical_orders_by_quality_desc_id_asc() {
        let store = store();
        let mut a = sample_photo("a", "/Pics", "IMG_0006");
        a.quality = 2;
        let mut b = sample_photo("b", "/Pics", "IMG_0006");
        b.quality = 5;
        store.insert_photo(&a).unwrap();
        store.insert_photo(&b).unwrap();

        let results = store
            .find_photos_identical(IdenticalQuery { path: "/Pics", name: "IMG_0006", ..Default::default() })
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].quality, 5);
        assert_eq!(results[1].quality, 2);
    }

    #[test]
    fn reassign_or_drop_collision_on_albums_keys_by_uid() {
        let store = store();
        store
            .connection()
            .execute("INSERT INTO photos_albums (photo_uid, album_uid) VALUES ('from-uid', 'album-1')", [])
            .unwrap();
        store.reassign_or_drop_collision(ReassignTable::Albums, 0, 0, "from-uid", "to-uid").unwrap();
        let owner: String = store
            .connection()
            .query_row("SELECT photo_uid FROM photos_albums WHERE album_uid = 'album-1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(owner, "to-uid");
    }
}
