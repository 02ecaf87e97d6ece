// PRE-LAUNCH ONLY — squashed from v1+v2+v3 migration chain.
// All tables are created in one flat block. No migration chain needed
// because there is no shipped user data to preserve.
// If real users ever exist, restore the incremental migration approach.
pub fn run_migrations(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS photos (
            id               INTEGER PRIMARY KEY,
            uid              TEXT NOT NULL UNIQUE,
            path             TEXT NOT NULL,
            name             TEXT NOT NULL,
            original_name    TEXT,
            photo_type       TEXT NOT NULL,
            type_src         TEXT NOT NULL DEFAULT 'auto',
            quality          INTEGER NOT NULL DEFAULT 0,
            stack            INTEGER NOT NULL DEFAULT 0,
            private          INTEGER NOT NULL DEFAULT 0,
            panorama         INTEGER NOT NULL DEFAULT 0,

            title            TEXT,
            title_src        TEXT NOT NULL DEFAULT 'auto',
            description      TEXT,
            description_src  TEXT NOT NULL DEFAULT 'auto',

            taken_at         TEXT,
            taken_src        TEXT NOT NULL DEFAULT 'auto',
            taken_at_local   TEXT,
            time_zone        TEXT,

            lat              REAL,
            lng              REAL,
            altitude         REAL,
            coords_src       TEXT NOT NULL DEFAULT 'auto',
            cell_id          TEXT,
            place_id         TEXT,

            camera_id        INTEGER,
            lens_id          INTEGER,
            camera_model     TEXT,
            camera_make      TEXT,
            camera_serial    TEXT,
            lens_model       TEXT,
            focal_length     REAL,
            f_number         REAL,
            iso              INTEGER,
            shutter          TEXT,
            exposure_src     TEXT NOT NULL DEFAULT 'auto',

            resolution       REAL NOT NULL DEFAULT 0,
            color            INTEGER,
            uuid             TEXT,
            faces            INTEGER NOT NULL DEFAULT 0,

            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            checked_at       TEXT,
            deleted_at       TEXT
        );

        -- Not unique: the stack-merge engine's candidate-discovery rule
        -- depends on multiple Photo rows sharing the same (path, name) until a
        -- merge collapses them.
        CREATE INDEX IF NOT EXISTS idx_photos_path_name ON photos(path, name);
        CREATE INDEX IF NOT EXISTS idx_photos_uuid       ON photos(uuid);
        CREATE INDEX IF NOT EXISTS idx_photos_meta_key   ON photos(lat, lng, taken_at, camera_serial);
        CREATE INDEX IF NOT EXISTS idx_photos_quality_id ON photos(quality DESC, id ASC);

        CREATE TABLE IF NOT EXISTS files (
            id               INTEGER PRIMARY KEY,
            uid              TEXT NOT NULL UNIQUE,
            photo_id         INTEGER NOT NULL REFERENCES photos(id),
            photo_uid        TEXT NOT NULL,
            root             TEXT NOT NULL,
            name             TEXT NOT NULL,
            hash             TEXT,
            size             INTEGER NOT NULL,
            mtime            INTEGER NOT NULL,
            mime             TEXT,
            file_type        TEXT NOT NULL,
            orientation      INTEGER,

            width            INTEGER,
            height           INTEGER,
            aspect_ratio     REAL,
            portrait         INTEGER NOT NULL DEFAULT 0,
            duration_ms      INTEGER,
            codec            TEXT,
            projection       TEXT,
            instance_id      TEXT,

            main_color       TEXT,
            colors           TEXT,
            luminance        TEXT,
            chroma           INTEGER,
            diff             INTEGER,

            primary_file     INTEGER NOT NULL DEFAULT 0,
            sidecar          INTEGER NOT NULL DEFAULT 0,
            video            INTEGER NOT NULL DEFAULT 0,
            missing          INTEGER NOT NULL DEFAULT 0,
            error            TEXT,
            deleted_at       TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_files_root_name ON files(root, name);
        CREATE INDEX IF NOT EXISTS idx_files_hash     ON files(hash);
        CREATE INDEX IF NOT EXISTS idx_files_photo_id ON files(photo_id);
        CREATE INDEX IF NOT EXISTS idx_files_diff     ON files(diff);

        CREATE TABLE IF NOT EXISTS details (
            photo_id         INTEGER PRIMARY KEY REFERENCES photos(id),
            keywords         TEXT,
            keywords_src     TEXT NOT NULL DEFAULT 'auto',
            notes            TEXT,
            notes_src        TEXT NOT NULL DEFAULT 'auto',
            subject          TEXT,
            subject_src      TEXT NOT NULL DEFAULT 'auto',
            artist           TEXT,
            artist_src       TEXT NOT NULL DEFAULT 'auto',
            copyright        TEXT,
            copyright_src    TEXT NOT NULL DEFAULT 'auto'
        );

        CREATE TABLE IF NOT EXISTS duplicates (
            root    TEXT NOT NULL,
            name    TEXT NOT NULL,
            hash    TEXT NOT NULL,
            size    INTEGER NOT NULL,
            mtime   INTEGER NOT NULL,
            PRIMARY KEY (root, name)
        );

        -- reassigned by the merge engine; kept intentionally
        -- schema-minimal since the label/keyword/album domains are out of scope.
        CREATE TABLE IF NOT EXISTS photos_keywords (
            photo_id    INTEGER NOT NULL REFERENCES photos(id),
            keyword_id  INTEGER NOT NULL,
            PRIMARY KEY (photo_id, keyword_id)
        );

        CREATE TABLE IF NOT EXISTS photos_labels (
            photo_id  INTEGER NOT NULL REFERENCES photos(id),
            label_id  INTEGER NOT NULL,
            PRIMARY KEY (photo_id, label_id)
        );

        CREATE TABLE IF NOT EXISTS photos_albums (
            photo_uid  TEXT NOT NULL,
            album_uid  TEXT NOT NULL,
            PRIMARY KEY (photo_uid, album_uid)
        );

        -- Set version = 1. On a fresh DB: insert 0 first, then update.
        -- On an existing v1 DB: INSERT is skipped (row exists), UPDATE is no-op.
        INSERT INTO schema_version SELECT 0
            WHERE NOT EXISTS (SELECT 1 FROM schema_version);
        UPDATE schema_version SET version = 1 WHERE version < 1;
        ",
    )?;

    Ok(())
}

pub fn schema_version(conn: &rusqlite::Connection) -> anyhow::Result<u32> {
    let version: u32 = conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn in_memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_run_migrations_succeeds() {
        let conn = in_memory();
        assert!(run_migrations(&conn).is_ok());
    }

    #[test]
    fn test_schema_version_is_1_after_migration() {
        let conn = in_memory();
        run_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_all_tables_exist() {
        let conn = in_memory();
        run_migrations(&conn).unwrap();
        let tables = [
            "schema_version",
            "photos",
            "files",
            "details",
            "duplicates",
            "photos_keywords",
            "photos_labels",
            "photos_albums",
        ];
        for table in &tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    rusqlite::params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_run_migrations_is_idempotent() {
        let conn = in_memory();
        run_migrations(&conn).unwrap();
        assert!(run_migrations(&conn).is_ok());
        assert_eq!(schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_photos_column_set() {
        let conn = in_memory();
        run_migrations(&conn).unwrap();

        let mut stmt = conn.prepare("PRAGMA table_info(photos)").unwrap();
        let cols: Vec<String> = stmt
            .query_map([], |r| r.get(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for col in &["id", "uid", "path", "name", "quality", "stack", "uuid", "deleted_at"] {
            assert!(cols.contains(&col.to_string()), "photos must have column {}", col);
        }
    }

    #[test]
    fn test_files_root_name_unique_index_present() {
        let conn = in_memory();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name='idx_files_root_name'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
