//! Records rejected exact-duplicate sightings so the same path is not
//! re-hashed on every scan (C3).

use crate::catalog::CatalogStore;
use crate::error::IndexError;
use crate::model::{Duplicate, Root};

type Result<T> = std::result::Result<T, IndexError>;

/// Thin wrapper over the catalog's `duplicates` table. The store itself is
/// the shared map; this type only adds the `ShouldIgnore` policy.
pub struct DuplicateLedger<'a, S: CatalogStore> {
    store: &'a S,
}

impl<'a, S: CatalogStore> DuplicateLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        DuplicateLedger { store }
    }

    pub fn mark_duplicate(&self, root: Root, name: &str, hash: &str, size: i64, mtime: i64) -> Result<()> {
        self.store.add_duplicate(&Duplicate { root, name: name.to_string(), hash: hash.to_string(), size, mtime })
    }

    pub fn purge(&self, root: Root, name: &str) -> Result<()> {
        self.store.purge_duplicate(root, name)
    }

    /// True iff an unmodified duplicate was recently seen at this path and
    /// `rescan` is false.
    pub fn should_ignore(&self, name: &str, root: Root, mtime: i64, rescan: bool) -> Result<bool> {
        if rescan {
            return Ok(false);
        }
        match self.store.find_duplicate(root, name)? {
            Some(dup) => Ok(dup.mtime == mtime),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sqlite::SqliteStore;
    use crate::config::Dialect;
    use crate::db::migrations::run_migrations;
    use rusqlite::Connection;

    fn ledger_store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        SqliteStore::new(conn, Dialect::Sqlite)
    }

    #[test]
    fn should_ignore_false_when_never_seen() {
        let store = ledger_store();
        let ledger = DuplicateLedger::new(&store);
        assert!(!ledger.should_ignore("copy.jpg", Root::Originals, 100, false).unwrap());
    }

    #[test]
    fn should_ignore_true_after_mark_with_matching_mtime() {
        let store = ledger_store();
        let ledger = DuplicateLedger::new(&store);
        ledger.mark_duplicate(Root::Originals, "copy.jpg", "deadbeef", 12, 100).unwrap();
        assert!(ledger.should_ignore("copy.jpg", Root::Originals, 100, false).unwrap());
    }

    #[test]
    fn should_ignore_false_when_rescan_requested() {
        let store = ledger_store();
        let ledger = DuplicateLedger::new(&store);
        ledger.mark_duplicate(Root::Originals, "copy.jpg", "deadbeef", 12, 100).unwrap();
        assert!(!ledger.should_ignore("copy.jpg", Root::Originals, 100, true).unwrap());
    }

    #[test]
    fn should_ignore_false_when_mtime_changed() {
        let store = ledger_store();
        let ledger = DuplicateLedger::new(&store);
        ledger.mark_duplicate(Root::Originals, "copy.jpg", "deadbeef", 12, 100).unwrap();
        assert!(!ledger.should_ignore("copy.jpg", Root::Originals, 200, false).unwrap());
    }

    #[test]
    fn purge_removes_the_entry() {
        let store = ledger_store();
        let ledger = DuplicateLedger::new(&store);
        ledger.mark_duplicate(Root::Originals, "copy.jpg", "deadbeef", 12, 100).unwrap();
        ledger.purge(Root::Originals, "copy.jpg").unwrap();
        assert!(!ledger.should_ignore("copy.jpg", Root::Originals, 100, false).unwrap());
    }
}
