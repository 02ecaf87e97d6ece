//! Typed error kinds for the indexing core.
//!
//! Only `StoreError` and `InvariantViolation` are fatal for the whole pipeline
//! call; the others are logged and the file is still considered indexed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("extraction failed for {path}: {source}")]
    ExtractionError {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("catalog store error: {0}")]
    StoreError(#[from] rusqlite::Error),

    #[error("could not rename {from} -> {to} on disk: {source}")]
    DuplicateRenameError {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("auxiliary action failed: {0}")]
    AuxiliaryError(String),

    #[error("merge sub-update failed: {0}")]
    MergeSubError(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl IndexError {
    /// Only these two kinds abort the whole pipeline call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::StoreError(_) | IndexError::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_invariant_errors_are_fatal() {
        let e = IndexError::InvariantViolation("empty photo id".into());
        assert!(e.is_fatal());
    }

    #[test]
    fn auxiliary_and_merge_sub_errors_are_not_fatal() {
        let e = IndexError::AuxiliaryError("yaml write failed".into());
        assert!(!e.is_fatal());
        let e = IndexError::MergeSubError("keyword reassign collided".into());
        assert!(!e.is_fatal());
    }
}
