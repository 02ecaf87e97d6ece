//! Media indexing and deduplication core for a photo-management catalog.
//!
//! Content-addressed and metadata identity resolution, multi-source
//! metadata merge, and stack-based duplicate consolidation, built around an
//! abstract [`catalog::CatalogStore`] so the same logic runs against
//! whatever persistence layer a caller wires up.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod facts;
pub mod facts_exif;
pub mod finalizer;
pub mod identity;
pub mod ledger;
pub mod merger;
pub mod model;
pub mod pipeline;
pub mod stack_merge;

pub use error::IndexError;
pub use pipeline::{index, Collaborators, IndexInput, IndexResult};

/// Installs a `RUST_LOG`-driven subscriber. Call once from the host
/// application before indexing; harmless to skip in tests, which mostly run
/// against an in-memory catalog and don't care about log output.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
}
