//! Persistence and side-effect ports consumed by the scan orchestrator.
//!
//! Adapters live under `infrastructure`; nothing here knows about SQL.

pub mod catalog;
pub mod dedupe;
pub mod enrichment;
pub mod library;
pub mod scans;

pub use catalog::{CatalogRepository, KnownPath, KnownPathPage};
pub use dedupe::{DedupeCache, NoopDedupeCache};
pub use enrichment::{
    ChannelEnrichmentQueue, EnrichmentQueue, NoopEnrichmentQueue,
    RefreshRequest,
};
pub use library::LibraryRepository;
pub use scans::ScanRepository;
