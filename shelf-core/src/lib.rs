//! # Shelf Core
//!
//! Library scan pipeline for Shelf. A scan walks every root location of a
//! library, skips entries the catalog already knows unchanged, resolves the
//! rest into typed metadata (movies, series, seasons, episodes), enriches them
//! from local sidecar files and persists them in batches. Paths that vanished
//! since the previous scan are reconciled away at the end.
//!
//! ## Feature Flags
//!
//! - `database`: PostgreSQL catalog adapter and bundled migrations
//!
//! ## Architecture
//!
//! - [`pipeline`]: lazy, cancellable stage composition and checkpoints
//! - [`stages`]: traversal, change detection, resolution, local metadata
//! - [`resolve`]: resolver chain, naming rules and the ancestor cache
//! - [`extract`]: local metadata extractors (`.nfo` sidecars)
//! - [`orchestration`]: scan lifecycle, batching, reconciliation, events
//! - [`ports`] and [`infrastructure`]: persistence boundaries and adapters
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! use shelf_core::ports::LibraryRepository;
//! use shelf_core::{InMemoryCatalog, ScanService};
//! use shelf_model::{Library, LibraryType};
//!
//! # async fn run() -> shelf_core::Result<()> {
//! let catalog = Arc::new(InMemoryCatalog::new());
//! let library = Library::new(
//!     "Movies",
//!     LibraryType::Movies,
//!     [PathBuf::from("/srv/movies")],
//! );
//! catalog.save_library(&library).await?;
//!
//! let service =
//!     ScanService::builder(catalog.clone(), catalog.clone(), catalog).build();
//! let scan_id = service.start_scan(library.id).await?;
//! if let Some(finished) = service.wait_for(scan_id).await? {
//!     println!("{} -> {:?}", finished.status, finished.counters);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Pipeline tuning and config loading
pub mod config;

/// Error types
pub mod error;

/// Local metadata extraction from sidecar files
pub mod extract;

/// Filesystem abstraction used by traversal
pub mod fs;

/// Repository adapters
pub mod infrastructure;

/// Scan lifecycle management
pub mod orchestration;

pub mod pipeline;

/// Persistence and side-effect ports
pub mod ports;

/// Resolver chain and naming heuristics
pub mod resolve;

pub mod stages;

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use config::{DeletionMode, ScanConfigSource, ScanPipelineConfig};
pub use error::{Result, ScanError};
pub use fs::{FileSystem, InMemoryFs, RealFs};
#[cfg(feature = "database")]
#[cfg_attr(docsrs, doc(cfg(feature = "database")))]
pub use infrastructure::PostgresCatalog;
pub use infrastructure::InMemoryCatalog;
pub use orchestration::{ScanEvent, ScanService, ScanServiceBuilder};
