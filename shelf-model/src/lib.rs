//! Core data model definitions shared across Shelf crates.
#![allow(missing_docs)]

pub mod error;
pub mod files;
pub mod ids;
pub mod item;
pub mod library;
pub mod scan;

pub use error::ModelError;
pub use files::FileDescriptor;
pub use ids::{ItemId, LibraryId, LocationId, ScanId};
pub use item::{CatalogItem, Credit, CreditRole, ItemKind, MetadataItem};
pub use library::{Library, LibraryLocation, LibraryType};
pub use scan::{LibraryScan, ScanCounters, ScanStatus};
