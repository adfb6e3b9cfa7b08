//! Adapters for the repository ports.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::InMemoryCatalog;
#[cfg(feature = "database")]
pub use postgres::PostgresCatalog;
