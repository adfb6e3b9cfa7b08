//! Scan orchestration: lifecycle, batching, reconciliation and the public
//! service surface.

pub mod batch;
pub mod events;
mod executor;
pub mod manager;
pub mod service;

pub use batch::{FlattenedBatch, PendingBatch, flatten_batch, flatten_into};
pub use events::{ScanEvent, ScanEventBus};
pub use manager::ScanManager;
pub use service::{ScanService, ScanServiceBuilder};
