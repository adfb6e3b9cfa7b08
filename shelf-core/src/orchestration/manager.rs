use std::sync::Arc;

use dashmap::DashMap;
use shelf_model::{LibraryId, ScanId};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cancellation registry and per-library start guards.
///
/// A scan id is registered for exactly as long as one execution of it is in
/// flight, which is what keeps a scan id from running twice concurrently.
#[derive(Debug, Default)]
pub struct ScanManager {
    handles: DashMap<ScanId, CancellationToken>,
    library_guards: DashMap<LibraryId, Arc<Mutex<()>>>,
}

impl ScanManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an execution. Returns `None` if the scan is already running.
    pub fn register(&self, scan_id: ScanId) -> Option<CancellationToken> {
        use dashmap::mapref::entry::Entry;

        match self.handles.entry(scan_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(token.clone());
                debug!(
                    target: "scan::orchestrator",
                    scan_id = %scan_id,
                    "registered cancellation handle"
                );
                Some(token)
            }
        }
    }

    pub fn unregister(&self, scan_id: ScanId) -> bool {
        self.handles.remove(&scan_id).is_some()
    }

    pub fn is_registered(&self, scan_id: ScanId) -> bool {
        self.handles.contains_key(&scan_id)
    }

    pub fn active_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal cancellation. Unknown ids are a logged no-op.
    pub fn cancel(&self, scan_id: ScanId) -> bool {
        match self.handles.get(&scan_id) {
            Some(token) => {
                token.cancel();
                info!(
                    target: "scan::orchestrator",
                    scan_id = %scan_id,
                    "cancellation requested"
                );
                true
            }
            None => {
                info!(
                    target: "scan::orchestrator",
                    scan_id = %scan_id,
                    "cancel requested for scan with no active handle; ignoring"
                );
                false
            }
        }
    }

    /// Serialises `start_scan` calls for one library.
    pub fn library_guard(&self, library_id: LibraryId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.library_guards
                .entry(library_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}
