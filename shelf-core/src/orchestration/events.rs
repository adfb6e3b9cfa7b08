use serde::Serialize;
use shelf_model::{LibraryId, ScanCounters, ScanId};
use tokio::sync::broadcast;

/// Lifecycle notifications emitted while a scan runs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Queued {
        scan_id: ScanId,
        library_id: LibraryId,
    },
    Started {
        scan_id: ScanId,
        library_id: LibraryId,
        resumed: bool,
    },
    Progress {
        scan_id: ScanId,
        library_id: LibraryId,
        counters: ScanCounters,
    },
    Completed {
        scan_id: ScanId,
        library_id: LibraryId,
        counters: ScanCounters,
        elapsed_ms: u64,
    },
    Failed {
        scan_id: ScanId,
        library_id: LibraryId,
        message: String,
    },
    Cancelled {
        scan_id: ScanId,
        library_id: LibraryId,
        counters: ScanCounters,
    },
}

impl ScanEvent {
    pub fn scan_id(&self) -> ScanId {
        match self {
            ScanEvent::Queued { scan_id, .. }
            | ScanEvent::Started { scan_id, .. }
            | ScanEvent::Progress { scan_id, .. }
            | ScanEvent::Completed { scan_id, .. }
            | ScanEvent::Failed { scan_id, .. }
            | ScanEvent::Cancelled { scan_id, .. } => *scan_id,
        }
    }

    /// Completed, failed or cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanEvent::Completed { .. }
                | ScanEvent::Failed { .. }
                | ScanEvent::Cancelled { .. }
        )
    }
}

/// In-process fan-out of [`ScanEvent`]s. Slow subscribers lag and lose the
/// oldest events; publishing never blocks the scan.
#[derive(Debug, Clone)]
pub struct ScanEventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl ScanEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ScanEvent) {
        let _ = self.sender.send(event);
    }
}
