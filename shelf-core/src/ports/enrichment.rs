use shelf_model::{ItemId, ItemKind, LibraryId};
use tokio::sync::mpsc;
use tracing::warn;

/// Request to fetch remote metadata for a freshly written item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest {
    pub library_id: LibraryId,
    pub item_id: ItemId,
    pub kind: ItemKind,
}

/// Fire-and-forget hand-off to whatever performs remote enrichment.
///
/// Implementations must not block the scan and must swallow their own
/// failures; a lost request is repaired by the next scan or refresh.
pub trait EnrichmentQueue: Send + Sync {
    fn enqueue(&self, request: RefreshRequest);
}

/// Drops every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEnrichmentQueue;

impl EnrichmentQueue for NoopEnrichmentQueue {
    fn enqueue(&self, _request: RefreshRequest) {}
}

/// Forwards requests to an unbounded channel drained by a consumer task.
#[derive(Debug, Clone)]
pub struct ChannelEnrichmentQueue {
    tx: mpsc::UnboundedSender<RefreshRequest>,
}

impl ChannelEnrichmentQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RefreshRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EnrichmentQueue for ChannelEnrichmentQueue {
    fn enqueue(&self, request: RefreshRequest) {
        if let Err(err) = self.tx.send(request) {
            warn!(
                target: "scan::enrichment",
                item_id = %err.0.item_id,
                "enrichment consumer is gone; dropping refresh request"
            );
        }
    }
}
