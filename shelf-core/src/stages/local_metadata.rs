use std::sync::Arc;

use futures::{StreamExt, future};
use shelf_model::{FileDescriptor, MetadataItem};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::extract::LocalExtractor;
use crate::pipeline::{ItemStream, ScanContext, ScanWorkItem, Stage};

/// Applies local extractors to resolved, changed items.
///
/// Up to `concurrency` extractions run at once; items leave the stage in the
/// order they entered it.
pub struct LocalMetadataStage {
    extractors: Arc<[Arc<dyn LocalExtractor>]>,
    concurrency: usize,
}

impl std::fmt::Debug for LocalMetadataStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMetadataStage")
            .field(
                "extractors",
                &self.extractors.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl LocalMetadataStage {
    pub fn new(
        extractors: Arc<[Arc<dyn LocalExtractor>]>,
        concurrency: usize,
    ) -> Self {
        Self {
            extractors,
            concurrency: concurrency.max(1),
        }
    }
}

async fn enrich(
    mut item: ScanWorkItem,
    extractors: Arc<[Arc<dyn LocalExtractor>]>,
) -> ScanWorkItem {
    if item.unchanged || item.resolved.is_none() || extractors.is_empty() {
        return item;
    }
    let listing = if item.file.is_dir {
        item.children.clone()
    } else {
        item.siblings.clone()
    };
    let candidates = listing.as_deref().unwrap_or(&[]);

    if let Some(resolved) = item.resolved.as_mut() {
        extract_into(resolved, candidates, &extractors).await;
    }
    item
}

async fn extract_into(
    resolved: &mut MetadataItem,
    candidates: &[FileDescriptor],
    extractors: &[Arc<dyn LocalExtractor>],
) {
    for extractor in extractors {
        match extractor.extract(resolved, candidates).await {
            Ok(Some(metadata)) => metadata.apply_to(resolved),
            Ok(None) => {}
            Err(err) => {
                warn!(
                    target: "scan::extract",
                    extractor = extractor.name(),
                    path = %resolved.file.path.display(),
                    error = %err,
                    "local metadata extraction failed"
                );
            }
        }
    }
}

impl Stage<ScanWorkItem, ScanWorkItem> for LocalMetadataStage {
    fn name(&self) -> &'static str {
        "local_metadata"
    }

    fn apply(
        &self,
        input: ItemStream<ScanWorkItem>,
        _ctx: Arc<ScanContext>,
        cancel: CancellationToken,
    ) -> ItemStream<ScanWorkItem> {
        let extractors = Arc::clone(&self.extractors);
        let skip_when_cancelled = cancel.clone();
        input
            .map(move |item| {
                let extractors = Arc::clone(&extractors);
                let cancel = skip_when_cancelled.clone();
                async move {
                    if cancel.is_cancelled() {
                        return item;
                    }
                    enrich(item, extractors).await
                }
            })
            .buffered(self.concurrency)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .boxed()
    }
}
