use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use shelf_model::{Library, LibraryScan, ScanCounters, ScanId};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ScanPipelineConfig;
use crate::error::{Result, ScanError};
use crate::extract::LocalExtractor;
use crate::fs::FileSystem;
use crate::pipeline::{
    Pipeline, ScanCheckpoint, ScanContext, TraversalCursor,
};
use crate::ports::{
    CatalogRepository, DedupeCache, EnrichmentQueue, LibraryRepository,
    RefreshRequest, ScanRepository,
};
use crate::resolve::{AncestorCache, ResolverChain};
use crate::stages::{
    ChangeDetectionStage, DirectoryTraversalStage, KnownPathCache,
    KnownPathSnapshot, LocalMetadataStage, ResolutionStage,
};

use super::batch::{PendingBatch, flatten_batch};
use super::events::{ScanEvent, ScanEventBus};
use super::manager::ScanManager;

/// Everything one scan execution needs. Shared by every scan of a service.
pub(crate) struct ScanExecutor {
    pub(crate) libraries: Arc<dyn LibraryRepository>,
    pub(crate) catalog: Arc<dyn CatalogRepository>,
    pub(crate) scans: Arc<dyn ScanRepository>,
    pub(crate) enrichment: Arc<dyn EnrichmentQueue>,
    pub(crate) dedupe: Arc<dyn DedupeCache>,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) resolvers: Arc<ResolverChain>,
    pub(crate) extractors: Arc<[Arc<dyn LocalExtractor>]>,
    pub(crate) config: Arc<ScanPipelineConfig>,
    pub(crate) manager: ScanManager,
    pub(crate) known_paths: Arc<KnownPathCache>,
    pub(crate) events: ScanEventBus,
}

impl std::fmt::Debug for ScanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanExecutor")
            .field("resolvers", &self.resolvers)
            .field("config", &self.config)
            .field("active", &self.manager.active_count())
            .finish_non_exhaustive()
    }
}

/// Removes the cancellation handle however the execution ends.
struct RegistrationGuard<'a> {
    manager: &'a ScanManager,
    scan_id: ScanId,
    started: Instant,
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.manager.unregister(self.scan_id);
        info!(
            target: "scan::orchestrator",
            scan_id = %self.scan_id,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "scan execution finished"
        );
    }
}

/// Decides when progress is written back to the scan record.
struct ProgressGate {
    every: u64,
    interval: Duration,
    since: u64,
    last: Instant,
}

impl ProgressGate {
    fn new(config: &ScanPipelineConfig) -> Self {
        Self {
            every: config.progress_persist_every,
            interval: config.progress_persist_interval(),
            since: 0,
            last: Instant::now(),
        }
    }

    fn tick(&mut self) -> bool {
        self.since += 1;
        if self.since >= self.every || self.last.elapsed() >= self.interval {
            self.since = 0;
            self.last = Instant::now();
            return true;
        }
        false
    }
}

impl ScanExecutor {
    /// Drive one scan to a terminal state. The cancellation handle must
    /// already be registered with the manager.
    pub(crate) async fn execute(
        self: Arc<Self>,
        scan_id: ScanId,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();
        let _registration = RegistrationGuard {
            manager: &self.manager,
            scan_id,
            started,
        };

        let mut scan = match self.scans.get_scan(scan_id).await {
            Ok(Some(scan)) => scan,
            Ok(None) => {
                warn!(
                    target: "scan::orchestrator",
                    scan_id = %scan_id,
                    "scan record disappeared before execution"
                );
                return;
            }
            Err(err) => {
                error!(
                    target: "scan::orchestrator",
                    scan_id = %scan_id,
                    error = %err,
                    "failed to load scan record"
                );
                return;
            }
        };
        if scan.status.is_terminal() {
            warn!(
                target: "scan::orchestrator",
                scan_id = %scan_id,
                status = %scan.status,
                "refusing to execute a finished scan"
            );
            return;
        }

        let library_id = scan.library_id;
        let ancestors = Arc::new(Mutex::new(AncestorCache::new(
            self.config.ancestor_prune_interval,
        )));

        let outcome = self.run(&mut scan, &cancel, &ancestors).await;

        ancestors.lock().await.clear();
        self.known_paths.release(library_id);
        if let Err(err) = self.dedupe.clear(library_id).await {
            warn!(
                target: "scan::orchestrator",
                library_id = %library_id,
                error = %err,
                "failed to clear dedupe cache"
            );
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let event = match outcome {
            Ok(()) => {
                scan.mark_completed();
                let finished_at = scan.completed_at.unwrap_or_else(Utc::now);
                if let Err(err) =
                    self.libraries.mark_scanned(library_id, finished_at).await
                {
                    warn!(
                        target: "scan::orchestrator",
                        library_id = %library_id,
                        error = %err,
                        "failed to record library scan time"
                    );
                }
                ScanEvent::Completed {
                    scan_id,
                    library_id,
                    counters: scan.counters,
                    elapsed_ms,
                }
            }
            Err(err) if err.is_cancelled() => {
                scan.mark_cancelled();
                ScanEvent::Cancelled {
                    scan_id,
                    library_id,
                    counters: scan.counters,
                }
            }
            Err(err) => {
                error!(
                    target: "scan::orchestrator",
                    scan_id = %scan_id,
                    library_id = %library_id,
                    error = %err,
                    "scan failed"
                );
                let message = err.to_string();
                scan.mark_failed(message.clone());
                ScanEvent::Failed {
                    scan_id,
                    library_id,
                    message,
                }
            }
        };

        if let Err(err) = self.scans.update_scan(&scan).await {
            error!(
                target: "scan::orchestrator",
                scan_id = %scan_id,
                error = %err,
                "failed to persist final scan state"
            );
        }

        let counters = scan.counters;
        info!(
            target: "scan::summary",
            scan_id = %scan_id,
            library_id = %library_id,
            status = %scan.status,
            total = counters.total,
            processed = counters.processed,
            added = counters.added,
            updated = counters.updated,
            removed = counters.removed,
            elapsed_ms,
            "scan finished"
        );
        self.events.publish(event);
    }

    async fn run(
        &self,
        scan: &mut LibraryScan,
        cancel: &CancellationToken,
        ancestors: &Arc<Mutex<AncestorCache>>,
    ) -> Result<()> {
        let library =
            self.libraries.get_library(scan.library_id).await?.ok_or_else(
                || ScanError::NotFound(format!("library {}", scan.library_id)),
            )?;
        let library = Arc::new(library);

        let checkpoint = ScanCheckpoint::from_scan(scan);
        let resumed = checkpoint.is_some();
        if resumed {
            scan.counters.total = 0;
            scan.counters.processed = 0;
        } else {
            scan.counters = ScanCounters::default();
        }
        scan.error_message = None;
        scan.mark_running();
        self.scans.update_scan(scan).await?;

        info!(
            target: "scan::orchestrator",
            scan_id = %scan.id,
            library_id = %library.id,
            library = %library.name,
            locations = library.locations.len(),
            resumed,
            "scan started"
        );
        self.events.publish(ScanEvent::Started {
            scan_id: scan.id,
            library_id: library.id,
            resumed,
        });

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled(format!("scan {}", scan.id)));
        }

        let snapshot = self
            .known_paths
            .load(
                library.id,
                self.catalog.as_ref(),
                self.config.known_path_page_size,
            )
            .await?;

        let ctx = Arc::new(ScanContext::new(
            Arc::clone(&library),
            scan.clone(),
            checkpoint,
            Arc::clone(&self.config),
        ));
        let mut stream = Pipeline::from_iter(
            library.locations.clone(),
            Arc::clone(&ctx),
            cancel.clone(),
        )
        .then(DirectoryTraversalStage::new(Arc::clone(&self.fs)))
        .then(ChangeDetectionStage::new(Arc::clone(&snapshot)))
        .then(ResolutionStage::new(
            Arc::clone(&self.resolvers),
            Arc::clone(ancestors),
        ))
        .then(LocalMetadataStage::new(
            Arc::clone(&self.extractors),
            self.config.extraction_concurrency,
        ))
        .into_stream();

        let mut batch = PendingBatch::new(self.config.batch_size);
        let mut gate = ProgressGate::new(&self.config);
        let mut flushed_through: Option<TraversalCursor> = None;

        while let Some(item) = stream.next().await {
            if cancel.is_cancelled() {
                break;
            }
            scan.counters.total += 1;
            let position =
                TraversalCursor::new(item.location_id, item.file.path.clone());

            if !item.unchanged {
                scan.counters.processed += 1;
                if item.resolved.is_some() {
                    batch.push(item);
                }
            }

            if batch.is_full() {
                self.flush(&library, &mut batch, scan).await?;
            }
            if batch.is_empty() {
                flushed_through = Some(position);
            }

            if scan.counters.total % self.config.memory_trim_interval == 0 {
                self.trim_memory(&snapshot, ancestors).await;
            }

            if gate.tick() {
                self.persist_progress(scan, flushed_through.as_ref()).await;
            }
        }
        drop(stream);

        if cancel.is_cancelled() {
            let dropped = batch.discard();
            debug!(
                target: "scan::orchestrator",
                scan_id = %scan.id,
                dropped,
                "discarded pending batch after cancellation"
            );
            return Err(ScanError::Cancelled(format!("scan {}", scan.id)));
        }

        self.flush(&library, &mut batch, scan).await?;
        self.reconcile(&ctx, &snapshot, scan, cancel).await
    }

    /// Bulk insert the pending batch and hand written ids to enrichment.
    async fn flush(
        &self,
        library: &Library,
        batch: &mut PendingBatch,
        scan: &mut LibraryScan,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let flattened = flatten_batch(batch.take());
        if flattened.rows.is_empty() {
            return Ok(());
        }

        let written = self.catalog.upsert_items(&flattened.rows).await?;
        scan.counters.added += flattened.added;
        scan.counters.updated += flattened.updated;
        debug!(
            target: "scan::orchestrator",
            scan_id = %scan.id,
            rows = flattened.rows.len(),
            written,
            added = flattened.added,
            updated = flattened.updated,
            "flushed batch"
        );

        for (item_id, kind) in flattened.refresh {
            self.enrichment.enqueue(RefreshRequest {
                library_id: library.id,
                item_id,
                kind,
            });
        }
        Ok(())
    }

    async fn persist_progress(
        &self,
        scan: &mut LibraryScan,
        flushed_through: Option<&TraversalCursor>,
    ) {
        if let Some(cursor) = flushed_through {
            let checkpoint = ScanCheckpoint::traversal(
                cursor.location_id,
                cursor.path.clone(),
            );
            if let Err(err) = checkpoint.apply_to(scan) {
                warn!(
                    target: "scan::orchestrator",
                    scan_id = %scan.id,
                    error = %err,
                    "failed to encode checkpoint"
                );
            }
        }
        scan.updated_at = Utc::now();

        if let Err(err) = self.scans.update_scan(scan).await {
            warn!(
                target: "scan::orchestrator",
                scan_id = %scan.id,
                error = %err,
                "failed to persist scan progress"
            );
            return;
        }
        self.events.publish(ScanEvent::Progress {
            scan_id: scan.id,
            library_id: scan.library_id,
            counters: scan.counters,
        });
    }

    async fn trim_memory(
        &self,
        snapshot: &KnownPathSnapshot,
        ancestors: &Mutex<AncestorCache>,
    ) {
        snapshot.compact().await;
        ancestors.lock().await.shrink();
        debug!(
            target: "scan::orchestrator",
            library_id = %snapshot.library_id(),
            "released spare cache capacity"
        );
    }

    /// Delete catalog paths that were never observed, in bounded chunks.
    async fn reconcile(
        &self,
        ctx: &ScanContext,
        snapshot: &KnownPathSnapshot,
        scan: &mut LibraryScan,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (retained, doomed): (Vec<PathBuf>, Vec<PathBuf>) = snapshot
            .take_unobserved()
            .await
            .into_iter()
            .map(|(path, _)| path)
            .partition(|path| ctx.is_unreachable(path));

        if !retained.is_empty() {
            warn!(
                target: "scan::orchestrator",
                scan_id = %scan.id,
                retained = retained.len(),
                unreachable_roots = ctx.unreachable_count(),
                "keeping catalog paths beneath unreadable directories"
            );
        }
        if doomed.is_empty() {
            return Ok(());
        }

        info!(
            target: "scan::orchestrator",
            scan_id = %scan.id,
            paths = doomed.len(),
            mode = ?self.config.deletion_mode,
            "removing vanished paths"
        );
        for chunk in doomed.chunks(self.config.delete_chunk_size) {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled(format!("scan {}", scan.id)));
            }
            let removed = self
                .catalog
                .delete_paths(scan.library_id, chunk, self.config.deletion_mode)
                .await?;
            scan.counters.removed += removed;
        }
        Ok(())
    }
}
