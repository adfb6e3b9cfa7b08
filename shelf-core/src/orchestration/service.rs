use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::BoxStream;
use shelf_model::{LibraryId, LibraryScan, ScanId, ScanStatus};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ScanPipelineConfig;
use crate::error::{Result, ScanError};
use crate::extract::{LocalExtractor, NfoExtractor};
use crate::fs::{FileSystem, RealFs};
use crate::ports::{
    CatalogRepository, DedupeCache, EnrichmentQueue, LibraryRepository,
    NoopDedupeCache, NoopEnrichmentQueue, ScanRepository,
};
use crate::resolve::ResolverChain;
use crate::stages::KnownPathCache;

use super::events::{ScanEvent, ScanEventBus};
use super::executor::ScanExecutor;
use super::manager::ScanManager;

/// Public entry point for starting, observing and cancelling library scans.
///
/// At most one scan is active per library. Execution happens on spawned
/// tasks; callers get a scan id back immediately.
#[derive(Clone, Debug)]
pub struct ScanService {
    executor: Arc<ScanExecutor>,
    tasks: Arc<DashMap<ScanId, JoinHandle<()>>>,
}

impl ScanService {
    pub fn builder(
        libraries: Arc<dyn LibraryRepository>,
        catalog: Arc<dyn CatalogRepository>,
        scans: Arc<dyn ScanRepository>,
    ) -> ScanServiceBuilder {
        ScanServiceBuilder {
            libraries,
            catalog,
            scans,
            enrichment: None,
            dedupe: None,
            fs: None,
            resolvers: None,
            extractors: None,
            config: None,
            known_paths: None,
        }
    }

    pub fn config(&self) -> &ScanPipelineConfig {
        &self.executor.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.executor.events.subscribe()
    }

    /// Create a pending scan and dispatch it. If the library already has an
    /// active scan, its id is returned instead; an active scan with no
    /// execution in this process (left behind by a stopped process) is
    /// dispatched again.
    pub async fn start_scan(&self, library_id: LibraryId) -> Result<ScanId> {
        let (scan_id, status) = self.find_or_create(library_id).await?;
        if self.dispatch(scan_id) && status == ScanStatus::Running {
            info!(
                target: "scan::orchestrator",
                library_id = %library_id,
                scan_id = %scan_id,
                "re-dispatched running scan with no live execution"
            );
        }
        Ok(scan_id)
    }

    /// Record a pending scan without executing it. A later
    /// [`start_scan`](Self::start_scan) or [`resume_scan`](Self::resume_scan)
    /// picks it up, possibly from another process.
    pub async fn queue_scan(&self, library_id: LibraryId) -> Result<ScanId> {
        let (scan_id, _) = self.find_or_create(library_id).await?;
        Ok(scan_id)
    }

    /// The library's active scan, or a freshly persisted pending one.
    async fn find_or_create(
        &self,
        library_id: LibraryId,
    ) -> Result<(ScanId, ScanStatus)> {
        let guard = self.executor.manager.library_guard(library_id);
        let _held = guard.lock().await;

        if let Some(active) =
            self.executor.scans.find_active_scan(library_id).await?
        {
            info!(
                target: "scan::orchestrator",
                library_id = %library_id,
                scan_id = %active.id,
                status = %active.status,
                "library already has an active scan"
            );
            return Ok((active.id, active.status));
        }

        if self.executor.libraries.get_library(library_id).await?.is_none() {
            return Err(ScanError::NotFound(format!("library {library_id}")));
        }

        let scan = LibraryScan::pending(library_id);
        match self.executor.scans.create_scan(&scan).await {
            Ok(()) => {}
            Err(ScanError::Conflict(reason)) => {
                // Another process created one between our check and insert.
                return match self
                    .executor
                    .scans
                    .find_active_scan(library_id)
                    .await?
                {
                    Some(active) => Ok((active.id, active.status)),
                    None => Err(ScanError::Conflict(reason)),
                };
            }
            Err(err) => return Err(err),
        }

        info!(
            target: "scan::orchestrator",
            library_id = %library_id,
            scan_id = %scan.id,
            "scan queued"
        );
        self.executor.events.publish(ScanEvent::Queued {
            scan_id: scan.id,
            library_id,
        });
        Ok((scan.id, scan.status))
    }

    /// Spawn an execution unless one is already in flight for this id.
    fn dispatch(&self, scan_id: ScanId) -> bool {
        let Some(cancel) = self.executor.manager.register(scan_id) else {
            debug!(
                target: "scan::orchestrator",
                scan_id = %scan_id,
                "scan already executing; not dispatching again"
            );
            return false;
        };
        self.tasks.retain(|_, handle| !handle.is_finished());
        let executor = Arc::clone(&self.executor);
        let handle =
            tokio::spawn(async move { executor.execute(scan_id, cancel).await });
        self.tasks.insert(scan_id, handle);
        true
    }

    /// Request cooperative cancellation. Returns false (and logs) when the
    /// scan has no active execution.
    pub fn cancel_scan(&self, scan_id: ScanId) -> bool {
        self.executor.manager.cancel(scan_id)
    }

    pub async fn get_scan_status(
        &self,
        scan_id: ScanId,
    ) -> Result<Option<LibraryScan>> {
        self.executor.scans.get_scan(scan_id).await
    }

    /// Every scan of a library, newest first.
    pub fn scan_history(
        &self,
        library_id: LibraryId,
    ) -> BoxStream<'_, Result<LibraryScan>> {
        self.executor.scans.scan_history(library_id)
    }

    /// Running scans with a checkpoint and no execution in this process.
    pub async fn interrupted_scans(&self) -> Result<Vec<LibraryScan>> {
        let scans = self.executor.scans.interrupted_scans().await?;
        Ok(scans
            .into_iter()
            .filter(|scan| scan.is_interrupted())
            .filter(|scan| !self.executor.manager.is_registered(scan.id))
            .collect())
    }

    /// Re-dispatch an interrupted (or never started) scan from its
    /// checkpoint. Resuming a scan that is already executing is a no-op.
    pub async fn resume_scan(&self, scan_id: ScanId) -> Result<()> {
        let scan = self
            .executor
            .scans
            .get_scan(scan_id)
            .await?
            .ok_or_else(|| ScanError::NotFound(format!("scan {scan_id}")))?;

        if scan.status.is_terminal() {
            return Err(ScanError::Conflict(format!(
                "scan {scan_id} is already {}",
                scan.status
            )));
        }
        if self.dispatch(scan_id) {
            info!(
                target: "scan::orchestrator",
                scan_id = %scan_id,
                library_id = %scan.library_id,
                has_checkpoint = scan.is_interrupted(),
                "resuming scan"
            );
        }
        Ok(())
    }

    /// Resume every interrupted scan; typically called at startup.
    pub async fn resume_interrupted_scans(&self) -> Result<Vec<ScanId>> {
        let mut resumed = Vec::new();
        for scan in self.interrupted_scans().await? {
            match self.resume_scan(scan.id).await {
                Ok(()) => resumed.push(scan.id),
                Err(err) => warn!(
                    target: "scan::orchestrator",
                    scan_id = %scan.id,
                    error = %err,
                    "failed to resume interrupted scan"
                ),
            }
        }
        Ok(resumed)
    }

    /// Wait for the in-process execution of a scan (if any) and return the
    /// persisted record.
    pub async fn wait_for(&self, scan_id: ScanId) -> Result<Option<LibraryScan>> {
        if let Some((_, handle)) = self.tasks.remove(&scan_id) {
            handle.await.map_err(|err| {
                ScanError::Internal(format!("scan task {scan_id} failed: {err}"))
            })?;
        }
        self.get_scan_status(scan_id).await
    }

    /// True while an execution of this scan is in flight.
    pub fn is_executing(&self, scan_id: ScanId) -> bool {
        self.executor.manager.is_registered(scan_id)
    }
}

/// Wires repositories and optional collaborators into a [`ScanService`].
pub struct ScanServiceBuilder {
    libraries: Arc<dyn LibraryRepository>,
    catalog: Arc<dyn CatalogRepository>,
    scans: Arc<dyn ScanRepository>,
    enrichment: Option<Arc<dyn EnrichmentQueue>>,
    dedupe: Option<Arc<dyn DedupeCache>>,
    fs: Option<Arc<dyn FileSystem>>,
    resolvers: Option<ResolverChain>,
    extractors: Option<Vec<Arc<dyn LocalExtractor>>>,
    config: Option<ScanPipelineConfig>,
    known_paths: Option<Arc<KnownPathCache>>,
}

impl std::fmt::Debug for ScanServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanServiceBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScanServiceBuilder {
    pub fn with_config(mut self, config: ScanPipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_resolvers(mut self, resolvers: ResolverChain) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    pub fn with_extractors(
        mut self,
        extractors: Vec<Arc<dyn LocalExtractor>>,
    ) -> Self {
        self.extractors = Some(extractors);
        self
    }

    pub fn with_enrichment(mut self, queue: Arc<dyn EnrichmentQueue>) -> Self {
        self.enrichment = Some(queue);
        self
    }

    pub fn with_dedupe_cache(mut self, cache: Arc<dyn DedupeCache>) -> Self {
        self.dedupe = Some(cache);
        self
    }

    /// Share one known-path registry between several services.
    pub fn with_known_path_cache(mut self, cache: Arc<KnownPathCache>) -> Self {
        self.known_paths = Some(cache);
        self
    }

    pub fn build(self) -> ScanService {
        let config = self.config.unwrap_or_default().validated();
        let fs = self.fs.unwrap_or_else(|| {
            Arc::new(RealFs::new().with_follow_links(config.follow_links))
        });
        let extractors: Vec<Arc<dyn LocalExtractor>> = self
            .extractors
            .unwrap_or_else(|| vec![Arc::new(NfoExtractor)]);
        let events = ScanEventBus::new(config.event_capacity);

        let executor = ScanExecutor {
            libraries: self.libraries,
            catalog: self.catalog,
            scans: self.scans,
            enrichment: self
                .enrichment
                .unwrap_or_else(|| Arc::new(NoopEnrichmentQueue)),
            dedupe: self.dedupe.unwrap_or_else(|| Arc::new(NoopDedupeCache)),
            fs,
            resolvers: Arc::new(
                self.resolvers.unwrap_or_else(ResolverChain::with_defaults),
            ),
            extractors: Arc::from(extractors),
            config: Arc::new(config),
            manager: ScanManager::new(),
            known_paths: self.known_paths.unwrap_or_default(),
            events,
        };

        ScanService {
            executor: Arc::new(executor),
            tasks: Arc::new(DashMap::new()),
        }
    }
}
