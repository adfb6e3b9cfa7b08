#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use shelf_core::ports::LibraryRepository;
use shelf_core::{InMemoryCatalog, InMemoryFs, ScanPipelineConfig, ScanService};
use shelf_model::{Library, LibraryScan, LibraryType, ScanId, ScanStatus};

/// In-memory filesystem, catalog and a service wired to both.
pub struct Harness {
    pub fs: InMemoryFs,
    pub catalog: Arc<InMemoryCatalog>,
    pub service: ScanService,
    pub library: Library,
}

pub fn small_batches() -> ScanPipelineConfig {
    ScanPipelineConfig {
        batch_size: 2,
        delete_chunk_size: 2,
        progress_persist_every: 1,
        ..ScanPipelineConfig::default()
    }
}

impl Harness {
    pub async fn new(library_type: LibraryType, root: &str) -> Self {
        Self::with_config(library_type, root, small_batches()).await
    }

    pub async fn with_config(
        library_type: LibraryType,
        root: &str,
        config: ScanPipelineConfig,
    ) -> Self {
        let fs = InMemoryFs::new();
        fs.add_dir(root);
        let catalog = Arc::new(InMemoryCatalog::new());
        let library =
            Library::new("Test", library_type, [PathBuf::from(root)]);
        catalog.save_library(&library).await.expect("save library");

        let service = ScanService::builder(
            catalog.clone(),
            catalog.clone(),
            catalog.clone(),
        )
        .with_filesystem(Arc::new(fs.clone()))
        .with_extractors(Vec::new())
        .with_config(config)
        .build();

        Self {
            fs,
            catalog,
            service,
            library,
        }
    }

    /// Start a scan and wait for it to reach a terminal state.
    pub async fn scan(&self) -> LibraryScan {
        let scan_id = self
            .service
            .start_scan(self.library.id)
            .await
            .expect("start scan");
        self.finish(scan_id).await
    }

    pub async fn finish(&self, scan_id: ScanId) -> LibraryScan {
        let scan = self
            .service
            .wait_for(scan_id)
            .await
            .expect("wait for scan")
            .expect("scan record exists");
        assert!(scan.status.is_terminal(), "scan left {}", scan.status);
        scan
    }

    pub async fn completed_scan(&self) -> LibraryScan {
        let scan = self.scan().await;
        assert_eq!(
            scan.status,
            ScanStatus::Completed,
            "scan failed: {:?}",
            scan.error_message
        );
        scan
    }

    pub async fn live_paths(&self) -> Vec<PathBuf> {
        self.catalog
            .live_items(self.library.id)
            .await
            .into_iter()
            .map(|item| item.path)
            .collect()
    }
}
