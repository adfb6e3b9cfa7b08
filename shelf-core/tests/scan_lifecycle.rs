mod support;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use shelf_core::pipeline::ScanCheckpoint;
use shelf_core::ports::{
    ChannelEnrichmentQueue, EnrichmentQueue, LibraryRepository, RefreshRequest,
    ScanRepository,
};
use shelf_core::{DeletionMode, ScanEvent, ScanPipelineConfig, ScanService};
use shelf_model::{ItemKind, LibraryScan, LibraryType, ScanId, ScanStatus};
use support::{Harness, small_batches};

#[tokio::test]
async fn rescan_of_unchanged_tree_writes_nothing() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/Alien (1979)/Alien.mkv", 10);
    h.fs.add_file("/movies/Heat (1995)/Heat.mkv", 20);
    h.fs.add_file("/movies/Heat (1995)/notes.txt", 1);

    let first = h.completed_scan().await;
    assert_eq!(first.counters.added, 2);
    assert_eq!(h.live_paths().await.len(), 2);
    let writes = h.catalog.upsert_calls().await;

    let second = h.completed_scan().await;
    assert_eq!(second.counters.added, 0);
    assert_eq!(second.counters.updated, 0);
    assert_eq!(second.counters.removed, 0);
    assert!(second.counters.processed < first.counters.processed);
    assert_eq!(second.counters.total, first.counters.total);
    assert_eq!(h.catalog.upsert_calls().await, writes);
    assert!(second.resume_cursor.is_none());
}

#[tokio::test]
async fn vanished_files_are_removed_for_any_chunk_size() {
    for chunk in [1, 2, 1_000] {
        let config = ScanPipelineConfig {
            delete_chunk_size: chunk,
            ..small_batches()
        };
        let h =
            Harness::with_config(LibraryType::Movies, "/movies", config).await;
        for name in ["A", "B", "C"] {
            h.fs.add_file(format!("/movies/{name}.mkv"), 1);
        }
        h.completed_scan().await;

        h.fs.remove("/movies/B.mkv");
        let scan = h.completed_scan().await;

        assert_eq!(scan.counters.removed, 1, "chunk size {chunk}");
        assert_eq!(
            h.live_paths().await,
            vec![
                PathBuf::from("/movies/A.mkv"),
                PathBuf::from("/movies/C.mkv")
            ]
        );
        assert_eq!(h.catalog.deleted_items(h.library.id).await.len(), 1);
    }
}

#[tokio::test]
async fn hard_deletion_leaves_no_rows_behind() {
    let config = ScanPipelineConfig {
        deletion_mode: DeletionMode::Hard,
        ..small_batches()
    };
    let h = Harness::with_config(LibraryType::Movies, "/movies", config).await;
    h.fs.add_file("/movies/A.mkv", 1);
    h.completed_scan().await;

    h.fs.remove("/movies/A.mkv");
    let scan = h.completed_scan().await;

    assert_eq!(scan.counters.removed, 1);
    assert!(h.live_paths().await.is_empty());
    assert!(h.catalog.deleted_items(h.library.id).await.is_empty());
}

#[tokio::test]
async fn moved_movie_counts_as_one_add_and_one_removal() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/Alien (1979)/Alien.mkv", 10);
    h.completed_scan().await;

    h.fs.remove("/movies/Alien (1979)");
    h.fs.add_file("/movies/Sci-Fi/Alien (1979)/Alien.mkv", 10);
    let scan = h.completed_scan().await;

    assert_eq!(scan.counters.added, 1);
    assert_eq!(scan.counters.removed, 1);
    let live = h.catalog.live_items(h.library.id).await;
    assert_eq!(live.len(), 1);
    assert_eq!(
        live[0].path,
        PathBuf::from("/movies/Sci-Fi/Alien (1979)/Alien.mkv")
    );
    assert_eq!(live[0].title, "Alien");
    assert_eq!(live[0].year, Some(1979));
}

#[tokio::test]
async fn changed_file_is_updated_under_its_existing_id() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/Heat (1995)/Heat.mkv", 10);
    h.completed_scan().await;
    let before = h
        .catalog
        .item_by_path(h.library.id, "/movies/Heat (1995)/Heat.mkv")
        .await
        .expect("item stored");

    h.fs.add_file("/movies/Heat (1995)/Heat.mkv", 11);
    let scan = h.completed_scan().await;

    assert_eq!(scan.counters.added, 0);
    assert_eq!(scan.counters.updated, 1);
    let after = h
        .catalog
        .item_by_path(h.library.id, "/movies/Heat (1995)/Heat.mkv")
        .await
        .expect("item still stored");
    assert_eq!(after.id, before.id);
    assert_eq!(after.size, 11);
}

#[tokio::test]
async fn new_episode_links_to_existing_season() {
    let h = Harness::new(LibraryType::Series, "/tv").await;
    h.fs.add_file("/tv/Show/Season 1/Show S01E01.mkv", 1);
    let first = h.completed_scan().await;
    assert_eq!(first.counters.added, 3);

    let season = h
        .catalog
        .item_by_path(h.library.id, "/tv/Show/Season 1")
        .await
        .expect("season stored");
    assert_eq!(season.kind, ItemKind::Season);

    h.fs.add_file("/tv/Show/Season 1/Show S01E02.mkv", 1);
    let second = h.completed_scan().await;
    assert_eq!(second.counters.added, 1);
    assert_eq!(second.counters.updated, 0);

    let episode = h
        .catalog
        .item_by_path(h.library.id, "/tv/Show/Season 1/Show S01E02.mkv")
        .await
        .expect("episode stored");
    assert_eq!(episode.kind, ItemKind::Episode);
    assert_eq!(episode.parent_id, Some(season.id));
    assert_eq!(episode.episode_number, Some(2));
}

#[tokio::test]
async fn unreadable_directory_keeps_its_catalog_entries() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/Locked/Locked.mkv", 1);
    h.fs.add_file("/movies/Open.mkv", 1);
    h.completed_scan().await;

    h.fs.mark_unreadable("/movies/Locked");
    let scan = h.completed_scan().await;

    assert_eq!(scan.counters.removed, 0);
    assert_eq!(h.live_paths().await.len(), 2);
}

#[tokio::test]
async fn missing_location_does_not_wipe_the_library() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/A.mkv", 1);
    h.completed_scan().await;

    h.fs.remove("/movies");
    let scan = h.completed_scan().await;

    assert_eq!(scan.counters.removed, 0);
    assert_eq!(h.live_paths().await, vec![PathBuf::from("/movies/A.mkv")]);
}

#[tokio::test]
async fn scan_cancelled_before_it_runs_writes_nothing() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    for i in 0..10 {
        h.fs.add_file(format!("/movies/Movie {i}.mkv"), 1);
    }

    let scan_id = h.service.start_scan(h.library.id).await.expect("start");
    assert!(h.service.cancel_scan(scan_id));
    let scan = h.finish(scan_id).await;

    assert_eq!(scan.status, ScanStatus::Cancelled);
    assert!(scan.completed_at.is_some());
    assert!(!h.service.is_executing(scan_id));
    assert!(!h.service.cancel_scan(scan_id));
    assert!(h.live_paths().await.is_empty());

    // The library is free for a new scan afterwards.
    let next = h.completed_scan().await;
    assert_ne!(next.id, scan_id);
    assert_eq!(next.counters.added, 10);
}

/// Cancels the followed scan as soon as the first batch is handed to
/// enrichment, i.e. right after the first flush.
#[derive(Default)]
struct CancelAfterFirstFlush {
    target: OnceLock<(ScanService, ScanId)>,
    calls: AtomicUsize,
}

impl EnrichmentQueue for CancelAfterFirstFlush {
    fn enqueue(&self, _request: RefreshRequest) {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0
            && let Some((service, scan_id)) = self.target.get()
        {
            assert!(service.cancel_scan(*scan_id));
        }
    }
}

#[tokio::test]
async fn scan_cancelled_mid_run_keeps_only_flushed_batches() {
    let fs = shelf_core::InMemoryFs::new();
    fs.add_dir("/movies");
    for i in 0..10 {
        fs.add_file(format!("/movies/Movie {i}.mkv"), 1);
    }
    let catalog = Arc::new(shelf_core::InMemoryCatalog::new());
    let library = shelf_model::Library::new(
        "Movies",
        LibraryType::Movies,
        [PathBuf::from("/movies")],
    );
    catalog.save_library(&library).await.expect("save");

    let hook = Arc::new(CancelAfterFirstFlush::default());
    let service =
        ScanService::builder(catalog.clone(), catalog.clone(), catalog.clone())
            .with_filesystem(Arc::new(fs))
            .with_extractors(Vec::new())
            .with_enrichment(hook.clone())
            .with_config(small_batches())
            .build();

    // The spawned execution is not polled before this test task yields.
    let scan_id = service.start_scan(library.id).await.expect("start");
    assert!(hook.target.set((service.clone(), scan_id)).is_ok());

    let scan = service
        .wait_for(scan_id)
        .await
        .expect("wait")
        .expect("scan record");

    assert_eq!(scan.status, ScanStatus::Cancelled);
    assert_eq!(scan.counters.added, 2);
    assert!(!service.is_executing(scan_id));
    let live: Vec<PathBuf> = catalog
        .live_items(library.id)
        .await
        .into_iter()
        .map(|item| item.path)
        .collect();
    assert_eq!(
        live,
        vec![
            PathBuf::from("/movies/Movie 0.mkv"),
            PathBuf::from("/movies/Movie 1.mkv")
        ]
    );
    assert_eq!(catalog.upsert_calls().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_share_one_scan() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/A.mkv", 1);

    let (first, second) = {
        let a = h.service.clone();
        let b = h.service.clone();
        let library_id = h.library.id;
        tokio::join!(
            tokio::spawn(async move { a.start_scan(library_id).await }),
            tokio::spawn(async move { b.start_scan(library_id).await }),
        )
    };
    let first = first.expect("task").expect("start");
    let second = second.expect("task").expect("start");
    assert_eq!(first, second);

    let scan = h.finish(first).await;
    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(h.catalog.scans_for(h.library.id).await.len(), 1);
}

#[tokio::test]
async fn sequential_start_returns_the_active_scan() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/A.mkv", 1);

    let first = h.service.start_scan(h.library.id).await.expect("start");
    let second = h.service.start_scan(h.library.id).await.expect("start");
    assert_eq!(first, second);

    h.finish(first).await;
    let history: Vec<LibraryScan> = h
        .service
        .scan_history(h.library.id)
        .map(|scan| scan.expect("history row"))
        .collect()
        .await;
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn unknown_library_is_not_found() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    let err = h
        .service
        .start_scan(shelf_model::LibraryId::new())
        .await
        .expect_err("unknown library");
    assert!(matches!(err, shelf_core::ScanError::NotFound(_)));
}

#[tokio::test]
async fn interrupted_scan_resumes_without_duplicates() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    for name in ["A", "B", "C"] {
        h.fs.add_file(format!("/movies/{name}.mkv"), 1);
    }
    h.completed_scan().await;

    // A run that flushed through C and then lost its process.
    for name in ["D", "E"] {
        h.fs.add_file(format!("/movies/{name}.mkv"), 1);
    }
    let mut orphan = LibraryScan::pending(h.library.id);
    orphan.mark_running();
    ScanCheckpoint::traversal(h.library.locations[0].id, "/movies/C.mkv")
        .apply_to(&mut orphan)
        .expect("checkpoint encodes");
    h.catalog.create_scan(&orphan).await.expect("seed scan");

    let interrupted = h.service.interrupted_scans().await.expect("list");
    assert_eq!(interrupted.len(), 1);
    assert_eq!(interrupted[0].id, orphan.id);

    let resumed = h.service.resume_interrupted_scans().await.expect("resume");
    assert_eq!(resumed, vec![orphan.id]);
    let scan = h.finish(orphan.id).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.counters.added, 2);
    assert_eq!(scan.counters.removed, 0);
    assert!(scan.resume_cursor.is_none());
    assert_eq!(h.live_paths().await.len(), 5);
    assert!(h.service.interrupted_scans().await.expect("list").is_empty());
}

#[tokio::test]
async fn running_scan_without_checkpoint_is_taken_over_by_next_start() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/A.mkv", 1);

    // Stopped after going Running but before its first progress write.
    let mut orphan = LibraryScan::pending(h.library.id);
    orphan.mark_running();
    h.catalog.create_scan(&orphan).await.expect("seed scan");
    assert!(h.service.interrupted_scans().await.expect("list").is_empty());

    let scan_id = h.service.start_scan(h.library.id).await.expect("start");
    assert_eq!(scan_id, orphan.id);
    let scan = h.finish(scan_id).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.counters.added, 1);
    assert_eq!(h.live_paths().await, vec![PathBuf::from("/movies/A.mkv")]);
    assert!(!h.service.is_executing(scan_id));
}

#[tokio::test]
async fn queued_scan_runs_only_when_started() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/A.mkv", 1);

    let queued = h.service.queue_scan(h.library.id).await.expect("queue");
    assert!(!h.service.is_executing(queued));
    assert_eq!(
        h.service.queue_scan(h.library.id).await.expect("queue again"),
        queued
    );
    let pending = h
        .service
        .get_scan_status(queued)
        .await
        .expect("status")
        .expect("scan record");
    assert_eq!(pending.status, ScanStatus::Pending);
    assert!(h.live_paths().await.is_empty());

    let started = h.service.start_scan(h.library.id).await.expect("start");
    assert_eq!(started, queued);
    let scan = h.finish(started).await;
    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.counters.added, 1);
}

#[tokio::test]
async fn part_added_beside_unchanged_first_part_joins_its_movie() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/Heat (1995)/Heat cd1.mkv", 10);
    h.completed_scan().await;
    let before = h
        .catalog
        .item_by_path(h.library.id, "/movies/Heat (1995)/Heat cd1.mkv")
        .await
        .expect("first part stored");

    h.fs.add_file("/movies/Heat (1995)/Heat cd2.mkv", 12);
    let scan = h.completed_scan().await;

    assert_eq!(scan.counters.added, 0);
    assert_eq!(scan.counters.updated, 1);
    let live = h.catalog.live_items(h.library.id).await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, before.id);
    assert_eq!(live[0].title, "Heat");
    assert_eq!(
        live[0]
            .additional_files
            .iter()
            .map(|file| file.path.clone())
            .collect::<Vec<_>>(),
        vec![PathBuf::from("/movies/Heat (1995)/Heat cd2.mkv")]
    );

    let rescan = h.completed_scan().await;
    assert_eq!(rescan.counters.added, 0);
    assert_eq!(rescan.counters.updated, 0);
    assert_eq!(rescan.counters.removed, 0);
}

#[tokio::test]
async fn resuming_a_finished_scan_is_a_conflict() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    let scan = h.completed_scan().await;
    let err = h.service.resume_scan(scan.id).await.expect_err("terminal");
    assert!(matches!(err, shelf_core::ScanError::Conflict(_)));
}

#[tokio::test]
async fn written_items_are_queued_for_enrichment() {
    let fs = shelf_core::InMemoryFs::new();
    fs.add_file("/tv/Show/Season 1/Show S01E01.mkv", 1);
    fs.add_file("/tv/Show/Season 1/Show S01E02.mkv", 1);
    let catalog = Arc::new(shelf_core::InMemoryCatalog::new());
    let library = shelf_model::Library::new(
        "TV",
        LibraryType::Series,
        [PathBuf::from("/tv")],
    );
    catalog.save_library(&library).await.expect("save");

    let (queue, mut requests) = ChannelEnrichmentQueue::new();
    let service =
        ScanService::builder(catalog.clone(), catalog.clone(), catalog.clone())
            .with_filesystem(Arc::new(fs))
            .with_enrichment(Arc::new(queue))
            .with_config(small_batches())
            .build();

    let scan_id = service.start_scan(library.id).await.expect("start");
    service.wait_for(scan_id).await.expect("wait");

    let mut queued = Vec::new();
    while let Ok(request) = requests.try_recv() {
        assert_eq!(request.library_id, library.id);
        queued.push(request.item_id);
    }
    let live: Vec<_> = catalog
        .live_items(library.id)
        .await
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(queued.len(), 4);
    assert!(live.iter().all(|id| queued.contains(id)));
}

#[tokio::test]
async fn subscribers_see_the_full_lifecycle() {
    let h = Harness::new(LibraryType::Movies, "/movies").await;
    h.fs.add_file("/movies/A.mkv", 1);
    let mut events = h.service.subscribe();

    let scan_id = h.service.start_scan(h.library.id).await.expect("start");
    h.finish(scan_id).await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.scan_id(), scan_id);
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(ScanEvent::Queued { .. })));
    assert!(matches!(
        seen.get(1),
        Some(ScanEvent::Started { resumed: false, .. })
    ));
    match seen.last() {
        Some(ScanEvent::Completed { counters, .. }) => {
            assert_eq!(counters.added, 1)
        }
        other => panic!("expected completion, got {other:?}"),
    }
}
