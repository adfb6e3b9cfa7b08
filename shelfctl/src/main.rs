//! `shelfctl`: manage libraries and drive scans from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use shelf_core::ports::LibraryRepository;
use shelf_core::{
    InMemoryCatalog, PostgresCatalog, ScanEvent, ScanPipelineConfig,
    ScanService,
};
use shelf_model::{Library, LibraryId, LibraryScan, LibraryType, ScanId};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "shelfctl", about = "Shelf library scanner", version)]
struct Cli {
    /// PostgreSQL connection string for the catalog
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[arg(long, default_value_t = 5, global = true)]
    max_connections: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage library definitions
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Start (or join) a scan of a library and follow it to completion
    Scan {
        library_id: Uuid,
        /// Only record a pending scan; a later `scan` or `resume <scan-id>`
        /// executes it
        #[arg(long)]
        detach: bool,
    },
    /// Show one scan record
    Status { scan_id: Uuid },
    /// List every scan of a library, newest first
    History { library_id: Uuid },
    /// List scans left running by a stopped process
    Interrupted,
    /// Resume one interrupted scan, or all of them
    Resume { scan_id: Option<Uuid> },
    /// Scan directories into a throwaway in-memory catalog and print it
    Preview {
        #[arg(long = "type", value_enum, default_value = "movies")]
        library_type: LibraryTypeArg,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LibraryAction {
    /// Register a library with one or more root directories
    Add {
        #[arg(long)]
        name: String,
        #[arg(long = "type", value_enum)]
        library_type: LibraryTypeArg,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List registered libraries
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum LibraryTypeArg {
    Movies,
    Series,
}

impl From<LibraryTypeArg> for LibraryType {
    fn from(val: LibraryTypeArg) -> Self {
        match val {
            LibraryTypeArg::Movies => LibraryType::Movies,
            LibraryTypeArg::Series => LibraryType::Series,
        }
    }
}

fn load_config() -> Result<ScanPipelineConfig> {
    let (config, source) = ScanPipelineConfig::load_from_env()?;
    info!(target: "shelfctl", ?source, "loaded scan configuration");
    Ok(config)
}

async fn open_catalog(
    database_url: Option<&str>,
    max_connections: u32,
) -> Result<Arc<PostgresCatalog>> {
    let url = database_url
        .ok_or_else(|| anyhow!("--database-url or DATABASE_URL is required"))?;
    let catalog = PostgresCatalog::connect(url, max_connections)
        .await
        .context("failed to open catalog database")?;
    Ok(Arc::new(catalog))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Print events for `scan_id` until it finishes. Ctrl-C requests
/// cancellation and keeps following until the scan settles.
async fn follow(
    service: &ScanService,
    scan_id: ScanId,
    mut events: broadcast::Receiver<ScanEvent>,
) -> Result<LibraryScan> {
    if !service.is_executing(scan_id) {
        return service
            .wait_for(scan_id)
            .await?
            .ok_or_else(|| anyhow!("scan {scan_id} not found"));
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                warn!(target: "shelfctl", scan_id = %scan_id, "interrupt received; cancelling scan");
                service.cancel_scan(scan_id);
            }
            event = events.recv() => match event {
                Ok(event) if event.scan_id() == scan_id => {
                    print_json(&event)?;
                    if event.is_terminal() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "shelfctl", skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    service
        .wait_for(scan_id)
        .await?
        .ok_or_else(|| anyhow!("scan {scan_id} not found"))
}

async fn run_scan(
    service: &ScanService,
    library_id: LibraryId,
    detach: bool,
) -> Result<LibraryScan> {
    // Executions live on this process's runtime; detached scans are only
    // recorded.
    if detach {
        let scan_id = service.queue_scan(library_id).await?;
        return service
            .get_scan_status(scan_id)
            .await?
            .ok_or_else(|| anyhow!("scan {scan_id} not found"));
    }
    let events = service.subscribe();
    let scan_id = service.start_scan(library_id).await?;
    follow(service, scan_id, events).await
}

async fn preview(
    library_type: LibraryType,
    paths: Vec<PathBuf>,
    config: ScanPipelineConfig,
) -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let library = Library::new("preview", library_type, paths);
    catalog.save_library(&library).await?;

    let service =
        ScanService::builder(catalog.clone(), catalog.clone(), catalog.clone())
            .with_config(config)
            .build();
    let scan = run_scan(&service, library.id, false).await?;
    for item in catalog.live_items(library.id).await {
        print_json(&item)?;
    }
    print_json(&scan)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli {
        database_url,
        max_connections,
        command,
    } = Cli::parse();
    let config = load_config()?;

    let command = match command {
        Command::Preview {
            library_type,
            paths,
        } => return preview(library_type.into(), paths, config).await,
        command => command,
    };

    let catalog =
        open_catalog(database_url.as_deref(), max_connections).await?;
    let service =
        ScanService::builder(catalog.clone(), catalog.clone(), catalog.clone())
            .with_config(config)
            .build();

    match command {
        Command::Library { action } => match action {
            LibraryAction::Add {
                name,
                library_type,
                paths,
            } => {
                let library = Library::new(name, library_type.into(), paths);
                catalog.save_library(&library).await?;
                print_json(&library)?;
            }
            LibraryAction::List => {
                for library in catalog.list_libraries().await? {
                    print_json(&library)?;
                }
            }
        },
        Command::Scan { library_id, detach } => {
            let scan = run_scan(&service, LibraryId(library_id), detach).await?;
            print_json(&scan)?;
        }
        Command::Status { scan_id } => {
            let scan = service
                .get_scan_status(ScanId(scan_id))
                .await?
                .ok_or_else(|| anyhow!("scan {scan_id} not found"))?;
            print_json(&scan)?;
        }
        Command::History { library_id } => {
            let scans: Vec<LibraryScan> = service
                .scan_history(LibraryId(library_id))
                .try_collect()
                .await?;
            for scan in scans {
                print_json(&scan)?;
            }
        }
        Command::Interrupted => {
            for scan in service.interrupted_scans().await? {
                print_json(&scan)?;
            }
        }
        Command::Resume { scan_id } => {
            let ids = match scan_id {
                Some(id) => {
                    service.resume_scan(ScanId(id)).await?;
                    vec![ScanId(id)]
                }
                None => service.resume_interrupted_scans().await?,
            };
            if ids.is_empty() {
                info!(target: "shelfctl", "no interrupted scans to resume");
            }
            for id in ids {
                let events = service.subscribe();
                let scan = follow(&service, id, events).await?;
                print_json(&scan)?;
            }
        }
        Command::Preview { .. } => bail!("preview is handled before connecting"),
    }
    Ok(())
}
