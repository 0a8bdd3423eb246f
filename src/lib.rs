// src/lib.rs

pub mod book;
pub mod capture;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod imaging;
pub mod library;
pub mod logging;
pub mod orchestrator;
pub mod pipelines;
pub mod remote;
pub mod scandata;
pub mod scheduler;
pub mod task;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_or_default;
use crate::config::model::ConfigFile;
use crate::fs::{FileSystem, RealFileSystem};
use crate::imaging::NoopImages;
use crate::library::{DirLibrary, Library};
use crate::orchestrator::{BookFacts, MoveAlong, Orchestrator};
use crate::pipelines::{download_sync_task, Services};
use crate::remote::OfflineArchive;
use crate::scheduler::Scheduler;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the directory library
/// - scheduler and worker pools
/// - the periodic move-along and download-sync meta-tasks
/// - the status-change listener
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = Arc::new(load_or_default(&config_path)?);

    let library_root = args
        .library
        .clone()
        .unwrap_or_else(|| cfg.library.path.clone());
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let library: Arc<dyn Library> = Arc::new(DirLibrary::open(&library_root, fs)?);
    info!(root = ?library_root, "library opened");

    let orchestrator = Orchestrator::new(cfg.clone())?;

    if args.dry_run {
        print_dry_run(&cfg, library.as_ref(), &orchestrator);
        return Ok(());
    }

    let services = Services::new(
        cfg.clone(),
        library,
        Arc::new(OfflineArchive),
        Arc::new(NoopImages),
    );

    let scheduler = Scheduler::from_config(&cfg)?;
    scheduler.start();

    let move_along = MoveAlong::new(orchestrator, services.clone());

    if args.once {
        let task = move_along.meta_task(scheduler.submitter()).build();
        scheduler.schedule(task)?;
        scheduler.wait_idle().await;
        scheduler.stop().await;
        return Ok(());
    }

    let periodic = move_along
        .meta_task(scheduler.submitter())
        .interval(cfg.move_along_interval())
        .build();
    scheduler.schedule(periodic)?;

    let sync = download_sync_task(&services, scheduler.submitter())
        .interval(cfg.download_sync_interval())
        .build();
    scheduler.schedule(sync)?;

    let listener = move_along.spawn_listener(scheduler.subscribe(), scheduler.submitter());

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; stopping");
    }
    info!("shutdown requested");

    listener.abort();
    scheduler.stop().await;
    Ok(())
}

/// Print every book with the action the next pass would take.
fn print_dry_run(cfg: &ConfigFile, library: &dyn Library, orchestrator: &Orchestrator) {
    let books = library.get_all_books();

    println!("bookflow dry-run");
    println!("  orchestrator.auto_upload = {}", cfg.orchestrator.auto_upload);
    println!(
        "  orchestrator.delete_after_upload = {}",
        cfg.orchestrator.delete_after_upload
    );
    println!(
        "  orchestrator.required_metadata = {:?}",
        cfg.orchestrator.required_metadata
    );
    println!();

    println!("books ({}):", books.len());
    for book in &books {
        let book = book.lock();
        println!("  - {}", book.uuid());
        if let Some(id) = book.identifier() {
            println!("      identifier: {id}");
        }
        println!("      status: {}", book.status());
        if let Some(error) = book.error() {
            println!("      error: {error}");
        }

        let next = match BookFacts::gather(&book, cfg) {
            Ok(facts) => match orchestrator.evaluate(&book, &facts) {
                Some(action) => action.to_string(),
                None => "nothing".to_string(),
            },
            Err(e) => format!("unreadable ({e})"),
        };
        println!("      next: {next}");
    }

    debug!("dry-run complete (no execution)");
}
