mod cli;
mod error;
mod job;
mod logging;

use clap::Parser;
use exn::ResultExt;
use miette::miette;
use omni_cache::{Database, Repository};
use omni_config::Config;
use omni_extract::Registry;
use omni_library::{ScanRequest, ScanResult, ScanStatus, Scanner};
use omni_storage::backend::LocalBackend;
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Command, ScanArgs};
use crate::error::{ErrorKind, Result};
use crate::job::JobRecord;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).map_err(|err| miette!("{err:?}"))?;
    if let Some(database) = cli.database {
        config.database = database;
    }

    match cli.command {
        Command::Scan(args) => {
            let result = scan(&config, &args).await.map_err(|err| miette!("{err:?}"))?;
            print_summary(&result);
            match result.status {
                ScanStatus::Completed | ScanStatus::Partial => Ok(()),
                ScanStatus::Cancelled => Err(miette!("scan cancelled")),
                ScanStatus::Failed => Err(match &result.failure {
                    Some(failure) => miette!("scan failed: {failure:?}"),
                    None => miette!("scan failed"),
                }),
            }
        },
    }
}

async fn scan(config: &Config, args: &ScanArgs) -> Result<ScanResult> {
    let root = std::path::absolute(&args.path).or_raise(|| ErrorKind::Library(args.path.clone()))?;
    let backend = LocalBackend::new("local", &root).map_err(|err| err.raise(ErrorKind::Library(root.clone())))?;

    if let Some(parent) = config.database.parent() {
        std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database(config.database.clone()))?;
    }
    let database = Database::connect(&config.database)
        .await
        .map_err(|err| err.raise(ErrorKind::Database(config.database.clone())))?;
    let scanner = Scanner::new(
        Arc::new(backend),
        Arc::new(Repository::from(&database)),
        Registry::default(),
        config.scanner.clone(),
    );

    let mut request = ScanRequest::new(&root, &args.user, &args.category)
        .recursive(!args.no_recursive)
        .on_progress(|progress| {
            eprintln!(
                "[{}] {} found, {} extracted, {} unchanged, {} errors",
                progress.state, progress.total, progress.processed, progress.skipped, progress.errored
            );
        });
    if let Some(parallel) = args.parallel {
        request = request.parallel(usize::from(parallel));
    }
    if args.verify {
        request = request.verify_hashes(true);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing files in progress");
            on_signal.cancel();
        }
    });

    let started = OffsetDateTime::now_utc();
    let result = scanner.scan_with_cancel(request, cancel).await.map_err(|err| err.raise(ErrorKind::Scan))?;
    database.close().await;

    let record = JobRecord::new(&root, &args.user, &args.category, started, &result);
    let jobs = config.database.parent().unwrap_or(Path::new("."));
    match record.save(jobs) {
        Ok(path) => info!(path = %path.display(), "Job record written"),
        Err(err) => warn!(error = ?err, "Job record not written"),
    }
    Ok(result)
}

fn print_summary(result: &ScanResult) {
    println!(
        "{}: {} files, {} extracted, {} unchanged, {} errors, {} removed in {:.1}s",
        result.status,
        result.total,
        result.processed,
        result.skipped,
        result.errored,
        result.deleted,
        result.duration.as_secs_f64()
    );
    for error in &result.errors {
        println!("  {error}");
    }
}
