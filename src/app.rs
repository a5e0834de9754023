//! Application entry point shared by the binary and integration tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use yansi::Paint;

use crate::analysis::{AudioAnalyzer, Cancelled, FileAnalyzer};
use crate::batch::{BatchScheduler, BatchSummary};
use crate::cache::CacheStore;
use crate::cli::{Cli, Commands, InspectArgs, ScanArgs};
use crate::config::Config;
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::write_report;
use crate::progress::{NullProgress, ProgressSink, TerminalProgress};
use crate::scanner::Hasher;
use crate::signal::install_handler;

/// Global presentation flags.
#[derive(Debug, Clone, Copy)]
struct Presentation {
    quiet: bool,
    accessible: bool,
}

/// Run the parsed command line.
///
/// # Errors
///
/// Returns an error for run-fatal conditions: bad configuration, an
/// invalid root, or a cache that cannot be loaded or saved. Per-file
/// failures and report failures are reported through the exit code.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    if cli.no_color {
        yansi::disable();
    }

    // The error log sits beside the cache, so configuration resolves first.
    let (file, mut overrides) = match &cli.command {
        Commands::Scan(args) => (args.detector.config.as_deref(), args.overrides()),
        Commands::Report(args) => (args.config.as_deref(), args.overrides()),
        Commands::Inspect(args) => (args.detector.config.as_deref(), args.overrides()),
    };
    overrides.log_file = cli.log_file.clone();
    let config = Config::load(file, &overrides).context("Failed to load configuration")?;

    init_logging(cli.verbose, cli.quiet, config.error_log_path().as_deref());
    log::debug!("Effective configuration: {config:?}");

    let presentation = Presentation {
        quiet: cli.quiet,
        accessible: cli.accessible,
    };

    let result = match &cli.command {
        Commands::Scan(args) => run_scan(args, &config, presentation),
        Commands::Report(_) => run_report(&config),
        Commands::Inspect(args) => run_inspect(args, &config),
    };
    log::logger().flush();
    result
}

fn open_store(config: &Config) -> Result<CacheStore> {
    let path = match &config.cache_path {
        Some(path) => path.clone(),
        None => CacheStore::default_path().context("Failed to locate the cache directory")?,
    };
    CacheStore::open(&path).with_context(|| format!("Failed to load cache {}", path.display()))
}

fn run_scan(args: &ScanArgs, config: &Config, presentation: Presentation) -> Result<ExitCode> {
    let handler = install_handler()?;
    let flag = handler.get_flag();

    let mut store = if args.no_cache {
        CacheStore::in_memory()
    } else {
        open_store(config)?
    };
    if args.clear_cache {
        log::info!("Clearing {} cached records", store.len());
        store.clear();
    }

    let progress: Arc<dyn ProgressSink> = if args.no_progress || presentation.quiet {
        Arc::new(NullProgress)
    } else {
        Arc::new(TerminalProgress::new(presentation.quiet, presentation.accessible))
    };

    let analyzer =
        Arc::new(AudioAnalyzer::new(config.analyzer_config()).with_shutdown_flag(Arc::clone(&flag)));
    let batch = config
        .batch_config()
        .with_shutdown_flag(flag)
        .with_progress(progress);
    let scheduler = BatchScheduler::new(batch, analyzer);

    let summary = scheduler
        .run(&args.root, &mut store)
        .with_context(|| format!("Failed to scan {}", args.root.display()))?;

    // Completed records are kept even when the run was interrupted.
    if let Err(e) = store.save() {
        log::error!("Failed to save cache: {e}");
        print_summary(&summary);
        return Err(e).context("Failed to save analysis cache");
    }

    if summary.interrupted {
        print_summary(&summary);
        return Ok(ExitCode::Interrupted);
    }

    let report_path = config.report_path();
    let report_ok = match write_report(&report_path, config.report_format, store.records()) {
        Ok(_) => true,
        Err(e) => {
            log::error!("{e}");
            false
        }
    };

    print_summary(&summary);
    if report_ok {
        println!("Report: {}", report_path.display().bold());
        Ok(if summary.has_issues() {
            ExitCode::PartialSuccess
        } else {
            ExitCode::Success
        })
    } else {
        eprintln!(
            "{} results were saved; run `hifirate report` to retry writing the report",
            "Report failed:".red().bold()
        );
        Ok(ExitCode::ReportFailed)
    }
}

fn run_report(config: &Config) -> Result<ExitCode> {
    let store = open_store(config)?;
    if store.is_empty() {
        log::warn!("The cache is empty; the report will have no rows");
    }

    let report_path = config.report_path();
    match write_report(&report_path, config.report_format, store.records()) {
        Ok(rows) => {
            println!("Wrote {rows} rows to {}", report_path.display().bold());
            Ok(ExitCode::Success)
        }
        Err(e) => {
            log::error!("{e}");
            Ok(ExitCode::ReportFailed)
        }
    }
}

fn run_inspect(args: &InspectArgs, config: &Config) -> Result<ExitCode> {
    let handler = install_handler()?;

    let identity = Hasher::new()
        .identify(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let analyzer = AudioAnalyzer::new(config.analyzer_config()).with_shutdown_flag(handler.get_flag());
    let record = match analyzer.analyze(&identity) {
        Ok(record) => record,
        Err(Cancelled) => return Ok(ExitCode::Interrupted),
    };

    let output = serde_json::json!({
        "content_hash": identity.content_hash,
        "record": record,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(if record.has_failures() {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "{} {} files in {:.1}s",
        "Processed".bold(),
        summary.processed(),
        summary.duration.as_secs_f64()
    );
    println!("  {:<16}{}", "analyzed", summary.analyzed.green());
    println!("  {:<16}{}", "skipped (cached)", summary.skipped.cyan());

    let unresolved = summary.unresolved;
    if unresolved > 0 {
        println!("  {:<16}{}", "unresolved", unresolved.red());
    } else {
        println!("  {:<16}{}", "unresolved", unresolved);
    }

    let partial = summary.partial_failures;
    if partial > 0 {
        println!("  {:<16}{}", "with errors", partial.yellow());
    } else {
        println!("  {:<16}{}", "with errors", partial);
    }

    if summary.scan_errors > 0 {
        println!("  {:<16}{}", "scan errors", summary.scan_errors.yellow());
    }
    if summary.interrupted {
        println!(
            "{} {} files were not processed",
            "Interrupted:".yellow().bold(),
            summary.total.saturating_sub(summary.processed())
        );
    }
}
