//! recompress - force re-compression of a directory tree
//!
//! Rewrites every regular file in place so a copy-on-write filesystem
//! stores it again with its current compression setting.

use clap::{Parser, ValueEnum};
use indicatif::ProgressBar;
use recompress::{
    DEFAULT_PARALLEL, Error as RecompressError, ErrorCode, RecompressBuilder, RewriteOutcome,
    RunReport, create_progress_spinner, format_bytes,
};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const SCHEMA_VERSION: &str = "1.0";

/// recompress - rewrite files so the filesystem compresses them again
///
/// Every regular file under DIRECTORY is copied to a temporary sibling and
/// atomically renamed over the original. On ZFS or btrfs this re-applies the
/// dataset's current compression setting to existing data.
///
/// Usage:
///   recompress [DIRECTORY]
///   recompress -d DIRECTORY -j 16
#[derive(Parser, Debug)]
#[command(name = "recompress", version, about, long_about = None)]
struct Args {
    /// Directory to process (default: current directory)
    #[arg(value_name = "DIRECTORY")]
    path: Option<PathBuf>,

    /// Directory to process, as a flag
    #[arg(
        short = 'd',
        long = "directory",
        value_name = "DIRECTORY",
        conflicts_with = "path"
    )]
    directory: Option<PathBuf>,

    /// Number of files rewritten concurrently
    #[arg(short = 'j', long, default_value_t = DEFAULT_PARALLEL)]
    jobs: usize,

    /// Show what would be rewritten without writing anything
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    output: OutputMode,

    /// Disable the progress spinner
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Verbose output (per-file log lines, degraded files)
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Do not fsync temp files and directories (faster but less safe)
    #[arg(long)]
    no_sync: bool,

    /// Do not preserve file permissions
    #[arg(long)]
    no_perms: bool,

    /// Do not preserve file timestamps
    #[arg(long)]
    no_times: bool,

    /// Do not preserve file ownership
    #[arg(long)]
    no_owner: bool,

    /// Leave 0-byte files alone
    #[arg(long)]
    skip_empty: bool,

    /// Skip dot-files and dot-directories
    #[arg(long)]
    skip_hidden: bool,

    /// Do not cross into other filesystems
    #[arg(short = 'x', long)]
    one_file_system: bool,

    /// Delete temp files left behind by interrupted runs
    #[arg(long)]
    clean_temp: bool,
}

impl Args {
    fn root(&self) -> PathBuf {
        self.path
            .clone()
            .or_else(|| self.directory.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn mode(&self) -> &'static str {
        if self.dry_run { "dry_run" } else { "execute" }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
enum CliError {
    #[error("{source}")]
    Run { source: RecompressError },

    #[error("Failed to serialize JSON output: {source}")]
    JsonSerialize { source: serde_json::Error },
}

impl CliError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Run { source } => source.code(),
            Self::JsonSerialize { .. } => ErrorCode::Internal,
        }
    }

    fn to_json_value(&self, mode: &str) -> Value {
        json!({
            "schema_version": SCHEMA_VERSION,
            "mode": mode,
            "error": {
                "code": self.code().as_str(),
                "message": self.to_string(),
            },
        })
    }
}

/// How a run that did not hit a fatal error ended.
enum RunEnd {
    Completed,
    Cancelled,
}

fn exit_code_for(code: ErrorCode) -> i32 {
    if code.is_invalid_input() { 2 } else { 1 }
}

fn main() {
    match run() {
        Ok(RunEnd::Completed) => {}
        Ok(RunEnd::Cancelled) => std::process::exit(130),
        Err(error) => {
            eprintln!("error[{}]: {}", error.code(), error);
            std::process::exit(exit_code_for(error.code()));
        }
    }
}

fn run() -> CliResult<RunEnd> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let root = args.root();
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel_clone = cancel.clone();
        ctrlc::set_handler(move || {
            if cancel_clone.load(Ordering::Relaxed) {
                eprintln!("\nForce quit.");
                std::process::exit(130);
            }
            cancel_clone.store(true, Ordering::Relaxed);
            eprintln!(
                "\nCancelling... finishing in-flight files. Press Ctrl+C again to abort immediately."
            );
        })
        .ok();
    }

    let pb = if args.output == OutputMode::Human && !args.quiet {
        let pb = create_progress_spinner();
        pb.set_message(format!("Scanning {}...", root.display()));
        Some(pb)
    } else {
        None
    };

    let mut builder = build(&args, &root).cancel_token(cancel);
    if let Some(pb) = &pb {
        builder = builder.on_progress(spinner_updater(pb.clone(), args.dry_run));
    }
    log_effective_config(&args, &root);

    let result = builder.run();

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let report = match result {
        Ok(report) => report,
        Err(source) => {
            let error = CliError::Run { source };
            if args.output == OutputMode::Json {
                print_json_value(&error.to_json_value(args.mode()))?;
            }
            return Err(error);
        }
    };

    match args.output {
        OutputMode::Human => print_report(&report, args.dry_run, args.verbose),
        OutputMode::Json => print_json_value(&report_json(&report, args.mode())?)?,
    }

    if report.cancelled {
        eprintln!(
            "Cancelled: {} files processed of {} discovered",
            report.files_processed(),
            report.files_discovered
        );
        eprintln!("Re-run the same command to finish; rewriting a file twice is harmless.");
        return Ok(RunEnd::Cancelled);
    }
    Ok(RunEnd::Completed)
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_directive = if verbose {
        "recompress=debug"
    } else if quiet {
        "recompress=warn"
    } else {
        "recompress=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build(args: &Args, root: &Path) -> RecompressBuilder {
    let mut builder = RecompressBuilder::new(root).parallel(args.jobs);
    if args.no_sync {
        builder = builder.no_fsync();
    }
    if args.no_perms {
        builder = builder.no_permissions();
    }
    if args.no_times {
        builder = builder.no_timestamps();
    }
    if args.no_owner {
        builder = builder.no_ownership();
    }
    if args.skip_empty {
        builder = builder.skip_empty();
    }
    if args.skip_hidden {
        builder = builder.skip_hidden();
    }
    if args.one_file_system {
        builder = builder.one_file_system();
    }
    if args.clean_temp {
        builder = builder.remove_stale_temps();
    }
    if args.dry_run {
        builder = builder.dry_run();
    }
    builder
}

/// Keep the spinner message at "N files, X rewritten".
fn spinner_updater(
    pb: ProgressBar,
    dry_run: bool,
) -> impl Fn(&Path, &RewriteOutcome) + Send + Sync + 'static {
    let files = AtomicU64::new(0);
    let bytes = AtomicU64::new(0);
    let verb = if dry_run { "to rewrite" } else { "rewritten" };

    move |_: &Path, outcome: &RewriteOutcome| {
        let done = files.fetch_add(1, Ordering::Relaxed) + 1;
        if let RewriteOutcome::Rewritten { bytes: written, .. } = outcome {
            bytes.fetch_add(*written, Ordering::Relaxed);
        }
        pb.set_message(format!(
            "{} files, {} {}",
            done,
            format_bytes(bytes.load(Ordering::Relaxed)),
            verb
        ));
    }
}

/// Shown with `-v`, which enables debug level for this crate.
fn log_effective_config(args: &Args, root: &Path) {
    tracing::debug!(
        "Effective configuration: directory={} jobs={} mode={} fsync={} \
         preserve_permissions={} preserve_timestamps={} preserve_ownership={} \
         one_file_system={} clean_temp={}",
        root.display(),
        args.jobs,
        args.mode(),
        !args.no_sync,
        !args.no_perms,
        !args.no_times,
        !args.no_owner,
        args.one_file_system,
        args.clean_temp,
    );
}

fn print_report(report: &RunReport, dry_run: bool, verbose: bool) {
    let bytes_str = format_bytes(report.bytes_rewritten);

    if dry_run {
        println!(
            "Would rewrite {} files ({}), skip {}",
            report.files_rewritten,
            bytes_str,
            report.files_skipped()
        );
    } else {
        println!(
            "Rewrote {} files ({}), {} skipped, {} failed in {:.2?}",
            report.files_rewritten,
            bytes_str,
            report.files_skipped(),
            report.files_failed,
            report.duration
        );
    }

    for failure in &report.failures {
        eprintln!(
            "failed {}: {}: {}",
            failure.path.display(),
            failure.kind,
            failure.message
        );
    }

    if verbose {
        for degraded in &report.degraded {
            eprintln!("degraded {}: {}", degraded.path.display(), degraded.note);
        }
        if report.duration.as_secs_f64() > 0.0 && !dry_run {
            let speed = report.bytes_rewritten as f64 / report.duration.as_secs_f64();
            eprintln!("  Speed: {}/s", format_bytes(speed as u64));
        }
    } else if report.files_degraded > 0 {
        eprintln!(
            "{} files rewritten with incomplete metadata (use -v for details)",
            report.files_degraded
        );
    }

    let stale_left = report.stale_temps_found - report.stale_temps_removed;
    if stale_left > 0 {
        eprintln!(
            "{stale_left} leftover temp files from an interrupted run; use --clean-temp to remove them"
        );
    }
}

fn report_json(report: &RunReport, mode: &str) -> CliResult<Value> {
    let report =
        serde_json::to_value(report).map_err(|source| CliError::JsonSerialize { source })?;
    Ok(json!({
        "schema_version": SCHEMA_VERSION,
        "mode": mode,
        "report": report,
    }))
}

fn print_json_value(value: &Value) -> CliResult<()> {
    let serialized =
        serde_json::to_string(value).map_err(|source| CliError::JsonSerialize { source })?;
    println!("{serialized}");
    Ok(())
}
