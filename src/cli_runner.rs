//! Command-line driver shared by the `attrsnap` binary and the integration
//! tests: logging setup, Ctrl-C wiring and the two modes.

use crate::cancel::CancelToken;
use crate::capture::{self, CaptureRequest};
use crate::cli::{self, Args, Commands, RestoreArgs, SaveArgs};
use crate::error::{AttrError, Result};
use crate::filter::PathFilter;
use crate::fsx::{HostOps, PlatformCaps};
use crate::paths;
use crate::restore::Restorer;
use crate::snapshot::Snapshot;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parses the arguments and runs the requested mode.
pub fn run_cli_app() -> Result<()> {
    let args = cli::run();
    init_logging(&args);

    let cancel = CancelToken::new();
    if let Err(e) = cancel.install_ctrl_c_handler() {
        tracing::warn!("Ctrl-C handler unavailable: {}", e);
    }

    match &args.command {
        Commands::Save(save) => run_save(save, &cancel),
        Commands::Restore(restore) => run_restore(restore, &cancel),
    }
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    // A subscriber may already be installed when embedded.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn run_save(args: &SaveArgs, cancel: &CancelToken) -> Result<()> {
    let root = paths::working_root(&args.working_path)?;
    let output = paths::output_path(&paths::snapshot_path_from_opt_or_env(args.output.clone()))?;
    let mut patterns = args.exclusions.exclude.clone();
    exclude_output_file(&root, &output, &mut patterns);

    let request = CaptureRequest {
        root,
        output,
        patterns,
        pattern_files: args.exclusions.ignore_file.clone(),
        ignore_case: args.exclusions.ignore_case,
        options: args.save_options(),
    };
    let summary = capture::capture(&request, cancel)?;
    tracing::info!(entries = summary.entries, failed = summary.failed, "capture finished");
    Ok(())
}

pub fn run_restore(args: &RestoreArgs, cancel: &CancelToken) -> Result<()> {
    let input = paths::input_path(&paths::snapshot_path_from_opt_or_env(args.input.clone()))?;
    let root = paths::working_root(&args.working_path)?;
    let filter = PathFilter::compile(
        &root,
        &args.exclusions.ignore_file,
        &args.exclusions.exclude,
        args.exclusions.ignore_case,
    )?;
    let snapshot = Snapshot::load(&input)?;

    let ops = HostOps::new(args.exclusions.creation_fallback());
    let restorer = Restorer::new(&ops, PlatformCaps::host(), args.restore_options(), filter.as_ref(), root);
    let summary = restorer.run(&snapshot, cancel)?;

    if summary.nothing_changed() {
        println!("Nothing to change.");
        return Ok(());
    }
    if summary.changed > 0 {
        println!("Restored attributes of {} item(s).", summary.changed);
    }
    if summary.errors.is_empty() {
        return Ok(());
    }

    println!("\nThe following paths could not be restored:");
    for failure in &summary.errors {
        println!("  \"{}\": {}", failure.path.display(), failure.message);
    }
    println!("\nThere were {} errors while restoring the attributes.", summary.errors.len());
    Err(AttrError::RestoreFailed(summary.errors.len()))
}

/// Keeps a snapshot written inside the tree out of itself.
fn exclude_output_file(root: &std::path::Path, output: &std::path::Path, patterns: &mut Vec<String>) {
    if let Ok(relative) = output.strip_prefix(root) {
        let candidate = PathFilter::candidate(relative, false);
        if !candidate.is_empty() {
            patterns.push(format!("/{}", escape_glob(&candidate)));
        }
    }
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
