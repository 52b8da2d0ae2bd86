//! Capture pass: walk a tree, read every entry, write the snapshot.

use crate::cancel::CancelToken;
use crate::error::{AttrError, Result};
use crate::filter::PathFilter;
use crate::fsx::{AttributeOps, HostOps, PlatformCaps};
use crate::reader::{AttributeReader, ReaderOptions};
use crate::snapshot::Snapshot;
use crate::walker::{self, TreeEntry, WalkOptions};
use std::path::{Path, PathBuf};

/// Consecutive read failures after which the capture gives up.
pub const MAX_CONSECUTIVE_ERRORS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    /// Store keys relative to the working root instead of absolute paths.
    pub relative: bool,
    pub walk: WalkOptions,
    pub reader: ReaderOptions,
}

/// Everything one capture needs. `root` and `output` are expected to be
/// absolute and already validated.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub root: PathBuf,
    pub output: PathBuf,
    pub patterns: Vec<String>,
    pub pattern_files: Vec<PathBuf>,
    pub ignore_case: bool,
    pub options: SaveOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub output: PathBuf,
    pub entries: usize,
    /// Entries whose attributes could not be read.
    pub failed: usize,
}

pub fn capture(request: &CaptureRequest, cancel: &CancelToken) -> Result<CaptureSummary> {
    let ops = HostOps::new(request.options.reader.creation_fallback);
    capture_with(request, &ops, cancel)
}

/// Runs the capture with `ops` answering every metadata read.
///
/// On cancellation or after [`MAX_CONSECUTIVE_ERRORS`] failed reads in a row
/// the records collected so far are still written before the error is returned.
pub fn capture_with(request: &CaptureRequest, ops: &dyn AttributeOps, cancel: &CancelToken) -> Result<CaptureSummary> {
    let filter = PathFilter::compile(&request.root, &request.pattern_files, &request.patterns, request.ignore_case)?;
    let entries = walker::walk(&request.root, filter.as_ref(), request.options.walk, cancel)?;
    let reader = AttributeReader::new(PlatformCaps::host(), request.options.reader);

    let mut snapshot = Snapshot::new();
    let mut failed = 0;
    let mut consecutive = 0;

    for entry in &entries {
        if cancel.is_cancelled() {
            if !snapshot.is_empty() {
                save(&snapshot, request, ops)?;
            }
            return Err(AttrError::Interrupted);
        }

        match ops.live(&entry.path) {
            Ok(live) => {
                consecutive = 0;
                snapshot.insert(key_for(entry, request.options.relative), reader.record_from_live(&live));
            }
            Err(e) => {
                failed += 1;
                consecutive += 1;
                tracing::warn!(path = %entry.path.display(), "could not read attributes: {}", e);
                if consecutive >= MAX_CONSECUTIVE_ERRORS {
                    if !snapshot.is_empty() {
                        save(&snapshot, request, ops)?;
                    }
                    return Err(AttrError::TooManyErrors(consecutive));
                }
            }
        }
    }

    save(&snapshot, request, ops)?;
    Ok(CaptureSummary { output: request.output.clone(), entries: snapshot.len(), failed })
}

fn save(snapshot: &Snapshot, request: &CaptureRequest, ops: &dyn AttributeOps) -> Result<()> {
    snapshot.save(&request.output)?;
    settle_output_parents(snapshot, request, ops);
    println!("Attributes saved to \"{}\"", request.output.display());
    Ok(())
}

/// Writing the snapshot bumps the times of the directory it lands in. Every
/// such directory below the root that was captured gets its recorded times back.
fn settle_output_parents(snapshot: &Snapshot, request: &CaptureRequest, ops: &dyn AttributeOps) {
    let Some(parent) = request.output.parent() else {
        return;
    };
    for dir in parent.ancestors() {
        let Ok(relative) = dir.strip_prefix(&request.root) else {
            break;
        };
        if relative.as_os_str().is_empty() {
            break;
        }
        let key = if request.options.relative { relative } else { dir };
        let Some(record) = snapshot.get(&key.to_string_lossy()) else {
            continue;
        };
        let times = record.times();
        if let Err(e) = ops.set_times(dir, times.atime, times.mtime) {
            tracing::warn!(path = %dir.display(), "could not reset directory times: {}", e);
        }
    }
}

fn key_for(entry: &TreeEntry, relative: bool) -> String {
    if relative {
        entry.relative.to_string_lossy().into_owned()
    } else {
        entry.path.to_string_lossy().into_owned()
    }
}
