//! Resolution and validation of the user supplied paths.

use crate::error::{AttrError, Result};
use std::path::{Path, PathBuf};

/// Snapshot file name used when none is given.
pub const DEFAULT_SNAPSHOT_NAME: &str = ".saved-file-attrs";

/// Environment variable consulted when no snapshot path is passed.
pub const SNAPSHOT_ENV: &str = "ATTRSNAP_FILE";

/// Picks the snapshot path from the command-line option, then the
/// `ATTRSNAP_FILE` environment variable, then the default name.
pub fn snapshot_path_from_opt_or_env(opt: Option<PathBuf>) -> PathBuf {
    if let Some(path) = opt {
        return path;
    }
    match std::env::var_os(SNAPSHOT_ENV) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_SNAPSHOT_NAME),
    }
}

/// Validates the working path and returns it in absolute form.
pub fn working_root(path: &Path) -> Result<PathBuf> {
    reject_trailing_quote(path)?;
    let path = with_drive_separator(path);
    if !path.is_dir() {
        return Err(AttrError::RootNotFound(path));
    }
    absolute(&path)
}

/// Resolves where a new snapshot is written, creating missing parent directories.
pub fn output_path(path: &Path) -> Result<PathBuf> {
    reject_trailing_quote(path)?;
    let path = with_default_name(&with_drive_separator(path));

    if path.is_dir() {
        return Err(AttrError::InvalidPath {
            path,
            reason: "a directory with this name already exists".into(),
        });
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if parent.is_file() {
            return Err(AttrError::InvalidPath {
                path: parent.to_path_buf(),
                reason: "the output directory is an existing file".into(),
            });
        }
        std::fs::create_dir_all(parent).map_err(|e| AttrError::io(parent, e))?;
    }
    absolute(&path)
}

/// Resolves the snapshot to restore from. It must exist and be a file.
pub fn input_path(path: &Path) -> Result<PathBuf> {
    reject_trailing_quote(path)?;
    let path = with_default_name(path);
    if !path.exists() {
        return Err(AttrError::SnapshotNotFound(path));
    }
    if path.is_dir() {
        return Err(AttrError::InvalidPath { path, reason: "expected a file, found a directory".into() });
    }
    absolute(&path)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| AttrError::io(path, e))
}

fn ends_with_separator(path: &Path) -> bool {
    let s = path.as_os_str().to_string_lossy();
    s.ends_with('/') || (cfg!(windows) && s.ends_with('\\'))
}

fn with_default_name(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() || ends_with_separator(path) {
        path.join(DEFAULT_SNAPSHOT_NAME)
    } else {
        path.to_path_buf()
    }
}

/// `cmd.exe` turns `"C:\dir\"` into `C:\dir"`; such a path is never what was meant.
fn reject_trailing_quote(path: &Path) -> Result<()> {
    if cfg!(windows) && path.as_os_str().to_string_lossy().ends_with('"') {
        return Err(AttrError::InvalidPath { path: path.to_path_buf(), reason: "invalid character '\"'".into() });
    }
    Ok(())
}

/// `C:` means "current directory on drive C"; `C:\` is the drive root.
fn with_drive_separator(path: &Path) -> PathBuf {
    if cfg!(windows) {
        let s = path.as_os_str().to_string_lossy();
        if s.len() == 2 && s.ends_with(':') {
            return PathBuf::from(format!("{s}\\"));
        }
    }
    path.to_path_buf()
}
