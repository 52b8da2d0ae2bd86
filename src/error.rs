use std::path::PathBuf;
use thiserror::Error;

/// Process exit status: everything went fine.
pub const SUCCESS: u8 = 0;
/// Process exit status: the user pressed Ctrl-C.
pub const USER_INTERRUPTED: u8 = 1;
/// Process exit status: failures that are neither path nor snapshot related.
pub const GENERIC_ERROR: u8 = 2;
/// Process exit status: a working path, output path or pattern file is unusable.
pub const FILE_RELATED: u8 = 3;
/// Process exit status: the snapshot file is empty, unreadable or corrupt.
pub const SNAPSHOT_FILE_RELATED: u8 = 10;

/// The primary error type for all operations in the `attrsnap` crate.
#[derive(Debug, Error)]
pub enum AttrError {
    /// The working path does not exist or is not a directory.
    #[error("The specified working path doesn't exist: {0}")]
    RootNotFound(PathBuf),

    /// A user supplied path is malformed or collides with an existing entry.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// A pattern file could not be opened or read.
    #[error("Could not read ignore file '{path}': {source}")]
    PatternFile { path: PathBuf, source: std::io::Error },

    /// A pattern line could not be compiled.
    #[error("Invalid exclusion pattern: {0}")]
    Pattern(#[from] ignore::Error),

    #[error("Attribute file \"{0}\" not found")]
    SnapshotNotFound(PathBuf),

    #[error("The attribute file is empty: {0}")]
    SnapshotEmpty(PathBuf),

    #[error("There was an error reading the attribute file '{path}', no attribute has been changed: {source}")]
    SnapshotRead { path: PathBuf, source: std::io::Error },

    #[error("Attribute file '{path}' is not valid JSON: {source}")]
    SnapshotParse { path: PathBuf, source: serde_json::Error },

    /// A single record has an unrecognized shape. Aborts the whole restore.
    #[error("Attribute file is corrupt, error in path \"{path}\": {reason}")]
    CorruptRecord { path: String, reason: String },

    #[error("There was an error writing to the attribute file '{path}': {source}")]
    SnapshotWrite { path: PathBuf, source: std::io::Error },

    #[error("Too many consecutive errors ({0}), aborting")]
    TooManyErrors(usize),

    /// Per-path failures were recorded during a full restore pass.
    #[error("There were {0} errors while restoring the attributes")]
    RestoreFailed(usize),

    #[error("Shutdown requested")]
    Interrupted,

    #[error("I/O error on path '{path}': {source}")]
    Io { source: std::io::Error, path: PathBuf },
}

impl AttrError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AttrError::Io { source, path: path.into() }
    }

    /// Maps the error onto the exit status reported by the command-line tool.
    pub fn exit_code(&self) -> u8 {
        match self {
            AttrError::Interrupted => USER_INTERRUPTED,
            AttrError::TooManyErrors(_) | AttrError::RestoreFailed(_) => GENERIC_ERROR,
            AttrError::RootNotFound(_)
            | AttrError::InvalidPath { .. }
            | AttrError::PatternFile { .. }
            | AttrError::Pattern(_)
            | AttrError::SnapshotNotFound(_)
            | AttrError::SnapshotWrite { .. }
            | AttrError::Io { .. } => FILE_RELATED,
            AttrError::SnapshotEmpty(_)
            | AttrError::SnapshotRead { .. }
            | AttrError::SnapshotParse { .. }
            | AttrError::CorruptRecord { .. } => SNAPSHOT_FILE_RELATED,
        }
    }
}

/// Result type alias for attrsnap operations.
pub type Result<T> = std::result::Result<T, AttrError>;
