//! # attrsnap
//!
//! Saves the attributes of every file and directory in a tree (timestamps,
//! POSIX mode and ownership, Windows attribute flags) into a JSON snapshot and
//! later puts them back, touching only what actually differs.
//!
//! ## Key Modules
//!
//! - [`filter`]: gitignore style exclusion rules.
//! - [`walker`]: tree enumeration that never enters excluded directories.
//! - [`reader`]: turns live metadata into snapshot records.
//! - [`snapshot`]: the JSON document, loaded and validated as a whole.
//! - [`diff`] and [`writer`]: per-path comparison and mutation.
//! - [`capture`] and [`restore`]: the two passes tying it all together.
//! - [`fsx`]: everything that differs between operating systems.
//!
//! ```no_run
//! use attrsnap::cancel::CancelToken;
//! use attrsnap::fsx::{HostOps, PlatformCaps};
//! use attrsnap::restore::{RestoreOptions, Restorer};
//! use attrsnap::snapshot::Snapshot;
//! use std::path::Path;
//!
//! # fn main() -> attrsnap::Result<()> {
//! let snapshot = Snapshot::load(Path::new("/data/.saved-file-attrs"))?;
//! let ops = HostOps::default();
//! let summary = Restorer::new(&ops, PlatformCaps::host(), RestoreOptions::default(), None, "/data")
//!     .run(&snapshot, &CancelToken::new())?;
//! println!("{} paths changed", summary.changed);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod capture;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod diff;
pub mod error;
pub mod filter;
pub mod paths;
pub mod reader;
pub mod record;
pub mod restore;
pub mod snapshot;
pub mod walker;
pub mod writer;

// Cross-platform filesystem wrapper
pub mod fsx;

pub use error::{AttrError, Result};
