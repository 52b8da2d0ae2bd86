//! Restore pass: walks a snapshot and puts every recorded attribute back.
//!
//! Entries are handled one at a time in key order. Each one is filtered,
//! looked up on disk, compared with [`AttributeDiffer`] and, if anything
//! differs, written with [`AttributeWriter`]. A failure on one path is
//! recorded in the [`RestoreSummary`] and the pass moves on to the next key;
//! only an interrupt stops it early.

use crate::cancel::CancelToken;
use crate::diff::{AttributeDiffer, DiffOptions};
use crate::error::Result;
use crate::filter::PathFilter;
use crate::fsx::{AttributeOps, PlatformCaps};
use crate::record::AttributeRecord;
use crate::snapshot::Snapshot;
use crate::writer::{AttributeWriter, WriteOptions};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub struct RestoreOptions {
    pub diff: DiffOptions,
    pub write: WriteOptions,
    /// Leave symbolic links alone even where their times could be set.
    pub skip_links: bool,
    pub print_skipped: bool,
    pub print_excluded: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            diff: DiffOptions::default(),
            write: WriteOptions::default(),
            skip_links: false,
            print_skipped: true,
            print_excluded: true,
        }
    }
}

/// A path whose attributes could not be read or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub changed: usize,
    pub unchanged: usize,
    pub skipped_excluded: usize,
    pub skipped_missing: usize,
    pub skipped_links: usize,
    pub errors: Vec<PathFailure>,
}

impl RestoreSummary {
    pub fn nothing_changed(&self) -> bool {
        self.changed == 0 && self.errors.is_empty()
    }

    fn fail(&mut self, path: &Path, err: &io::Error) {
        tracing::warn!(path = %path.display(), "{}", err);
        self.errors.push(PathFailure { path: path.to_path_buf(), message: err.to_string() });
    }
}

pub struct Restorer<'a> {
    ops: &'a dyn AttributeOps,
    caps: PlatformCaps,
    options: RestoreOptions,
    filter: Option<&'a PathFilter>,
    root: PathBuf,
}

impl<'a> Restorer<'a> {
    /// `root` should be absolute so that absolute snapshot keys below it are
    /// recognized for filtering.
    pub fn new(
        ops: &'a dyn AttributeOps,
        caps: PlatformCaps,
        options: RestoreOptions,
        filter: Option<&'a PathFilter>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self { ops, caps, options, filter, root: root.into() }
    }

    pub fn run(&self, snapshot: &Snapshot, cancel: &CancelToken) -> Result<RestoreSummary> {
        let differ = AttributeDiffer::new(self.caps, self.options.diff);
        let writer = AttributeWriter::new(self.ops, self.caps, self.options.write);
        let mut summary = RestoreSummary::default();

        for (key, record) in snapshot.iter() {
            cancel.check()?;
            let path = self.resolve(key);
            self.restore_one(&path, record, &differ, &writer, &mut summary);
        }

        tracing::debug!(
            changed = summary.changed,
            unchanged = summary.unchanged,
            errors = summary.errors.len(),
            "restore pass finished"
        );
        Ok(summary)
    }

    fn restore_one(
        &self,
        path: &Path,
        record: &AttributeRecord,
        differ: &AttributeDiffer,
        writer: &AttributeWriter<'_>,
        summary: &mut RestoreSummary,
    ) {
        let live = self.ops.live(path);

        let is_dir = live.as_ref().map(|l| l.is_dir).unwrap_or(false);
        if self.is_excluded(path, is_dir) {
            if self.options.print_excluded {
                println!("Skipping excluded path \"{}\"", path.display());
            }
            summary.skipped_excluded += 1;
            return;
        }

        let live = match live {
            Ok(live) => live,
            Err(e) if is_missing(&e) => {
                if self.options.print_skipped {
                    println!("Skipping non-existent item \"{}\"", path.display());
                }
                summary.skipped_missing += 1;
                return;
            }
            Err(e) => {
                summary.fail(path, &e);
                return;
            }
        };

        if live.is_symlink && (self.options.skip_links || !self.caps.symlink_times_nofollow) {
            if self.options.print_skipped {
                println!("Skipping symbolic link \"{}\"", path.display());
            }
            summary.skipped_links += 1;
            return;
        }

        let changes = differ.diff(record, &live);
        if !changes.has_changes() {
            summary.unchanged += 1;
            return;
        }

        match writer.apply(path, &changes, live.is_symlink) {
            Ok(outcome) => {
                if outcome.mutated {
                    summary.changed += 1;
                } else {
                    summary.unchanged += 1;
                }
                if let Some(e) = outcome.flags_error {
                    summary.fail(path, &e);
                }
            }
            Err(e) => summary.fail(path, &e),
        }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        let path = Path::new(key);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        let Some(filter) = self.filter else {
            return false;
        };
        match path.strip_prefix(&self.root) {
            Ok(relative) => filter.matches_with_parents(&PathFilter::candidate(relative, is_dir)),
            Err(_) => false,
        }
    }
}

/// A lookup through a component that is no longer a directory counts as missing too.
fn is_missing(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || is_not_a_directory(err)
}

#[cfg(unix)]
fn is_not_a_directory(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOTDIR)
}

#[cfg(not(unix))]
fn is_not_a_directory(_err: &io::Error) -> bool {
    false
}

// The fake paths below are POSIX style.
#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::common::{PosixAttrs, Timestamp, Timestamps, WindowsFlags};
    use crate::error::AttrError;
    use crate::fsx::testing::FakeOps;
    use crate::fsx::LiveAttributes;
    use std::path::PathBuf;

    const ROOT: &str = "/work";

    fn live(mode: u32) -> LiveAttributes {
        LiveAttributes {
            atime_ns: 1000,
            mtime_ns: 1000,
            creation_ns: 1000,
            posix: Some(PosixAttrs { mode, uid: 0, gid: 0 }),
            attribute_bits: None,
            is_dir: false,
            is_symlink: false,
        }
    }

    fn posix_record(mode: u32) -> AttributeRecord {
        AttributeRecord::Posix {
            times: Timestamps {
                atime: Timestamp::Nanos(1000),
                mtime: Timestamp::Nanos(1000),
                ctime: Some(Timestamp::Nanos(1000)),
            },
            posix: PosixAttrs { mode, uid: 0, gid: 0 },
        }
    }

    fn at(name: &str) -> PathBuf {
        Path::new(ROOT).join(name)
    }

    fn quiet() -> RestoreOptions {
        RestoreOptions {
            write: WriteOptions { print_modified: false, ..WriteOptions::default() },
            print_skipped: false,
            print_excluded: false,
            ..RestoreOptions::default()
        }
    }

    fn snapshot(entries: &[(&str, AttributeRecord)]) -> Snapshot {
        let mut snap = Snapshot::new();
        for (key, record) in entries {
            snap.insert(key.to_string(), record.clone());
        }
        snap
    }

    #[test]
    fn single_permission_fix() {
        let ops = FakeOps::with([(at("a.txt"), live(0o100600))]);
        let snap = snapshot(&[("a.txt", posix_record(0o100644))]);
        let summary = Restorer::new(&ops, PlatformCaps::posix(), quiet(), None, ROOT)
            .run(&snap, &CancelToken::new())
            .unwrap();
        assert_eq!(ops.calls(), ["chmod /work/a.txt 644"]);
        assert_eq!(summary.changed, 1);
        assert!(summary.errors.is_empty());
    }

    #[test]
    fn failure_on_one_path_does_not_stop_the_rest() {
        let mut ops = FakeOps::with([
            (at("a"), live(0o100600)),
            (at("b"), live(0o100600)),
            (at("c"), live(0o100600)),
        ]);
        ops.failing.insert(at("b"));
        let snap = snapshot(&[
            ("a", posix_record(0o100644)),
            ("b", posix_record(0o100644)),
            ("c", posix_record(0o100644)),
        ]);
        let summary = Restorer::new(&ops, PlatformCaps::posix(), quiet(), None, ROOT)
            .run(&snap, &CancelToken::new())
            .unwrap();
        assert_eq!(summary.changed, 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].path, at("b"));
        assert_eq!(ops.calls(), ["chmod /work/a 644", "chmod /work/c 644"]);
    }

    #[test]
    fn matching_state_issues_no_calls() {
        let ops = FakeOps::with([(at("a"), live(0o100644)), (at("b"), live(0o100755))]);
        let snap = snapshot(&[("a", posix_record(0o100644)), ("b", posix_record(0o100755))]);
        let summary = Restorer::new(&ops, PlatformCaps::posix(), quiet(), None, ROOT)
            .run(&snap, &CancelToken::new())
            .unwrap();
        assert!(summary.nothing_changed());
        assert_eq!(summary.unchanged, 2);
        assert!(ops.calls().is_empty());
    }

    #[test]
    fn missing_excluded_and_linked_entries_are_skipped() {
        let mut link = live(0o120777);
        link.is_symlink = true;
        let ops = FakeOps::with([(at("cache/x"), live(0o100600)), (at("link"), link)]);
        let patterns = vec!["cache/".to_string()];
        let filter = PathFilter::compile(Path::new(ROOT), &[], &patterns, false).unwrap().unwrap();
        let options = RestoreOptions { skip_links: true, ..quiet() };
        let snap = snapshot(&[
            ("cache/x", posix_record(0o100644)),
            ("gone", posix_record(0o100644)),
            ("link", posix_record(0o120755)),
        ]);
        let summary = Restorer::new(&ops, PlatformCaps::posix(), options, Some(&filter), ROOT)
            .run(&snap, &CancelToken::new())
            .unwrap();
        assert_eq!((summary.skipped_excluded, summary.skipped_missing, summary.skipped_links), (1, 1, 1));
        assert!(ops.calls().is_empty());
    }

    #[test]
    fn windows_record_on_posix_only_restores_times() {
        let ops = FakeOps::with([(at("w"), live(0o100600))]);
        let record = AttributeRecord::Windows {
            times: Timestamps { atime: Timestamp::Nanos(1000), mtime: Timestamp::Nanos(4000), ctime: None },
            flags: WindowsFlags::default(),
        };
        let snap = snapshot(&[("w", record)]);
        let summary = Restorer::new(&ops, PlatformCaps::posix(), quiet(), None, ROOT)
            .run(&snap, &CancelToken::new())
            .unwrap();
        assert_eq!(ops.calls(), ["utime /work/w 1000 4000"]);
        assert_eq!(summary.changed, 1);
    }

    #[test]
    fn absolute_keys_are_used_verbatim() {
        let ops = FakeOps::with([(PathBuf::from("/elsewhere/f"), live(0o100600))]);
        let snap = snapshot(&[("/elsewhere/f", posix_record(0o100644))]);
        Restorer::new(&ops, PlatformCaps::posix(), quiet(), None, ROOT)
            .run(&snap, &CancelToken::new())
            .unwrap();
        assert_eq!(ops.calls(), ["chmod /elsewhere/f 644"]);
    }

    #[test]
    fn interrupt_stops_the_pass() {
        let ops = FakeOps::with([(at("a"), live(0o100600))]);
        let snap = snapshot(&[("a", posix_record(0o100644))]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = Restorer::new(&ops, PlatformCaps::posix(), quiet(), None, ROOT).run(&snap, &cancel);
        assert!(matches!(result, Err(AttrError::Interrupted)));
        assert!(ops.calls().is_empty());
    }

    #[test]
    fn entry_below_a_file_is_skipped_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plain"), b"was a directory").unwrap();
        let snap = snapshot(&[("plain/inner", posix_record(0o100644))]);
        let ops = crate::fsx::HostOps::default();

        let summary = Restorer::new(&ops, PlatformCaps::posix(), quiet(), None, dir.path())
            .run(&snap, &CancelToken::new())
            .unwrap();
        assert_eq!(summary.skipped_missing, 1);
        assert!(summary.errors.is_empty(), "{:?}", summary.errors);
    }
}
