//! Applies a [`ChangeSet`] to one path.

use crate::common::{Timestamp, FILE_ATTRIBUTE_ARCHIVE, FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_READONLY, FILE_ATTRIBUTE_SYSTEM};
use crate::diff::{ChangeSet, FieldChange, FlagChanges};
use crate::fsx::{AttributeOps, PlatformCaps};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// After restoring, overwrite the accessed time with the stored creation time.
    pub copy_creation_to_accessed: bool,
    /// Print an `Updating ...` line for every mutation.
    pub print_modified: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { copy_creation_to_accessed: false, print_modified: true }
    }
}

/// What [`AttributeWriter::apply`] did.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// At least one mutation call succeeded.
    pub mutated: bool,
    /// Setting the attribute flags failed; the rest of the path was still processed.
    pub flags_error: Option<io::Error>,
}

pub struct AttributeWriter<'a> {
    ops: &'a dyn AttributeOps,
    caps: PlatformCaps,
    options: WriteOptions,
}

impl<'a> AttributeWriter<'a> {
    pub fn new(ops: &'a dyn AttributeOps, caps: PlatformCaps, options: WriteOptions) -> Self {
        Self { ops, caps, options }
    }

    /// Writes every changed field, in the order owner, permissions, flags,
    /// timestamps, creation time, then the optional creation-to-accessed copy.
    ///
    /// Returns on the first failing owner, permission or timestamp call.
    pub fn apply(&self, path: &Path, changes: &ChangeSet, is_symlink: bool) -> io::Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();

        if changes.owner_changed() {
            if let (Some(uid), Some(gid)) = (changes.uid, changes.gid) {
                self.announce(format_args!("Updating UID & GID for \"{}\"", path.display()));
                self.ops.set_owner(path, uid.desired, gid.desired)?;
                outcome.mutated = true;
            }
        }

        if let Some(FieldChange { changed: true, desired }) = changes.mode {
            if is_symlink && !self.caps.symlink_mode_nofollow {
                tracing::debug!(path = %path.display(), "link permissions cannot be set without following it");
            } else {
                self.announce(format_args!("Updating permissions for \"{}\"", path.display()));
                self.ops.set_mode(path, desired & 0o7777)?;
                outcome.mutated = true;
            }
        }

        if let Some(flags) = changes.flags.filter(FlagChanges::has_changes) {
            if is_symlink && !self.caps.symlink_flags_nofollow {
                tracing::debug!(path = %path.display(), "link attribute flags cannot be set without following it");
            } else {
                self.announce(format_args!("Updating {} attribute(s) for \"{}\"", flags.changed_names(), path.display()));
                let (set, clear) = flag_masks(&flags);
                match self.ops.update_attribute_bits(path, set, clear) {
                    Ok(()) => outcome.mutated = true,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "could not set attribute flags: {}", e);
                        outcome.flags_error = Some(e);
                    }
                }
            }
        }

        let creation_changed = changes.creation.is_some_and(|c| c.changed);
        if changes.times_changed() || creation_changed {
            self.announce(format_args!("Updating {} timestamp(s) for \"{}\"", time_names(changes), path.display()));
        }

        if changes.times_changed() {
            let (atime, mtime) = self.target_times(path, changes)?;
            tracing::debug!(path = %path.display(), atime = %atime.display(), mtime = %mtime.display(), "setting times");
            self.ops.set_times(path, atime, mtime)?;
            outcome.mutated = true;
        }

        if let Some(FieldChange { changed: true, desired }) = changes.creation {
            if self.caps.supports_creation_time_write {
                match self.ops.set_creation_time(path, desired) {
                    Ok(()) => outcome.mutated = true,
                    Err(e) => tracing::warn!(path = %path.display(), "An error occurred while restoring the creation time: {}", e),
                }
            }
        }

        if self.options.copy_creation_to_accessed {
            if let Some(creation) = changes.stored_creation {
                let live = self.ops.live(path)?;
                if creation.as_nanos().abs_diff(live.atime_ns) > self.caps.timestamp_tolerance_ns {
                    tracing::debug!(path = %path.display(), creation = %creation.display(), "copying creation time to accessed time");
                    self.ops.set_times(path, creation, Timestamp::Nanos(live.mtime_ns))?;
                    outcome.mutated = true;
                }
            }
        }

        Ok(outcome)
    }

    /// Desired values for the changed sides, live values for the rest.
    fn target_times(&self, path: &Path, changes: &ChangeSet) -> io::Result<(Timestamp, Timestamp)> {
        let wanted = |field: Option<FieldChange<Timestamp>>| field.filter(|f| f.changed).map(|f| f.desired);
        match (wanted(changes.atime), wanted(changes.mtime)) {
            (Some(atime), Some(mtime)) => Ok((atime, mtime)),
            (atime, mtime) => {
                let live = self.ops.live(path)?;
                Ok((
                    atime.unwrap_or(Timestamp::Nanos(live.atime_ns)),
                    mtime.unwrap_or(Timestamp::Nanos(live.mtime_ns)),
                ))
            }
        }
    }

    fn announce(&self, message: std::fmt::Arguments<'_>) {
        if self.options.print_modified {
            println!("{message}");
        }
    }
}

/// Folds the changed flags into one mask to set and one to clear.
fn flag_masks(flags: &FlagChanges) -> (u32, u32) {
    let mut set = 0;
    let mut clear = 0;
    for (field, bit) in [
        (flags.archive, FILE_ATTRIBUTE_ARCHIVE),
        (flags.hidden, FILE_ATTRIBUTE_HIDDEN),
        (flags.readonly, FILE_ATTRIBUTE_READONLY),
        (flags.system, FILE_ATTRIBUTE_SYSTEM),
    ] {
        match field {
            Some(FieldChange { changed: true, desired: true }) => set |= bit,
            Some(FieldChange { changed: true, desired: false }) => clear |= bit,
            _ => {}
        }
    }
    (set, clear)
}

fn time_names(changes: &ChangeSet) -> String {
    let mut names = Vec::new();
    if changes.mtime.is_some_and(|f| f.changed) {
        names.push("modification");
    }
    if changes.atime.is_some_and(|f| f.changed) {
        names.push("accessed");
    }
    if changes.creation.is_some_and(|f| f.changed) {
        names.push("creation");
    }
    names.join(" & ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PosixAttrs;
    use crate::fsx::testing::FakeOps;
    use crate::fsx::LiveAttributes;
    use std::path::PathBuf;

    fn file() -> PathBuf {
        PathBuf::from("/data/f")
    }

    fn live() -> LiveAttributes {
        LiveAttributes {
            atime_ns: 10,
            mtime_ns: 20,
            creation_ns: 5,
            posix: Some(PosixAttrs { mode: 0o100600, uid: 1, gid: 1 }),
            attribute_bits: Some(0),
            is_dir: false,
            is_symlink: false,
        }
    }

    fn quiet() -> WriteOptions {
        WriteOptions { print_modified: false, ..WriteOptions::default() }
    }

    fn changed<T>(desired: T) -> Option<FieldChange<T>> {
        Some(FieldChange { changed: true, desired })
    }

    fn same<T>(desired: T) -> Option<FieldChange<T>> {
        Some(FieldChange { changed: false, desired })
    }

    #[test]
    fn calls_follow_fixed_order() {
        let ops = FakeOps::with([(file(), live())]);
        let changes = ChangeSet {
            uid: changed(0),
            gid: same(1),
            mode: changed(0o100644),
            atime: changed(Timestamp::Nanos(100)),
            mtime: changed(Timestamp::Nanos(200)),
            ..ChangeSet::default()
        };
        let outcome = AttributeWriter::new(&ops, PlatformCaps::posix(), quiet()).apply(&file(), &changes, false).unwrap();
        assert!(outcome.mutated);
        assert_eq!(ops.calls(), ["chown /data/f 0:1", "chmod /data/f 644", "utime /data/f 100 200"]);
    }

    #[test]
    fn unchanged_time_side_comes_from_disk() {
        let ops = FakeOps::with([(file(), live())]);
        let changes = ChangeSet {
            atime: same(Timestamp::Nanos(11)),
            mtime: changed(Timestamp::Nanos(99)),
            ..ChangeSet::default()
        };
        AttributeWriter::new(&ops, PlatformCaps::posix(), quiet()).apply(&file(), &changes, false).unwrap();
        assert_eq!(ops.calls(), ["utime /data/f 10 99"]);
    }

    #[test]
    fn flags_fold_into_one_call() {
        let ops = FakeOps::with([(file(), live())]);
        let flags = FlagChanges { archive: changed(true), hidden: changed(false), readonly: same(false), system: None };
        let changes = ChangeSet { flags: Some(flags), ..ChangeSet::default() };
        AttributeWriter::new(&ops, PlatformCaps::windows(), quiet()).apply(&file(), &changes, false).unwrap();
        assert_eq!(ops.calls(), ["attrib /data/f +0x20 -0x2"]);
    }

    #[test]
    fn flag_failure_does_not_stop_the_path() {
        let ops = FakeOps { failing_flags: true, ..FakeOps::with([(file(), live())]) };
        let changes = ChangeSet {
            flags: Some(FlagChanges { hidden: changed(true), ..FlagChanges::default() }),
            mtime: changed(Timestamp::Nanos(77)),
            atime: same(Timestamp::Nanos(10)),
            ..ChangeSet::default()
        };
        let outcome = AttributeWriter::new(&ops, PlatformCaps::windows(), quiet()).apply(&file(), &changes, false).unwrap();
        assert!(outcome.flags_error.is_some());
        assert!(outcome.mutated);
        assert_eq!(ops.calls(), ["utime /data/f 10 77"]);
    }

    #[test]
    fn creation_copied_to_accessed() {
        let ops = FakeOps::with([(file(), live())]);
        let options = WriteOptions { copy_creation_to_accessed: true, print_modified: false };
        let changes = ChangeSet { stored_creation: Some(Timestamp::Nanos(5)), ..ChangeSet::default() };
        let outcome = AttributeWriter::new(&ops, PlatformCaps::posix(), options).apply(&file(), &changes, false).unwrap();
        assert!(outcome.mutated);
        assert_eq!(ops.calls(), ["utime /data/f 5 20"]);

        // Already equal: nothing more to do.
        let again = AttributeWriter::new(&ops, PlatformCaps::posix(), options).apply(&file(), &changes, false).unwrap();
        assert!(!again.mutated);
    }

    #[test]
    fn symlink_mode_is_left_alone_without_lchmod() {
        let ops = FakeOps::with([(file(), live())]);
        let caps = PlatformCaps { symlink_mode_nofollow: false, ..PlatformCaps::posix() };
        let changes = ChangeSet { mode: changed(0o120777), ..ChangeSet::default() };
        let outcome = AttributeWriter::new(&ops, caps, quiet()).apply(&file(), &changes, true).unwrap();
        assert!(!outcome.mutated);
        assert!(ops.calls().is_empty());
    }

    #[test]
    fn owner_failure_is_returned() {
        let mut ops = FakeOps::with([(file(), live())]);
        ops.failing.insert(file());
        let changes = ChangeSet { uid: changed(0), gid: changed(0), ..ChangeSet::default() };
        let err = AttributeWriter::new(&ops, PlatformCaps::posix(), quiet()).apply(&file(), &changes, false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
