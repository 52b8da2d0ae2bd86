//! Compares a stored record with the live state of its path.

use crate::common::{nanos_to_secs, FlagState, Timestamp, WindowsFlags};
use crate::fsx::{LiveAttributes, PlatformCaps};
use crate::record::AttributeRecord;

/// Float seconds cannot hold present-day epoch values more precisely than this.
const FLOAT_EPSILON_SECS: f64 = 1e-6;

/// Fields the user asked to leave alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    pub skip_owner: bool,
    pub skip_permissions: bool,
    pub skip_creation: bool,
    pub skip_modified: bool,
    pub skip_accessed: bool,
    pub skip_archive: bool,
    pub skip_hidden: bool,
    pub skip_readonly: bool,
    pub skip_system: bool,
}

/// Outcome of comparing one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldChange<T> {
    pub changed: bool,
    /// The stored value. When `changed` is false it equals the live value.
    pub desired: T,
}

impl<T> FieldChange<T> {
    fn new(changed: bool, desired: T) -> Self {
        FieldChange { changed, desired }
    }
}

fn is_changed<T>(field: &Option<FieldChange<T>>) -> bool {
    field.as_ref().is_some_and(|f| f.changed)
}

/// The four Windows flags. A flag skipped by the user is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlagChanges {
    pub archive: Option<FieldChange<bool>>,
    pub hidden: Option<FieldChange<bool>>,
    pub readonly: Option<FieldChange<bool>>,
    pub system: Option<FieldChange<bool>>,
}

impl FlagChanges {
    pub fn has_changes(&self) -> bool {
        is_changed(&self.archive) || is_changed(&self.hidden) || is_changed(&self.readonly) || is_changed(&self.system)
    }

    /// Upper-case names of the changed flags, joined with ` & `.
    pub fn changed_names(&self) -> String {
        [
            ("ARCHIVE", &self.archive),
            ("HIDDEN", &self.hidden),
            ("READONLY", &self.readonly),
            ("SYSTEM", &self.system),
        ]
        .iter()
        .filter(|(_, f)| is_changed(f))
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(" & ")
    }
}

/// Per-path comparison result. A field is `None` when it was not compared.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChangeSet {
    pub uid: Option<FieldChange<u32>>,
    pub gid: Option<FieldChange<u32>>,
    /// Full stored `st_mode`; only the permission bits are compared.
    pub mode: Option<FieldChange<u32>>,
    pub flags: Option<FlagChanges>,
    pub atime: Option<FieldChange<Timestamp>>,
    pub mtime: Option<FieldChange<Timestamp>>,
    pub creation: Option<FieldChange<Timestamp>>,
    /// The stored creation time when it is positive, compared or not.
    pub stored_creation: Option<Timestamp>,
}

impl ChangeSet {
    pub fn owner_changed(&self) -> bool {
        is_changed(&self.uid) || is_changed(&self.gid)
    }

    pub fn times_changed(&self) -> bool {
        is_changed(&self.atime) || is_changed(&self.mtime)
    }

    pub fn has_changes(&self) -> bool {
        self.owner_changed()
            || is_changed(&self.mode)
            || self.flags.is_some_and(|f| f.has_changes())
            || self.times_changed()
            || is_changed(&self.creation)
    }
}

/// Decides, field by field, what differs between a record and the disk.
#[derive(Debug, Clone, Copy)]
pub struct AttributeDiffer {
    caps: PlatformCaps,
    options: DiffOptions,
}

impl AttributeDiffer {
    pub fn new(caps: PlatformCaps, options: DiffOptions) -> Self {
        Self { caps, options }
    }

    pub fn diff(&self, stored: &AttributeRecord, live: &LiveAttributes) -> ChangeSet {
        let opts = &self.options;
        let times = stored.times();
        let mut set = ChangeSet::default();

        if !opts.skip_accessed {
            set.atime = Some(self.compare_time(times.atime, live.atime_ns));
        }
        if !opts.skip_modified {
            set.mtime = Some(self.compare_time(times.mtime, live.mtime_ns));
        }

        set.stored_creation = times.ctime.filter(Timestamp::is_positive);
        if let Some(ctime) = set.stored_creation {
            if !opts.skip_creation && self.caps.supports_creation_time_write {
                set.creation = Some(self.compare_time(ctime, live.creation_ns));
            }
        }

        if let (Some(posix), Some(current)) = (stored.posix(), live.posix.as_ref()) {
            if self.caps.supports_owner && !opts.skip_owner {
                set.uid = Some(FieldChange::new(posix.uid != current.uid, posix.uid));
                set.gid = Some(FieldChange::new(posix.gid != current.gid, posix.gid));
            }
            if self.caps.supports_posix_mode && !opts.skip_permissions {
                let changed = posix.mode & 0o7777 != current.mode & 0o7777;
                set.mode = Some(FieldChange::new(changed, posix.mode));
            }
        }

        if let (Some(flags), Some(bits)) = (stored.flags(), live.attribute_bits) {
            if self.caps.supports_attribute_flags && flags.is_complete() {
                set.flags = Some(self.compare_flags(flags, &WindowsFlags::from_bits(bits)));
            } else if !flags.is_complete() {
                tracing::debug!("attribute flags incomplete in snapshot, leaving them untouched");
            }
        }

        set
    }

    fn compare_flags(&self, stored: &WindowsFlags, live: &WindowsFlags) -> FlagChanges {
        let opts = &self.options;
        let field = |skip: bool, want: FlagState, have: FlagState| -> Option<FieldChange<bool>> {
            if skip {
                return None;
            }
            let desired = want.as_bool()?;
            Some(FieldChange::new(want != have, desired))
        };
        FlagChanges {
            archive: field(opts.skip_archive, stored.archive, live.archive),
            hidden: field(opts.skip_hidden, stored.hidden, live.hidden),
            readonly: field(opts.skip_readonly, stored.readonly, live.readonly),
            system: field(opts.skip_system, stored.system, live.system),
        }
    }

    /// Compares in the unit the value was stored in.
    fn compare_time(&self, stored: Timestamp, live_ns: i64) -> FieldChange<Timestamp> {
        let tolerance = self.caps.timestamp_tolerance_ns;
        let equal = match stored {
            Timestamp::Nanos(n) => n.abs_diff(live_ns) <= tolerance,
            Timestamp::Seconds(s) => {
                let epsilon = (tolerance as f64 / 1e9).max(FLOAT_EPSILON_SECS);
                (s - nanos_to_secs(live_ns)).abs() <= epsilon
            }
        };
        FieldChange::new(!equal, stored)
    }
}
