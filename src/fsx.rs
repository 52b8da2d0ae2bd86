//! Cross-platform filesystem wrapper.
//!
//! Everything that branches on the host OS lives here: the capability table
//! the rest of the crate consults ([`PlatformCaps`]), reading the live
//! attributes of a path without following links, and the mutation calls
//! behind the [`AttributeOps`] trait. On Unix the mutations go through
//! `lchown`/`fchmodat`/`utimensat`; on Windows through a handle opened with
//! `FILE_FLAG_OPEN_REPARSE_POINT` and `Get/SetFileAttributesW`.

use crate::common::{PosixAttrs, Timestamp};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// What the host platform can observe and change.
///
/// Components receive this by value instead of checking `cfg!` themselves, so
/// the Windows comparison rules can be exercised on any host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCaps {
    /// uid/gid are modeled and can be changed.
    pub supports_owner: bool,
    /// `st_mode` is meaningful and can be changed.
    pub supports_posix_mode: bool,
    /// archive/hidden/readonly/system flags exist.
    pub supports_attribute_flags: bool,
    /// The creation timestamp can be written.
    pub supports_creation_time_write: bool,
    /// Two timestamps closer than this are considered equal.
    pub timestamp_tolerance_ns: u64,
    /// Timestamps of a symbolic link can be set without touching its target.
    pub symlink_times_nofollow: bool,
    /// Permission bits of a symbolic link can be set without touching its target.
    pub symlink_mode_nofollow: bool,
    /// Attribute flags of a symbolic link can be set without touching its target.
    pub symlink_flags_nofollow: bool,
}

impl PlatformCaps {
    pub const fn posix() -> Self {
        PlatformCaps {
            supports_owner: true,
            supports_posix_mode: true,
            supports_attribute_flags: false,
            supports_creation_time_write: false,
            timestamp_tolerance_ns: 0,
            symlink_times_nofollow: true,
            // Linux has no lchmod; the BSDs and macOS do.
            symlink_mode_nofollow: !cfg!(any(target_os = "linux", target_os = "android")),
            symlink_flags_nofollow: false,
        }
    }

    pub const fn windows() -> Self {
        PlatformCaps {
            supports_owner: false,
            supports_posix_mode: false,
            supports_attribute_flags: true,
            supports_creation_time_write: true,
            // FILETIME round trips lose up to a few hundred nanoseconds.
            timestamp_tolerance_ns: 300,
            symlink_times_nofollow: true,
            symlink_mode_nofollow: false,
            symlink_flags_nofollow: false,
        }
    }

    /// Capabilities of the platform this binary was built for.
    pub const fn host() -> Self {
        if cfg!(windows) {
            Self::windows()
        } else {
            Self::posix()
        }
    }
}

/// Where the creation timestamp comes from when the filesystem has no birth time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreationFallback {
    /// Use the inode change time instead.
    #[default]
    ChangeTime,
    /// Record 0, which disables creation-time comparison for the entry.
    None,
}

/// Attributes of a path as they are on disk right now. Timestamps are
/// nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveAttributes {
    pub atime_ns: i64,
    pub mtime_ns: i64,
    /// 0 when no creation time could be determined.
    pub creation_ns: i64,
    pub posix: Option<PosixAttrs>,
    pub attribute_bits: Option<u32>,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// The OS calls the restore engine needs. [`HostOps`] talks to the real
/// filesystem; tests plug in recording fakes.
pub trait AttributeOps {
    /// Reads the path's own attributes without following links.
    fn live(&self, path: &Path) -> io::Result<LiveAttributes>;

    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;

    /// Sets permission bits (`mode & 0o7777`).
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Sets accessed and modified times together.
    fn set_times(&self, path: &Path, atime: Timestamp, mtime: Timestamp) -> io::Result<()>;

    fn set_creation_time(&self, path: &Path, ctime: Timestamp) -> io::Result<()>;

    /// Sets the bits in `set`, clears the bits in `clear`, leaves the rest.
    fn update_attribute_bits(&self, path: &Path, set: u32, clear: u32) -> io::Result<()>;
}

/// [`AttributeOps`] backed by the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostOps {
    pub creation_fallback: CreationFallback,
}

impl HostOps {
    pub fn new(creation_fallback: CreationFallback) -> Self {
        HostOps { creation_fallback }
    }
}

impl AttributeOps for HostOps {
    fn live(&self, path: &Path) -> io::Result<LiveAttributes> {
        read_live(path, self.creation_fallback)
    }

    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        imp::set_owner(path, uid, gid)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        imp::set_mode(path, mode)
    }

    fn set_times(&self, path: &Path, atime: Timestamp, mtime: Timestamp) -> io::Result<()> {
        imp::set_times(path, atime, mtime)
    }

    fn set_creation_time(&self, path: &Path, ctime: Timestamp) -> io::Result<()> {
        imp::set_creation_time(path, ctime)
    }

    fn update_attribute_bits(&self, path: &Path, set: u32, clear: u32) -> io::Result<()> {
        imp::update_attribute_bits(path, set, clear)
    }
}

/// One `symlink_metadata` call, never following links.
pub fn read_live(path: &Path, fallback: CreationFallback) -> io::Result<LiveAttributes> {
    let md = std::fs::symlink_metadata(path)?;
    Ok(imp::live_from_metadata(path, &md, fallback))
}

static FALLBACK_ANNOUNCED: AtomicBool = AtomicBool::new(false);

#[cfg_attr(windows, allow(dead_code))]
fn note_creation_fallback(path: &Path) {
    if !FALLBACK_ANNOUNCED.swap(true, Ordering::Relaxed) {
        tracing::warn!("Birth time is not available on this filesystem, using the inode change time as creation time");
    }
    tracing::debug!(path = %path.display(), "creation time taken from change time");
}

#[cfg_attr(windows, allow(dead_code))]
fn system_time_to_nanos(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_nanos()).map(|n| -n).unwrap_or(i64::MIN),
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::MetadataExt;

    const NANOS: i64 = 1_000_000_000;

    // glibc rejects AT_SYMLINK_NOFOLLOW for fchmodat; links are never chmod-ed there.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    const CHMOD_FLAGS: libc::c_int = 0;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const CHMOD_FLAGS: libc::c_int = libc::AT_SYMLINK_NOFOLLOW;

    fn to_ns(secs: i64, nsec: i64) -> i64 {
        secs.saturating_mul(NANOS).saturating_add(nsec)
    }

    pub(super) fn live_from_metadata(
        path: &Path,
        md: &std::fs::Metadata,
        fallback: CreationFallback,
    ) -> LiveAttributes {
        let creation_ns = match md.created() {
            Ok(t) => system_time_to_nanos(t),
            Err(_) => match fallback {
                CreationFallback::ChangeTime => {
                    note_creation_fallback(path);
                    to_ns(md.ctime(), md.ctime_nsec())
                }
                CreationFallback::None => 0,
            },
        };
        LiveAttributes {
            atime_ns: to_ns(md.atime(), md.atime_nsec()),
            mtime_ns: to_ns(md.mtime(), md.mtime_nsec()),
            creation_ns,
            posix: Some(PosixAttrs { mode: md.mode(), uid: md.uid(), gid: md.gid() }),
            attribute_bits: None,
            is_dir: md.is_dir(),
            is_symlink: md.file_type().is_symlink(),
        }
    }

    fn c_path(path: &Path) -> io::Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
    }

    pub(super) fn set_owner(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::lchown(path, Some(uid), Some(gid))
    }

    /// Set POSIX permission bits on Unix.
    pub(super) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
        let c = c_path(path)?;
        // SAFETY: `c` is a valid NUL-terminated string for the duration of the call.
        let rc = unsafe { libc::fchmodat(libc::AT_FDCWD, c.as_ptr(), (mode & 0o7777) as libc::mode_t, CHMOD_FLAGS) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn timespec(ts: Timestamp) -> libc::timespec {
        let (secs, nanos) = ts.to_parts();
        libc::timespec { tv_sec: secs as libc::time_t, tv_nsec: nanos as _ }
    }

    pub(super) fn set_times(path: &Path, atime: Timestamp, mtime: Timestamp) -> io::Result<()> {
        let c = c_path(path)?;
        let times = [timespec(atime), timespec(mtime)];
        // SAFETY: `c` outlives the call and `times` holds exactly two entries.
        let rc = unsafe { libc::utimensat(libc::AT_FDCWD, c.as_ptr(), times.as_ptr(), libc::AT_SYMLINK_NOFOLLOW) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub(super) fn set_creation_time(_path: &Path, _ctime: Timestamp) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "creation time cannot be set on this platform"))
    }

    pub(super) fn update_attribute_bits(_path: &Path, _set: u32, _clear: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "attribute flags do not exist on this platform"))
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use std::fs::{File, FileTimes, OpenOptions};
    use std::os::windows::ffi::OsStrExt;
    use std::os::windows::fs::{FileTimesExt, MetadataExt, OpenOptionsExt};
    use std::time::Duration;
    use windows_sys::Win32::Storage::FileSystem::{
        GetFileAttributesW, SetFileAttributesW, FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT,
        FILE_WRITE_ATTRIBUTES, INVALID_FILE_ATTRIBUTES,
    };

    /// 100ns intervals between 1601-01-01 and 1970-01-01.
    const EPOCH_DIFFERENCE: i64 = 116_444_736_000_000_000;

    fn filetime_to_nanos(ft: u64) -> i64 {
        if ft == 0 {
            return 0;
        }
        (ft as i64 - EPOCH_DIFFERENCE).saturating_mul(100)
    }

    pub(super) fn live_from_metadata(
        _path: &Path,
        md: &std::fs::Metadata,
        _fallback: CreationFallback,
    ) -> LiveAttributes {
        LiveAttributes {
            atime_ns: filetime_to_nanos(md.last_access_time()),
            mtime_ns: filetime_to_nanos(md.last_write_time()),
            creation_ns: filetime_to_nanos(md.creation_time()),
            posix: None,
            attribute_bits: Some(md.file_attributes()),
            is_dir: md.is_dir(),
            is_symlink: md.file_type().is_symlink(),
        }
    }

    fn wide(path: &Path) -> Vec<u16> {
        path.as_os_str().encode_wide().chain(std::iter::once(0)).collect()
    }

    fn to_system_time(ts: Timestamp) -> SystemTime {
        let nanos = ts.as_nanos();
        if nanos >= 0 {
            UNIX_EPOCH + Duration::from_nanos(nanos as u64)
        } else {
            UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
        }
    }

    /// Opens the entry itself (directories and reparse points included) with
    /// just enough access to change its timestamps.
    fn open_for_attributes(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .access_mode(FILE_WRITE_ATTRIBUTES)
            .custom_flags(FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT)
            .open(path)
    }

    pub(super) fn set_owner(_path: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "ownership is not modeled on Windows"))
    }

    pub(super) fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "permission bits are not modeled on Windows"))
    }

    pub(super) fn set_times(path: &Path, atime: Timestamp, mtime: Timestamp) -> io::Result<()> {
        let file = open_for_attributes(path)?;
        let times = FileTimes::new()
            .set_accessed(to_system_time(atime))
            .set_modified(to_system_time(mtime));
        file.set_times(times)
    }

    pub(super) fn set_creation_time(path: &Path, ctime: Timestamp) -> io::Result<()> {
        let file = open_for_attributes(path)?;
        file.set_times(FileTimes::new().set_created(to_system_time(ctime)))
    }

    pub(super) fn update_attribute_bits(path: &Path, set: u32, clear: u32) -> io::Result<()> {
        let w = wide(path);
        // SAFETY: `w` is NUL-terminated and alive for both calls.
        let current = unsafe { GetFileAttributesW(w.as_ptr()) };
        if current == INVALID_FILE_ATTRIBUTES {
            return Err(io::Error::last_os_error());
        }
        let wanted = (current | set) & !clear;
        // SAFETY: as above.
        if unsafe { SetFileAttributesW(w.as_ptr(), wanted) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}


/// Recording [`AttributeOps`] fake shared by the writer and restore tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;

    /// Serves fixed live attributes per path and logs every mutation as text.
    #[derive(Default)]
    pub(crate) struct FakeOps {
        pub live: RefCell<HashMap<PathBuf, LiveAttributes>>,
        pub calls: RefCell<Vec<String>>,
        /// Paths whose mutations fail with `PermissionDenied`.
        pub failing: HashSet<PathBuf>,
        /// Makes `update_attribute_bits` fail everywhere.
        pub failing_flags: bool,
    }

    impl FakeOps {
        pub fn with(entries: impl IntoIterator<Item = (PathBuf, LiveAttributes)>) -> Self {
            FakeOps { live: RefCell::new(entries.into_iter().collect()), ..FakeOps::default() }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, path: &Path, call: String) -> io::Result<()> {
            if self.failing.contains(path) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            self.calls.borrow_mut().push(call);
            Ok(())
        }

        fn update(&self, path: &Path, f: impl FnOnce(&mut LiveAttributes)) {
            if let Some(live) = self.live.borrow_mut().get_mut(path) {
                f(live);
            }
        }
    }

    impl AttributeOps for FakeOps {
        fn live(&self, path: &Path) -> io::Result<LiveAttributes> {
            self.live
                .borrow()
                .get(path)
                .copied()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such entry"))
        }

        fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
            self.record(path, format!("chown {} {uid}:{gid}", path.display()))?;
            self.update(path, |l| {
                if let Some(p) = l.posix.as_mut() {
                    p.uid = uid;
                    p.gid = gid;
                }
            });
            Ok(())
        }

        fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
            self.record(path, format!("chmod {} {:o}", path.display(), mode & 0o7777))?;
            self.update(path, |l| {
                if let Some(p) = l.posix.as_mut() {
                    p.mode = (p.mode & !0o7777) | (mode & 0o7777);
                }
            });
            Ok(())
        }

        fn set_times(&self, path: &Path, atime: Timestamp, mtime: Timestamp) -> io::Result<()> {
            self.record(path, format!("utime {} {} {}", path.display(), atime.as_nanos(), mtime.as_nanos()))?;
            self.update(path, |l| {
                l.atime_ns = atime.as_nanos();
                l.mtime_ns = mtime.as_nanos();
            });
            Ok(())
        }

        fn set_creation_time(&self, path: &Path, ctime: Timestamp) -> io::Result<()> {
            self.record(path, format!("ctime {} {}", path.display(), ctime.as_nanos()))?;
            self.update(path, |l| l.creation_ns = ctime.as_nanos());
            Ok(())
        }

        fn update_attribute_bits(&self, path: &Path, set: u32, clear: u32) -> io::Result<()> {
            if self.failing_flags {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "flags denied"));
            }
            self.record(path, format!("attrib {} +{set:#x} -{clear:#x}", path.display()))?;
            self.update(path, |l| {
                if let Some(bits) = l.attribute_bits.as_mut() {
                    *bits = (*bits | set) & !clear;
                }
            });
            Ok(())
        }
    }
}
