//! Captures snapshot records from live metadata.

use crate::common::{Timestamp, Timestamps, WindowsFlags};
use crate::fsx::{self, CreationFallback, LiveAttributes, PlatformCaps};
use crate::record::AttributeRecord;
use std::io;
use std::path::Path;

/// Unit used for timestamps in new snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// Integer nanoseconds.
    #[default]
    Nanoseconds,
    /// Float seconds, as written by older snapshot versions.
    Seconds,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    pub time_format: TimeFormat,
    pub creation_fallback: CreationFallback,
}

/// Turns the metadata of one path into an [`AttributeRecord`].
#[derive(Debug, Clone, Copy)]
pub struct AttributeReader {
    caps: PlatformCaps,
    options: ReaderOptions,
}

impl AttributeReader {
    pub fn new(caps: PlatformCaps, options: ReaderOptions) -> Self {
        Self { caps, options }
    }

    /// Reads the entry's own metadata (links are not followed).
    pub fn read(&self, path: &Path) -> io::Result<AttributeRecord> {
        let live = fsx::read_live(path, self.options.creation_fallback)?;
        Ok(self.record_from_live(&live))
    }

    /// Shapes a record for the host platform: POSIX records carry
    /// mode/uid/gid, Windows records carry the four flags, never both.
    pub fn record_from_live(&self, live: &LiveAttributes) -> AttributeRecord {
        let stamp = |nanos: i64| match self.options.time_format {
            TimeFormat::Nanoseconds => Timestamp::Nanos(nanos),
            TimeFormat::Seconds => Timestamp::Seconds(crate::common::nanos_to_secs(nanos)),
        };
        let times = Timestamps {
            atime: stamp(live.atime_ns),
            mtime: stamp(live.mtime_ns),
            ctime: Some(stamp(live.creation_ns)),
        };

        match (self.caps.supports_attribute_flags, live.attribute_bits, live.posix) {
            (true, Some(bits), _) => AttributeRecord::Windows { times, flags: WindowsFlags::from_bits(bits) },
            (_, _, Some(posix)) => AttributeRecord::Posix { times, posix },
            _ => AttributeRecord::Windows { times, flags: WindowsFlags::default() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PosixAttrs, FILE_ATTRIBUTE_HIDDEN};

    fn live() -> LiveAttributes {
        LiveAttributes {
            atime_ns: 1_500_000_000,
            mtime_ns: 2_000_000_000,
            creation_ns: 500_000_000,
            posix: Some(PosixAttrs { mode: 0o100644, uid: 1000, gid: 100 }),
            attribute_bits: Some(FILE_ATTRIBUTE_HIDDEN),
            is_dir: false,
            is_symlink: false,
        }
    }

    #[test]
    fn posix_capture_has_no_flags() {
        let reader = AttributeReader::new(PlatformCaps::posix(), ReaderOptions::default());
        let rec = reader.record_from_live(&live());
        assert_eq!(rec.shape(), "posix");
        assert_eq!(rec.times().atime, Timestamp::Nanos(1_500_000_000));
        assert_eq!(rec.times().ctime, Some(Timestamp::Nanos(500_000_000)));
    }

    #[test]
    fn windows_capture_has_no_posix_fields() {
        let reader = AttributeReader::new(PlatformCaps::windows(), ReaderOptions::default());
        let rec = reader.record_from_live(&live());
        assert_eq!(rec.shape(), "windows");
        assert!(rec.posix().is_none());
        assert!(rec.flags().unwrap().is_complete());
    }

    #[test]
    fn seconds_format_stores_floats() {
        let options = ReaderOptions { time_format: TimeFormat::Seconds, ..ReaderOptions::default() };
        let reader = AttributeReader::new(PlatformCaps::posix(), options);
        let rec = reader.record_from_live(&live());
        assert_eq!(rec.times().atime, Timestamp::Seconds(1.5));
        assert_eq!(rec.times().mtime, Timestamp::Seconds(2.0));
    }

    #[test]
    fn reads_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"hello").unwrap();
        let rec = AttributeReader::new(PlatformCaps::host(), ReaderOptions::default()).read(&file).unwrap();
        assert!(rec.times().mtime.is_positive());
        assert_eq!(rec.posix().is_some(), cfg!(unix));
    }
}
