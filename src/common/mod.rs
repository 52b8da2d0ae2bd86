//! Common value types shared by the reader, differ and writer.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Windows `FILE_ATTRIBUTE_READONLY`.
pub const FILE_ATTRIBUTE_READONLY: u32 = 0x0000_0001;
/// Windows `FILE_ATTRIBUTE_HIDDEN`.
pub const FILE_ATTRIBUTE_HIDDEN: u32 = 0x0000_0002;
/// Windows `FILE_ATTRIBUTE_SYSTEM`.
pub const FILE_ATTRIBUTE_SYSTEM: u32 = 0x0000_0004;
/// Windows `FILE_ATTRIBUTE_ARCHIVE`.
pub const FILE_ATTRIBUTE_ARCHIVE: u32 = 0x0000_0020;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A stored timestamp. The variant records the unit the value was captured in
/// and is preserved verbatim through load and save: JSON integers are
/// nanoseconds since the Unix epoch, JSON floats are seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestamp {
    Nanos(i64),
    Seconds(f64),
}

impl Timestamp {
    /// Converts a nanosecond value into the unit of `self`.
    pub fn same_unit(&self, nanos: i64) -> Timestamp {
        match self {
            Timestamp::Nanos(_) => Timestamp::Nanos(nanos),
            Timestamp::Seconds(_) => Timestamp::Seconds(nanos_to_secs(nanos)),
        }
    }

    /// Nanoseconds since the epoch. Float seconds are rounded to the nearest nanosecond.
    pub fn as_nanos(&self) -> i64 {
        match *self {
            Timestamp::Nanos(n) => n,
            Timestamp::Seconds(s) => (s * NANOS_PER_SEC as f64).round() as i64,
        }
    }

    /// Splits the value into whole seconds and a nanosecond remainder in `0..1e9`,
    /// the layout expected by `timespec`.
    pub fn to_parts(&self) -> (i64, u32) {
        match *self {
            Timestamp::Nanos(n) => (n.div_euclid(NANOS_PER_SEC), n.rem_euclid(NANOS_PER_SEC) as u32),
            Timestamp::Seconds(s) => {
                let whole = s.floor();
                let nanos = ((s - whole) * NANOS_PER_SEC as f64).round() as i64;
                if nanos >= NANOS_PER_SEC {
                    (whole as i64 + 1, 0)
                } else {
                    (whole as i64, nanos as u32)
                }
            }
        }
    }

    /// A zero or negative value means "not meaningfully captured".
    pub fn is_positive(&self) -> bool {
        match *self {
            Timestamp::Nanos(n) => n > 0,
            Timestamp::Seconds(s) => s > 0.0,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Timestamp::Seconds(_))
    }

    /// RFC 3339 rendering for log output.
    pub fn display(&self) -> String {
        let (secs, nanos) = self.to_parts();
        chrono::DateTime::from_timestamp(secs, nanos)
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
            .unwrap_or_else(|| format!("{:?}", self))
    }
}

/// Same computation the capture uses for float snapshots, so equal instants
/// produce bit-identical values.
pub fn nanos_to_secs(nanos: i64) -> f64 {
    nanos.div_euclid(NANOS_PER_SEC) as f64 + nanos.rem_euclid(NANOS_PER_SEC) as f64 / NANOS_PER_SEC as f64
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Timestamp::Nanos(n) => serializer.serialize_i64(n),
            Timestamp::Seconds(s) => serializer.serialize_f64(s),
        }
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer nanosecond count or a float second count")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timestamp, E> {
        Ok(Timestamp::Nanos(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timestamp, E> {
        i64::try_from(v)
            .map(Timestamp::Nanos)
            .map_err(|_| E::custom(format!("timestamp {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timestamp, E> {
        if v.is_finite() {
            Ok(Timestamp::Seconds(v))
        } else {
            Err(E::custom("timestamp is not a finite number"))
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Tri-state Windows attribute flag. `Unknown` is distinct from both `Set`
/// and `Clear`: it is never compared and never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagState {
    Set,
    Clear,
    #[default]
    Unknown,
}

impl FlagState {
    pub fn from_bits(bits: u32, mask: u32) -> Self {
        if bits & mask != 0 {
            FlagState::Set
        } else {
            FlagState::Clear
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagState::Set => Some(true),
            FlagState::Clear => Some(false),
            FlagState::Unknown => None,
        }
    }
}

impl From<Option<bool>> for FlagState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => FlagState::Set,
            Some(false) => FlagState::Clear,
            None => FlagState::Unknown,
        }
    }
}

/// The three timestamps every record carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamps {
    pub atime: Timestamp,
    pub mtime: Timestamp,
    /// Creation (birth) time. `None` when the snapshot did not record one.
    pub ctime: Option<Timestamp>,
}

/// POSIX permission and ownership data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixAttrs {
    /// Full `st_mode`, file type bits included.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

/// The four Windows attribute flags this tool models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowsFlags {
    pub archive: FlagState,
    pub hidden: FlagState,
    pub readonly: FlagState,
    pub system: FlagState,
}

impl WindowsFlags {
    pub fn from_bits(bits: u32) -> Self {
        WindowsFlags {
            archive: FlagState::from_bits(bits, FILE_ATTRIBUTE_ARCHIVE),
            hidden: FlagState::from_bits(bits, FILE_ATTRIBUTE_HIDDEN),
            readonly: FlagState::from_bits(bits, FILE_ATTRIBUTE_READONLY),
            system: FlagState::from_bits(bits, FILE_ATTRIBUTE_SYSTEM),
        }
    }

    /// True only when all four flags were captured.
    pub fn is_complete(&self) -> bool {
        [self.archive, self.hidden, self.readonly, self.system]
            .iter()
            .all(|f| *f != FlagState::Unknown)
    }
}
