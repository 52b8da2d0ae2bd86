//! Snapshot records and their on-disk shape.
//!
//! A record is one of three shapes and the JSON carries no tag saying which:
//! the shape is inferred from the keys that are present.
//!
//! ```json
//! { "atime": 1, "mtime": 2, "ctime": 3, "mode": 33188, "uid": 0, "gid": 0 }
//! { "atime": 1, "mtime": 2, "ctime": 3, "archive": true, "hidden": false, "readonly": false, "system": false }
//! ```
//!
//! Legacy snapshots carry both sets of keys at once.

use crate::common::{PosixAttrs, Timestamp, Timestamps, WindowsFlags};
use serde::{Deserialize, Serialize};

/// One snapshot entry for one filesystem path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord", into = "RawRecord")]
pub enum AttributeRecord {
    /// Captured on a POSIX host.
    Posix { times: Timestamps, posix: PosixAttrs },
    /// Captured on Windows. Individual flags may be unknown.
    Windows { times: Timestamps, flags: WindowsFlags },
    /// Older format carrying POSIX and Windows fields side by side.
    Legacy { times: Timestamps, posix: PosixAttrs, flags: WindowsFlags },
}

impl AttributeRecord {
    pub fn times(&self) -> &Timestamps {
        match self {
            AttributeRecord::Posix { times, .. }
            | AttributeRecord::Windows { times, .. }
            | AttributeRecord::Legacy { times, .. } => times,
        }
    }

    pub fn posix(&self) -> Option<&PosixAttrs> {
        match self {
            AttributeRecord::Posix { posix, .. } | AttributeRecord::Legacy { posix, .. } => Some(posix),
            AttributeRecord::Windows { .. } => None,
        }
    }

    pub fn flags(&self) -> Option<&WindowsFlags> {
        match self {
            AttributeRecord::Windows { flags, .. } | AttributeRecord::Legacy { flags, .. } => Some(flags),
            AttributeRecord::Posix { .. } => None,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            AttributeRecord::Posix { .. } => "posix",
            AttributeRecord::Windows { .. } => "windows",
            AttributeRecord::Legacy { .. } => "legacy",
        }
    }

    /// Validates a raw JSON value taken from a snapshot document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, String> {
        if !value.is_object() {
            return Err(format!("expected an attribute object, found {}", json_kind(&value)));
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Flat wire form with every key optional. Unknown keys are ignored.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    atime: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mtime: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ctime: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    readonly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system: Option<bool>,
}

impl TryFrom<RawRecord> for AttributeRecord {
    type Error = String;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let times = Timestamps {
            atime: raw.atime.ok_or("missing \"atime\"")?,
            mtime: raw.mtime.ok_or("missing \"mtime\"")?,
            ctime: raw.ctime,
        };

        let has_flags =
            raw.archive.is_some() || raw.hidden.is_some() || raw.readonly.is_some() || raw.system.is_some();
        let flags = WindowsFlags {
            archive: raw.archive.into(),
            hidden: raw.hidden.into(),
            readonly: raw.readonly.into(),
            system: raw.system.into(),
        };

        let posix = match (raw.mode, raw.uid, raw.gid) {
            (None, None, None) => None,
            (Some(mode), Some(uid), Some(gid)) => Some(PosixAttrs { mode, uid, gid }),
            _ => return Err("\"mode\", \"uid\" and \"gid\" must appear together".to_string()),
        };

        Ok(match posix {
            Some(posix) if has_flags => AttributeRecord::Legacy { times, posix, flags },
            Some(posix) => AttributeRecord::Posix { times, posix },
            None => AttributeRecord::Windows { times, flags },
        })
    }
}

impl From<AttributeRecord> for RawRecord {
    fn from(record: AttributeRecord) -> Self {
        let times = *record.times();
        let mut raw = RawRecord {
            atime: Some(times.atime),
            mtime: Some(times.mtime),
            ctime: times.ctime,
            ..RawRecord::default()
        };
        if let Some(posix) = record.posix() {
            raw.mode = Some(posix.mode);
            raw.uid = Some(posix.uid);
            raw.gid = Some(posix.gid);
        }
        if let Some(flags) = record.flags() {
            raw.archive = flags.archive.as_bool();
            raw.hidden = flags.hidden.as_bool();
            raw.readonly = flags.readonly.as_bool();
            raw.system = flags.system.as_bool();
        }
        raw
    }
}
