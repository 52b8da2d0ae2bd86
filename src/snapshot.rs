//! The snapshot document: path → [`AttributeRecord`], stored as JSON.

use crate::error::{AttrError, Result};
use crate::record::AttributeRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Ordered mapping from path string to record. Iteration is lexicographic by
/// key, which is the order restore processes entries in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<String, AttributeRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: String, record: AttributeRecord) -> Option<AttributeRecord> {
        self.entries.insert(path, record)
    }

    pub fn get(&self, path: &str) -> Option<&AttributeRecord> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeRecord)> {
        self.entries.iter()
    }

    /// Reads and validates a whole snapshot file.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. A zero-size file, an
    /// empty object, malformed JSON and any record with an unrecognized shape
    /// are all errors; nothing is returned unless every record is usable.
    pub fn load(path: &Path) -> Result<Snapshot> {
        let bytes = std::fs::read(path).map_err(|e| AttrError::SnapshotRead { path: path.to_path_buf(), source: e })?;
        if bytes.is_empty() {
            return Err(AttrError::SnapshotEmpty(path.to_path_buf()));
        }
        let snapshot = Self::parse(&String::from_utf8_lossy(&bytes), path)?;
        tracing::debug!(path = %path.display(), entries = snapshot.len(), "snapshot loaded");
        Ok(snapshot)
    }

    /// Parses snapshot text. `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Snapshot> {
        let raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(text).map_err(|e| AttrError::SnapshotParse { path: origin.to_path_buf(), source: e })?;
        if raw.is_empty() {
            return Err(AttrError::SnapshotEmpty(origin.to_path_buf()));
        }

        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            let record = AttributeRecord::from_value(value)
                .map_err(|reason| AttrError::CorruptRecord { path: key.clone(), reason })?;
            entries.insert(key, record);
        }
        Ok(Snapshot { entries })
    }

    /// Writes the snapshot as indented JSON.
    ///
    /// The document goes to a temporary file next to `path` which is then
    /// renamed over it, so an interrupted write never leaves a truncated file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let write_err = |e: std::io::Error| AttrError::SnapshotWrite { path: path.to_path_buf(), source: e };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, self).map_err(|e| write_err(e.into()))?;
            writer.write_all(b"\n").map_err(write_err)?;
            writer.flush().map_err(write_err)?;
        }
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
