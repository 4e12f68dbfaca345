//! Snapshot persistence of prebuilt artifacts.
//!
//! A snapshot holds everything expensive to derive from the raw tables: the
//! tree, its code dictionary, the reading codes, the range records and the
//! sensor statistics. Loading one skips neighbor discovery and compression
//! entirely. Files are written to a temporary sibling and renamed into place.

use crate::compute::neighbors::SensorDiffStats;
use crate::compute::ranges::RecordTable;
use crate::config::Config;
use crate::error::{DriftError, Result};
use crate::index::{CodeDictionary, PointCodes, TimeQuadTree};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_MAGIC: &[u8] = b"DRIFTMAP_SNAPSHOT";
const SNAPSHOT_VERSION: u8 = 1;

/// Owned artifacts decoded from a snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    pub config: Config,
    pub tree: TimeQuadTree,
    pub dictionary: CodeDictionary,
    pub codes: PointCodes,
    pub records: RecordTable,
    pub stats: SensorDiffStats,
}

/// Borrowed artifacts to encode. Field order must match [`Snapshot`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SnapshotRef<'a> {
    pub config: &'a Config,
    pub tree: &'a TimeQuadTree,
    pub dictionary: &'a CodeDictionary,
    pub codes: &'a PointCodes,
    pub records: &'a RecordTable,
    pub stats: &'a SensorDiffStats,
}

/// Encode artifacts behind the snapshot header.
pub fn encode(snapshot: SnapshotRef<'_>) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(SNAPSHOT_MAGIC.len() + 1);
    buf.put_slice(SNAPSHOT_MAGIC);
    buf.put_u8(SNAPSHOT_VERSION);

    let mut writer = buf.writer();
    bincode::serialize_into(&mut writer, &snapshot)
        .map_err(|e| DriftError::SerializationErrorWithContext(e.to_string()))?;
    Ok(writer.into_inner().freeze())
}

/// Decode a blob produced by [`encode`].
///
/// # Errors
///
/// Returns [`DriftError::InvalidFormat`] for a foreign header, another
/// version or a truncated/corrupted body.
pub fn decode(data: &[u8]) -> Result<Snapshot> {
    let header = SNAPSHOT_MAGIC.len() + 1;
    if data.len() < header || &data[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(DriftError::InvalidFormat);
    }
    if data[SNAPSHOT_MAGIC.len()] != SNAPSHOT_VERSION {
        log::warn!(
            "Unsupported snapshot version {} (expected {})",
            data[SNAPSHOT_MAGIC.len()],
            SNAPSHOT_VERSION
        );
        return Err(DriftError::InvalidFormat);
    }

    bincode::deserialize(&data[header..]).map_err(|e| {
        log::warn!("Failed to decode snapshot body: {e}");
        DriftError::InvalidFormat
    })
}

/// Snapshot stored at a fixed path.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the snapshot, or `None` if the file is missing or empty.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(None);
        }
        decode(&data).map(Some)
    }

    pub fn save(&self, snapshot: SnapshotRef<'_>) -> Result<()> {
        let data = encode(snapshot)?;
        let temp_path = self.temp_path();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&data)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;
        self.sync_parent_dir()?;

        log::info!(
            "Saved snapshot of {} bytes to {}",
            data.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        if let Some(name) = temp.file_name() {
            let mut new_name = name.to_string_lossy().into_owned();
            new_name.push_str(".tmp");
            temp.set_file_name(new_name);
        }
        temp
    }

    fn sync_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
        Ok(())
    }
}
