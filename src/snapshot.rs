//! JSON snapshot of the persistent services state.
//!
//! Saves and restores accounts, groups, registered channels, access records,
//! pending expiries and the bans placed for them across restarts. Access
//! records go through the record storage hooks, so entities are written by
//! name.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::acl::RecordError;
use crate::channel::ChannelRecord;
use crate::entity::{Account, Group};
use crate::error::{ChannelError, EntityError};
use crate::expiry::ExpiryKind;

/// Current snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    Version(u32),

    #[error("bad access record: {0}")]
    Record(#[from] RecordError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// A pending expiry, with its target in textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedExpiry {
    pub expires: i64,
    pub channel: String,
    pub target: String,
    pub kind: ExpiryKind,
}

/// Bans placed on behalf of a record or hold, lifted when it goes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedEvidence {
    pub channel: String,
    pub target: String,
    pub kind: ExpiryKind,
    pub bans: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved: i64,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub channels: Vec<ChannelRecord>,
    /// One entry per record, as written by `serialize_record`.
    #[serde(default)]
    pub access: Vec<Vec<(String, String)>>,
    #[serde(default)]
    pub expiries: Vec<SavedExpiry>,
    #[serde(default)]
    pub evidence: Vec<SavedEvidence>,
}

impl Snapshot {
    pub fn new(saved: i64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved,
            accounts: Vec::new(),
            groups: Vec::new(),
            channels: Vec::new(),
            access: Vec::new(),
            expiries: Vec::new(),
            evidence: Vec::new(),
        }
    }
}

/// Snapshot file on disk.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is a fresh start, not an error.
    pub fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot found, starting empty");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        debug!(
            path = %self.path.display(),
            channels = snapshot.channels.len(),
            records = snapshot.access.len(),
            "snapshot read"
        );
        Ok(Some(snapshot))
    }

    /// Write the snapshot next to its final path, then rename it into place.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = std::fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, snapshot)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }
}
