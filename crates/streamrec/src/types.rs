//! Identity, naming, and snapshot types shared by the registry and its callers.

use crate::error::RecorderError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one capture attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingId(String);

impl RecordingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordingId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// `<channel>_<YYYYMMDD_HHMMSS>.ts`
pub fn recording_filename(channel: &str, at: &DateTime<Local>) -> String {
    format!("{}_{}.ts", channel, at.format("%Y%m%d_%H%M%S"))
}

/// Reject channel names that could not safely become part of a filename
/// or a stream URL.
pub fn validate_channel(channel: &str) -> Result<(), RecorderError> {
    let valid = !channel.is_empty()
        && channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(RecorderError::InvalidChannel(channel.to_string()))
    }
}

/// A recording whose process is still running.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRecording {
    pub id: RecordingId,
    pub channel: String,
    pub filename: String,
    pub started_at: DateTime<Local>,
    /// Seconds since start, computed when the snapshot was taken.
    pub elapsed_secs: u64,
}

/// A recording that failed to launch or exited abnormally.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRecording {
    pub id: RecordingId,
    pub channel: String,
    pub filename: String,
    pub started_at: DateTime<Local>,
    pub reason: String,
}

/// Point-in-time copy of both registry partitions, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordingsSnapshot {
    pub active: Vec<ActiveRecording>,
    pub failed: Vec<FailedRecording>,
}

impl RecordingsSnapshot {
    pub fn is_active(&self, id: &RecordingId) -> bool {
        self.active.iter().any(|r| &r.id == id)
    }

    pub fn is_failed(&self, id: &RecordingId) -> bool {
        self.failed.iter().any(|r| &r.id == id)
    }

    pub fn failure(&self, id: &RecordingId) -> Option<&FailedRecording> {
        self.failed.iter().find(|r| &r.id == id)
    }
}

/// Partition sizes, for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    pub active: usize,
    pub failed: usize,
}

/// Lifecycle transitions, broadcast to any subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Process launched and entered the active partition.
    Started { id: RecordingId },
    /// Launch failed; the recording went straight to the failed partition.
    LaunchFailed { id: RecordingId, reason: String },
    /// An interrupt was delivered to the process group.
    StopRequested { id: RecordingId },
    /// Process exited cleanly and the recording was removed.
    Finished { id: RecordingId },
    /// Process exited abnormally and the recording moved to failed.
    Failed { id: RecordingId, reason: String },
}

impl RecorderEvent {
    pub fn id(&self) -> &RecordingId {
        match self {
            Self::Started { id }
            | Self::LaunchFailed { id, .. }
            | Self::StopRequested { id }
            | Self::Finished { id }
            | Self::Failed { id, .. } => id,
        }
    }

    /// True once the recording can no longer change partition on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::LaunchFailed { .. } | Self::Finished { .. } | Self::Failed { .. }
        )
    }
}
