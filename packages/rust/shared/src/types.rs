//! Core domain types for buildwatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BuildId
// ---------------------------------------------------------------------------

/// Opaque identifier for a single CI build, unique within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub String);

impl BuildId {
    /// View the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BuildId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BuildId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BuildStatus
// ---------------------------------------------------------------------------

/// Terminal (or in-flight) status of a CI build, as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Succeeded,
    Failed,
    Fault,
    TimedOut,
    InProgress,
    Stopped,
    /// Forward-compatible catch-all for statuses this tool does not know.
    #[serde(other)]
    Unknown,
}

impl BuildStatus {
    /// Only `FAILED` builds trigger the notification path.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Fault => "FAULT",
            Self::TimedOut => "TIMED_OUT",
            Self::InProgress => "IN_PROGRESS",
            Self::Stopped => "STOPPED",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// BuildDetail
// ---------------------------------------------------------------------------

/// Where a build's execution output lives in the log service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLocation {
    /// Log group name.
    #[serde(rename = "groupName")]
    pub group_name: String,
    /// Log stream name within the group.
    #[serde(rename = "streamName")]
    pub stream_name: String,
}

/// Detail record for one build, as returned by the batch-get operation.
///
/// Owned transiently: read once per run, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDetail {
    /// The build's identifier.
    pub id: BuildId,
    /// Terminal or in-flight status.
    #[serde(rename = "buildStatus")]
    pub build_status: BuildStatus,
    /// Log location, absent while the build has produced no output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogLocation>,
}

// ---------------------------------------------------------------------------
// LogEvent
// ---------------------------------------------------------------------------

/// One timestamped log record from the log service.
///
/// Order of a fetched sequence is chronological emission order; duplicate
/// message text is permitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Emission time in epoch milliseconds.
    pub timestamp: i64,
    /// Raw message text.
    pub message: String,
}

impl LogEvent {
    /// The emission time as a UTC datetime, if the timestamp is representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A file to attach to a notification email.
#[derive(Debug, Clone)]
pub struct AttachmentSpec {
    /// Path of the persisted report on disk.
    pub path: std::path::PathBuf,
    /// Filename presented in the attachment disposition header.
    pub filename: String,
}

/// A fully composed notification, ready for transport handoff.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Subject line, derived from the project name.
    pub subject: String,
    /// Envelope/header sender address.
    pub sender: String,
    /// Envelope/header recipient address.
    pub recipient: String,
    /// Plain-text body.
    pub body: String,
    /// Optional single attachment (the persisted log window).
    pub attachment: Option<AttachmentSpec>,
}
