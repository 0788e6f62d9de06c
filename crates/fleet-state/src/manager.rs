//! Control-plane state for the fleet hub.
//!
//! One [`FleetManager`] owns every keyed map (live links, poll tasks,
//! suppression flags, per-client locks) and the injected store seams. All
//! per-client operations (connect, disconnect, dispatch, queue mutation,
//! poll ticks) serialize on one async lock per client; distinct clients
//! never contend and no global lock spans clients. Media writes run outside
//! the per-client lock, bounded by a semaphore.

use std::sync::Arc;
use std::time::Duration;

use agent_bus::{AgentEvent, AgentLink, Order, Upload};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::FleetError;
use crate::poller::{self, PollHandle};
use crate::query::{self, Page, PageView};
use crate::store::{BlobStore, ClientDataStore, RecordStore};
use crate::types::{
    ClientPatch, ClientRecord, CommandKind, DispatchOutcome, DownloadRecord, MediaKind, Presence,
    QueuedCommand,
};

#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Seconds between location freshness checks per connected client; also
    /// the staleness threshold for the newest stored fix.
    pub poll_interval_secs: u64,
    /// Cap on concurrently processed media uploads.
    pub max_concurrent_uploads: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            max_concurrent_uploads: 8,
        }
    }
}

pub struct FleetManager {
    records: Arc<dyn RecordStore>,
    data: Arc<dyn ClientDataStore>,
    blobs: Arc<dyn BlobStore>,
    links: DashMap<String, Arc<dyn AgentLink>>,
    pollers: DashMap<String, PollHandle>,
    /// Disconnect-suppression flags. At connect time the stored value is the
    /// key's own prior presence in this map; the next disconnect consumes it.
    suppress: DashMap<String, bool>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    upload_permits: Arc<Semaphore>,
    config: FleetConfig,
}

impl FleetManager {
    pub fn new(
        records: Arc<dyn RecordStore>,
        data: Arc<dyn ClientDataStore>,
        blobs: Arc<dyn BlobStore>,
        config: FleetConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            records,
            data,
            blobs,
            links: DashMap::new(),
            pollers: DashMap::new(),
            suppress: DashMap::new(),
            locks: DashMap::new(),
            upload_permits: Arc::new(Semaphore::new(config.max_concurrent_uploads)),
            config,
        })
    }

    fn lock_for(&self, client_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(client_id.to_string())
            .or_default()
            .clone()
    }

    /// Register a freshly connected agent: upsert its record, install the
    /// link (last-connect-wins), replay the queue, restart the poll task,
    /// and start pumping the link's inbound events.
    pub async fn connect(
        self: &Arc<Self>,
        client_id: &str,
        link: Arc<dyn AgentLink>,
        dynamic_data: Value,
    ) -> Result<(), FleetError> {
        let lock = self.lock_for(client_id);
        let _guard = lock.lock().await;

        // A flag left in the map by an unresolved earlier cycle means the
        // next disconnect event belongs to the connection being replaced.
        let had_pending = self.suppress.contains_key(client_id);
        self.suppress.insert(client_id.to_string(), had_pending);

        let now = Utc::now();
        match self.records.get(client_id).await? {
            None => {
                self.records
                    .insert(ClientRecord {
                        client_id: client_id.to_string(),
                        first_seen: now,
                        last_seen: now,
                        is_online: true,
                        dynamic_data,
                    })
                    .await?;
            }
            Some(_) => {
                self.records
                    .apply(
                        client_id,
                        ClientPatch {
                            last_seen: Some(now),
                            is_online: Some(true),
                            dynamic_data: Some(dynamic_data),
                        },
                    )
                    .await?;
            }
        }

        let events = link.take_events();
        self.links.insert(client_id.to_string(), link);
        info!(client_id = %client_id, suppress_next_disconnect = had_pending, "agent connected");

        self.replay_queue(client_id).await;

        // Replacing the entry drops (and thereby cancels) any poll task left
        // over from a connection this one displaced.
        self.pollers.insert(
            client_id.to_string(),
            poller::spawn(
                Arc::clone(self),
                client_id.to_string(),
                Duration::from_secs(self.config.poll_interval_secs),
            ),
        );

        match events {
            Some(events) => self.spawn_event_pump(client_id.to_string(), events),
            None => debug!(client_id = %client_id, "link event stream already claimed"),
        }
        Ok(())
    }

    /// Handle a disconnect event for a client. A disconnect that trails a
    /// reconnect race is swallowed; a real one marks the client offline,
    /// drops the link, and cancels the poll task.
    pub async fn disconnect(&self, client_id: &str) -> Result<(), FleetError> {
        let lock = self.lock_for(client_id);
        let _guard = lock.lock().await;

        let suppressed = self
            .suppress
            .get(client_id)
            .map(|flag| *flag)
            .unwrap_or(false);
        self.suppress.remove(client_id);

        if suppressed {
            info!(client_id = %client_id, "ignoring disconnect from a replaced connection");
            return Ok(());
        }

        info!(client_id = %client_id, "agent disconnected");
        self.records
            .apply(
                client_id,
                ClientPatch {
                    last_seen: Some(Utc::now()),
                    is_online: Some(false),
                    dynamic_data: None,
                },
            )
            .await?;
        self.links.remove(client_id);
        self.pollers.remove(client_id);
        Ok(())
    }

    /// Validate and route an operator command: immediate delivery when the
    /// client is reachable, queued otherwise.
    pub async fn send_command(
        &self,
        client_id: &str,
        kind: &str,
        payload: Value,
    ) -> Result<DispatchOutcome, FleetError> {
        let kind = CommandKind::from_name(kind)
            .ok_or_else(|| FleetError::UnknownCommand(kind.to_string()))?;
        let lock = self.lock_for(client_id);
        let _guard = lock.lock().await;
        self.dispatch(client_id, kind, payload).await
    }

    /// Core routing; callers hold the per-client lock.
    async fn dispatch(
        &self,
        client_id: &str,
        kind: CommandKind,
        payload: Value,
    ) -> Result<DispatchOutcome, FleetError> {
        if self.records.get(client_id).await?.is_none() {
            return Err(FleetError::ClientNotFound(client_id.to_string()));
        }

        let link = self.links.get(client_id).map(|entry| entry.value().clone());
        if let Some(link) = link {
            link.deliver(Order {
                kind: kind.as_str().to_string(),
                payload,
            })?;
            info!(client_id = %client_id, command = %kind, "requested command from agent");
            return Ok(DispatchOutcome::Sent);
        }

        let queued = self.data.queued_commands(client_id).await?;
        if queued.iter().any(|command| command.kind == kind) {
            return Err(FleetError::DuplicateQueued);
        }
        self.data
            .push_command(
                client_id,
                QueuedCommand {
                    id: Uuid::new_v4(),
                    kind,
                    payload,
                    queued_at: Utc::now(),
                },
            )
            .await?;
        info!(client_id = %client_id, command = %kind, "queued command for offline agent");
        Ok(DispatchOutcome::Queued)
    }

    /// Attempt every command stored at connect time exactly once. Successes
    /// leave the queue; failures stay put until the next reconnect.
    async fn replay_queue(&self, client_id: &str) {
        let queued = match self.data.queued_commands(client_id).await {
            Ok(queued) => queued,
            Err(err) => {
                error!(client_id = %client_id, %err, "failed to read command queue");
                return;
            }
        };
        if queued.is_empty() {
            return;
        }
        info!(client_id = %client_id, pending = queued.len(), "replaying queued commands");
        for command in queued {
            match self
                .dispatch(client_id, command.kind, command.payload.clone())
                .await
            {
                Ok(_) => {
                    if let Err(err) = self.data.remove_command(client_id, command.id).await {
                        error!(client_id = %client_id, %err, "failed to drop replayed command");
                    }
                }
                Err(err) => {
                    error!(
                        client_id = %client_id,
                        command = %command.kind,
                        %err,
                        "queued command replay failed"
                    );
                }
            }
        }
    }

    fn spawn_event_pump(
        self: &Arc<Self>,
        client_id: String,
        mut events: mpsc::UnboundedReceiver<AgentEvent>,
    ) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    AgentEvent::Upload(upload) => {
                        let manager = Arc::clone(&manager);
                        let client_id = client_id.clone();
                        tokio::spawn(async move {
                            if let Err(err) = manager.ingest_upload(&client_id, upload).await {
                                error!(client_id = %client_id, %err, "media upload failed");
                            }
                        });
                    }
                    AgentEvent::Disconnected => break,
                }
            }
            // The stream ending without an explicit event counts as one.
            if let Err(err) = manager.disconnect(&client_id).await {
                error!(client_id = %client_id, %err, "disconnect handling failed");
            }
        });
    }

    /// Persist an inbound media upload and log it. The download record is
    /// appended only after the bytes are durably written; a failed write
    /// leaves no partial state.
    pub async fn ingest_upload(&self, client_id: &str, upload: Upload) -> Result<(), FleetError> {
        if !upload.has_image {
            return Ok(());
        }
        let _permit = match self.upload_permits.acquire().await {
            Ok(permit) => permit,
            // The semaphore is never closed while the manager is alive.
            Err(_) => return Ok(()),
        };
        info!(client_id = %client_id, name = %upload.name, "receiving media upload");

        let bytes = STANDARD.decode(upload.inline_bytes.as_bytes())?;
        let file_name = format!("{}{}", storage_key(), file_extension(&upload.name));
        let path = self.blobs.write(&file_name, &bytes).await?;

        self.data
            .push_download(
                client_id,
                DownloadRecord {
                    time: Utc::now(),
                    kind: MediaKind::Screenshot,
                    original_name: upload.name,
                    path,
                },
            )
            .await?;
        Ok(())
    }

    /// One poll-task tick: re-check cancellation under the per-client lock,
    /// then issue a location poll if the newest stored fix has gone stale.
    pub(crate) async fn poll_tick(&self, client_id: &str, token: &CancellationToken) {
        let lock = self.lock_for(client_id);
        let _guard = lock.lock().await;
        if token.is_cancelled() {
            return;
        }

        let newest = match self.data.latest_location(client_id).await {
            Ok(newest) => newest,
            Err(err) => {
                warn!(client_id = %client_id, %err, "failed to read location samples");
                return;
            }
        };
        let Some(fix) = newest else { return };

        let interval = chrono::Duration::seconds(self.config.poll_interval_secs as i64);
        let now = Utc::now();
        if fix.recorded_at >= now - interval {
            return;
        }
        let until = (now + interval).timestamp_millis();
        if let Err(err) = self
            .dispatch(client_id, CommandKind::Locate, json!({ "until": until }))
            .await
        {
            warn!(client_id = %client_id, %err, "location poll dispatch failed");
        }
    }

    /// Render one read-only page of a client's stored data. `None` for
    /// unknown clients and unrecognized page names, regardless of filter.
    pub async fn page(
        &self,
        client_id: &str,
        page: &str,
        filter: Option<&str>,
    ) -> Result<Option<PageView>, FleetError> {
        let Some(page) = Page::from_name(page) else {
            return Ok(None);
        };
        let Some(record) = self.records.get(client_id).await? else {
            return Ok(None);
        };
        let data = self.data.load(client_id).await?;
        Ok(Some(query::render(page, &record, &data, filter)))
    }

    pub async fn client(&self, client_id: &str) -> Result<Option<ClientRecord>, FleetError> {
        Ok(self.records.get(client_id).await?)
    }

    pub async fn clients(&self) -> Result<Vec<ClientRecord>, FleetError> {
        Ok(self.records.list(Presence::All).await?)
    }

    pub async fn clients_online(&self) -> Result<Vec<ClientRecord>, FleetError> {
        Ok(self.records.list(Presence::Online).await?)
    }

    pub async fn clients_offline(&self) -> Result<Vec<ClientRecord>, FleetError> {
        Ok(self.records.list(Presence::Offline).await?)
    }

    /// Operator-initiated removal, outside the normal connect/disconnect
    /// flow: drops the stored record plus any live link and poll task.
    pub async fn remove_client(&self, client_id: &str) -> Result<(), FleetError> {
        let lock = self.lock_for(client_id);
        let _guard = lock.lock().await;
        self.records.remove(client_id).await?;
        self.links.remove(client_id);
        self.pollers.remove(client_id);
        Ok(())
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.links.contains_key(client_id)
    }

    /// Cancel every poll task; used on daemon shutdown.
    pub fn shutdown(&self) {
        self.pollers.clear();
        self.links.clear();
    }
}

/// Uniqueness token for a stored media file, formatted as three dash-joined
/// fragments of a digest over the current time and a random value. Not a
/// content hash; collisions are not detected.
fn storage_key() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Utc::now().timestamp_micros().to_le_bytes());
    hasher.update(rand::random::<u64>().to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}-{}", &digest[..5], &digest[5..9], &digest[9..14])
}

/// File extension of `name` including the dot, or `.unknown` when `name`
/// carries none.
fn file_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[idx..],
        _ => ".unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ClientDataStore, MemoryBlobStore, MemoryDataStore, MemoryRecordStore};
    use crate::types::LocationFix;
    use agent_bus::{LinkRemote, LocalLink};
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use tokio::time::timeout;

    struct Harness {
        manager: Arc<FleetManager>,
        data: Arc<MemoryDataStore>,
        blobs: Arc<MemoryBlobStore>,
    }

    fn harness() -> Harness {
        harness_with(MemoryBlobStore::new())
    }

    fn harness_with(blobs: MemoryBlobStore) -> Harness {
        let records = Arc::new(MemoryRecordStore::new());
        let data = Arc::new(MemoryDataStore::new());
        let blobs = Arc::new(blobs);
        let manager = FleetManager::new(
            records,
            data.clone(),
            blobs.clone(),
            FleetConfig {
                poll_interval_secs: 30,
                max_concurrent_uploads: 4,
            },
        );
        Harness {
            manager,
            data,
            blobs,
        }
    }

    async fn connect(harness: &Harness, client_id: &str) -> LinkRemote {
        let (link, remote) = LocalLink::pair();
        harness
            .manager
            .connect(client_id, link, json!({ "os": "test" }))
            .await
            .expect("connect");
        remote
    }

    async fn queued(harness: &Harness, client_id: &str) -> Vec<QueuedCommand> {
        harness
            .data
            .queued_commands(client_id)
            .await
            .expect("queue read")
    }

    fn upload(name: &str, has_image: bool) -> Upload {
        Upload {
            name: name.into(),
            inline_bytes: STANDARD.encode(b"pixels"),
            has_image,
        }
    }

    #[tokio::test]
    async fn first_connect_creates_record() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;

        let record = harness
            .manager
            .client("dev-1")
            .await
            .expect("lookup")
            .expect("record exists");
        assert!(record.is_online);
        assert_eq!(record.first_seen, record.last_seen);
        assert_eq!(record.dynamic_data, json!({ "os": "test" }));
    }

    #[tokio::test]
    async fn reconnect_replaces_dynamic_data_and_keeps_first_seen() {
        let harness = harness();
        let _first = connect(&harness, "dev-1").await;
        let before = harness.manager.client("dev-1").await.unwrap().unwrap();

        harness.manager.disconnect("dev-1").await.expect("disconnect");
        let (link, _remote) = LocalLink::pair();
        harness
            .manager
            .connect("dev-1", link, json!({ "os": "test-2", "battery": 80 }))
            .await
            .expect("reconnect");

        let after = harness.manager.client("dev-1").await.unwrap().unwrap();
        assert_eq!(after.first_seen, before.first_seen);
        assert!(after.is_online);
        assert_eq!(after.dynamic_data, json!({ "os": "test-2", "battery": 80 }));
    }

    #[tokio::test]
    async fn command_sent_while_connected_never_touches_queue() {
        let harness = harness();
        let mut remote = connect(&harness, "dev-1").await;

        let outcome = harness
            .manager
            .send_command("dev-1", "lock", json!({}))
            .await
            .expect("send");
        assert_eq!(outcome, DispatchOutcome::Sent);
        assert_eq!(outcome.message(), "Requested");

        let order = remote.orders.recv().await.expect("order delivered");
        assert_eq!(order.kind, "lock");
        assert!(queued(&harness, "dev-1").await.is_empty());
    }

    #[tokio::test]
    async fn unknown_command_rejected_before_client_lookup() {
        let harness = harness();
        let err = harness
            .manager
            .send_command("nobody", "reboot", json!({}))
            .await
            .expect_err("must fail");
        assert!(matches!(err, FleetError::UnknownCommand(kind) if kind == "reboot"));
    }

    #[tokio::test]
    async fn unknown_client_rejected() {
        let harness = harness();
        let err = harness
            .manager
            .send_command("ghost", "lock", json!({}))
            .await
            .expect_err("must fail");
        assert!(matches!(err, FleetError::ClientNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn offline_command_queued_and_duplicate_kind_rejected() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;
        harness.manager.disconnect("dev-1").await.expect("disconnect");

        let outcome = harness
            .manager
            .send_command("dev-1", "lock", json!({}))
            .await
            .expect("queue");
        assert_eq!(outcome, DispatchOutcome::Queued);
        assert_eq!(outcome.message(), "Command queued (device is offline)");

        let first = queued(&harness, "dev-1").await;
        assert_eq!(first.len(), 1);

        let err = harness
            .manager
            .send_command("dev-1", "lock", json!({ "changed": true }))
            .await
            .expect_err("duplicate kind");
        assert!(matches!(err, FleetError::DuplicateQueued));

        // Original entry untouched, and a different kind still queues.
        let after = queued(&harness, "dev-1").await;
        assert_eq!(after, first);
        harness
            .manager
            .send_command("dev-1", "erase", json!({}))
            .await
            .expect("second kind queues");
        assert_eq!(queued(&harness, "dev-1").await.len(), 2);
    }

    #[tokio::test]
    async fn reconnect_replays_queue_oldest_first_and_drains_it() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;
        harness.manager.disconnect("dev-1").await.expect("disconnect");
        harness
            .manager
            .send_command("dev-1", "lock", json!({}))
            .await
            .expect("queue lock");
        harness
            .manager
            .send_command("dev-1", "erase", json!({}))
            .await
            .expect("queue erase");

        let mut remote = connect(&harness, "dev-1").await;
        let first = remote.orders.recv().await.expect("first replayed");
        let second = remote.orders.recv().await.expect("second replayed");
        assert_eq!(first.kind, "lock");
        assert_eq!(second.kind, "erase");
        assert!(queued(&harness, "dev-1").await.is_empty());
    }

    #[tokio::test]
    async fn failed_replay_leaves_entry_for_next_reconnect() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;
        harness.manager.disconnect("dev-1").await.expect("disconnect");
        harness
            .manager
            .send_command("dev-1", "lock", json!({}))
            .await
            .expect("queue lock");

        // A link whose order channel is already gone fails every delivery.
        let (link, remote) = LocalLink::pair();
        let LinkRemote { orders, events } = remote;
        drop(orders);
        harness
            .manager
            .connect("dev-1", link, json!({}))
            .await
            .expect("reconnect");
        drop(events);

        assert_eq!(queued(&harness, "dev-1").await.len(), 1);
    }

    #[tokio::test]
    async fn stale_disconnect_after_reconnect_is_suppressed() {
        let harness = harness();
        let _old = connect(&harness, "dev-1").await;
        let mut fresh = connect(&harness, "dev-1").await;

        // The disconnect trailing the replaced connection is swallowed.
        harness.manager.disconnect("dev-1").await.expect("stale");
        assert!(harness.manager.is_connected("dev-1"));
        let record = harness.manager.client("dev-1").await.unwrap().unwrap();
        assert!(record.is_online);

        // The newer link still delivers.
        harness
            .manager
            .send_command("dev-1", "lock", json!({}))
            .await
            .expect("send");
        assert_eq!(fresh.orders.recv().await.expect("delivered").kind, "lock");

        // The next disconnect is real.
        harness.manager.disconnect("dev-1").await.expect("real");
        assert!(!harness.manager.is_connected("dev-1"));
        let record = harness.manager.client("dev-1").await.unwrap().unwrap();
        assert!(!record.is_online);
    }

    #[tokio::test]
    async fn disconnect_marks_offline_and_updates_last_seen() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;
        let before = harness.manager.client("dev-1").await.unwrap().unwrap();

        harness.manager.disconnect("dev-1").await.expect("disconnect");
        let after = harness.manager.client("dev-1").await.unwrap().unwrap();
        assert!(!after.is_online);
        assert!(after.last_seen >= before.last_seen);
        assert!(!harness.manager.is_connected("dev-1"));
    }

    #[tokio::test]
    async fn presence_listings_follow_connection_state() {
        let harness = harness();
        let _a = connect(&harness, "dev-1").await;
        let _b = connect(&harness, "dev-2").await;
        harness.manager.disconnect("dev-2").await.expect("disconnect");

        let online = harness.manager.clients_online().await.expect("online");
        let offline = harness.manager.clients_offline().await.expect("offline");
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].client_id, "dev-1");
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].client_id, "dev-2");
        assert_eq!(harness.manager.clients().await.expect("all").len(), 2);
    }

    #[tokio::test]
    async fn remove_client_drops_record_and_link() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;

        harness.manager.remove_client("dev-1").await.expect("remove");
        assert!(harness.manager.client("dev-1").await.unwrap().is_none());
        assert!(!harness.manager.is_connected("dev-1"));
    }

    #[tokio::test]
    async fn upload_persists_blob_then_appends_one_record() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;

        harness
            .manager
            .ingest_upload("dev-1", upload("shot.png", true))
            .await
            .expect("ingest");

        assert_eq!(harness.blobs.len().await, 1);
        let data = harness.data.load("dev-1").await.expect("load");
        assert_eq!(data.downloads.len(), 1);
        let record = &data.downloads[0];
        assert_eq!(record.kind, MediaKind::Screenshot);
        assert_eq!(record.original_name, "shot.png");
        assert!(record.path.starts_with("media/"));
        assert!(record.path.ends_with(".png"));
        assert_eq!(
            harness.blobs.stored(&record.path).await.as_deref(),
            Some(b"pixels".as_slice())
        );
    }

    #[tokio::test]
    async fn upload_without_image_flag_is_ignored() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;

        harness
            .manager
            .ingest_upload("dev-1", upload("shot.png", false))
            .await
            .expect("ignored");
        assert!(harness.blobs.is_empty().await);
        assert!(harness.data.load("dev-1").await.unwrap().downloads.is_empty());
    }

    #[tokio::test]
    async fn failed_blob_write_appends_no_record() {
        let harness = harness_with(MemoryBlobStore::failing());
        let _remote = connect(&harness, "dev-1").await;

        let err = harness
            .manager
            .ingest_upload("dev-1", upload("shot.png", true))
            .await
            .expect_err("write must fail");
        assert!(matches!(err, FleetError::Blob(_)));
        assert!(harness.data.load("dev-1").await.unwrap().downloads.is_empty());
    }

    #[tokio::test]
    async fn upload_without_extension_stores_unknown() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;

        harness
            .manager
            .ingest_upload("dev-1", upload("rawcapture", true))
            .await
            .expect("ingest");
        let data = harness.data.load("dev-1").await.expect("load");
        assert!(data.downloads[0].path.ends_with(".unknown"));
    }

    #[tokio::test]
    async fn upload_events_flow_through_the_link_pump() {
        let harness = harness();
        let remote = connect(&harness, "dev-1").await;

        remote
            .events
            .send(AgentEvent::Upload(upload("pumped.png", true)))
            .expect("event sent");

        // The pump hands uploads to a background task; poll until the record
        // lands.
        for _ in 0..100 {
            if !harness.data.load("dev-1").await.unwrap().downloads.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(harness.data.load("dev-1").await.unwrap().downloads.len(), 1);
    }

    #[tokio::test]
    async fn page_returns_none_for_unknown_client_and_page() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;

        assert!(harness
            .manager
            .page("ghost", "calls", Some("555123"))
            .await
            .expect("query")
            .is_none());
        assert!(harness
            .manager
            .page("dev-1", "battery", Some("555123"))
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn page_renders_for_known_client() {
        let harness = harness();
        let _remote = connect(&harness, "dev-1").await;
        harness
            .data
            .with_data("dev-1", |data| {
                data.clipboard.push(crate::types::ClipboardEntry {
                    content: "copied".into(),
                    captured_at: Utc::now(),
                });
            })
            .await;

        let view = harness
            .manager
            .page("dev-1", "clipboard", None)
            .await
            .expect("query")
            .expect("view");
        assert!(matches!(view, PageView::Clipboard(entries) if entries.len() == 1));
    }

    fn fix(age_secs: i64) -> LocationFix {
        LocationFix {
            latitude: 52.52,
            longitude: 13.405,
            accuracy: Some(5.0),
            recorded_at: Utc::now() - ChronoDuration::seconds(age_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poll_issues_locate_when_newest_fix_is_stale() {
        let harness = harness();
        harness
            .data
            .with_data("dev-1", |data| data.locations.push(fix(3600)))
            .await;
        let mut remote = connect(&harness, "dev-1").await;

        let order = remote.orders.recv().await.expect("locate order");
        assert_eq!(order.kind, "locate");
        assert!(order.payload["until"].as_i64().expect("until") > 0);
        // Immediate delivery path: nothing persisted.
        assert!(queued(&harness, "dev-1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_skips_fresh_fix() {
        let harness = harness();
        harness
            .data
            .with_data("dev-1", |data| data.locations.push(fix(1)))
            .await;
        let mut remote = connect(&harness, "dev-1").await;

        let waited = timeout(Duration::from_secs(95), remote.orders.recv()).await;
        assert!(waited.is_err(), "no order may be issued for a fresh fix");
    }

    #[tokio::test(start_paused = true)]
    async fn poll_noops_without_any_fix() {
        let harness = harness();
        let mut remote = connect(&harness, "dev-1").await;

        let waited = timeout(Duration::from_secs(95), remote.orders.recv()).await;
        assert!(waited.is_err(), "no order may be issued without samples");
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_the_poll_task() {
        let harness = harness();
        harness
            .data
            .with_data("dev-1", |data| data.locations.push(fix(3600)))
            .await;
        let mut remote = connect(&harness, "dev-1").await;
        let _first = remote.orders.recv().await.expect("first locate");

        harness.manager.disconnect("dev-1").await.expect("disconnect");

        // Run well past several would-be ticks: a cancelled poller must
        // neither deliver nor queue anything.
        tokio::time::sleep(Duration::from_secs(185)).await;
        assert!(queued(&harness, "dev-1").await.is_empty());
        match remote.orders.try_recv() {
            Err(_) => {}
            Ok(order) => panic!("poller fired after cancellation: {order:?}"),
        }
    }

    #[test]
    fn storage_keys_are_dash_fragmented_and_distinct() {
        let a = storage_key();
        let b = storage_key();
        let parts: Vec<&str> = a.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 5);
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 5);
        assert_ne!(a, b);
    }

    #[test]
    fn file_extension_follows_last_dot() {
        assert_eq!(file_extension("shot.png"), ".png");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("rawcapture"), ".unknown");
        assert_eq!(file_extension(".hidden"), ".unknown");
    }
}
