//! Store seams backing the fleet manager, plus in-memory implementations
//! used by tests and standalone (volatile) runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{
    ClientData, ClientPatch, ClientRecord, DownloadRecord, LocationFix, Presence, QueuedCommand,
};

/// Persistent per-client presence records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, client_id: &str) -> Result<Option<ClientRecord>, StoreError>;
    async fn insert(&self, record: ClientRecord) -> Result<(), StoreError>;
    /// Partial update; no-op for unknown clients.
    async fn apply(&self, client_id: &str, patch: ClientPatch) -> Result<(), StoreError>;
    async fn list(&self, presence: Presence) -> Result<Vec<ClientRecord>, StoreError>;
    async fn remove(&self, client_id: &str) -> Result<(), StoreError>;
}

/// Per-client nested collections: the command queue, the download log, and
/// the accumulated telemetry document.
#[async_trait]
pub trait ClientDataStore: Send + Sync {
    /// Queued commands in insertion order.
    async fn queued_commands(&self, client_id: &str) -> Result<Vec<QueuedCommand>, StoreError>;
    async fn push_command(&self, client_id: &str, command: QueuedCommand)
        -> Result<(), StoreError>;
    async fn remove_command(&self, client_id: &str, id: Uuid) -> Result<(), StoreError>;
    async fn push_download(&self, client_id: &str, record: DownloadRecord)
        -> Result<(), StoreError>;
    /// The stored fix with the newest `recorded_at`, if any.
    async fn latest_location(&self, client_id: &str) -> Result<Option<LocationFix>, StoreError>;
    /// The full per-client document as one snapshot.
    async fn load(&self, client_id: &str) -> Result<ClientData, StoreError>;
}

/// Blob storage for uploaded media bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under the configured root; returns the relative path to
    /// record in the download log.
    async fn write(&self, file_name: &str, bytes: &[u8]) -> std::io::Result<String>;
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, ClientRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, client_id: &str) -> Result<Option<ClientRecord>, StoreError> {
        Ok(self.records.read().await.get(client_id).cloned())
    }

    async fn insert(&self, record: ClientRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.client_id.clone(), record);
        Ok(())
    }

    async fn apply(&self, client_id: &str, patch: ClientPatch) -> Result<(), StoreError> {
        if let Some(record) = self.records.write().await.get_mut(client_id) {
            if let Some(last_seen) = patch.last_seen {
                record.last_seen = last_seen;
            }
            if let Some(is_online) = patch.is_online {
                record.is_online = is_online;
            }
            if let Some(dynamic_data) = patch.dynamic_data {
                record.dynamic_data = dynamic_data;
            }
        }
        Ok(())
    }

    async fn list(&self, presence: Presence) -> Result<Vec<ClientRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|record| match presence {
                Presence::All => true,
                Presence::Online => record.is_online,
                Presence::Offline => !record.is_online,
            })
            .cloned()
            .collect())
    }

    async fn remove(&self, client_id: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(client_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDataStore {
    queues: RwLock<HashMap<String, Vec<QueuedCommand>>>,
    documents: RwLock<HashMap<String, ClientData>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate a client's stored document in place. Used by test setup and by
    /// external telemetry writers embedding the memory backend.
    pub async fn with_data<F>(&self, client_id: &str, mutate: F)
    where
        F: FnOnce(&mut ClientData),
    {
        let mut documents = self.documents.write().await;
        mutate(documents.entry(client_id.to_string()).or_default());
    }
}

#[async_trait]
impl ClientDataStore for MemoryDataStore {
    async fn queued_commands(&self, client_id: &str) -> Result<Vec<QueuedCommand>, StoreError> {
        Ok(self
            .queues
            .read()
            .await
            .get(client_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_command(
        &self,
        client_id: &str,
        command: QueuedCommand,
    ) -> Result<(), StoreError> {
        self.queues
            .write()
            .await
            .entry(client_id.to_string())
            .or_default()
            .push(command);
        Ok(())
    }

    async fn remove_command(&self, client_id: &str, id: Uuid) -> Result<(), StoreError> {
        if let Some(queue) = self.queues.write().await.get_mut(client_id) {
            queue.retain(|command| command.id != id);
        }
        Ok(())
    }

    async fn push_download(
        &self,
        client_id: &str,
        record: DownloadRecord,
    ) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .entry(client_id.to_string())
            .or_default()
            .downloads
            .push(record);
        Ok(())
    }

    async fn latest_location(&self, client_id: &str) -> Result<Option<LocationFix>, StoreError> {
        Ok(self.documents.read().await.get(client_id).and_then(|doc| {
            doc.locations
                .iter()
                .max_by_key(|fix| fix.recorded_at)
                .cloned()
        }))
    }

    async fn load(&self, client_id: &str) -> Result<ClientData, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .get(client_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory blob store capturing writes; can be flipped to fail every write
/// for error-path tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
    fail_writes: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            fail_writes: true,
        }
    }

    pub async fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, file_name: &str, bytes: &[u8]) -> std::io::Result<String> {
        if self.fail_writes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "blob store unavailable",
            ));
        }
        let path = format!("media/{file_name}");
        self.files
            .write()
            .await
            .insert(path.clone(), bytes.to_vec());
        Ok(path)
    }
}
