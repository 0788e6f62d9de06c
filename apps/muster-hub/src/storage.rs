//! Redis-backed implementations of the fleet store seams.
//!
//! Layout: the presence record lives as one JSON document under
//! `client:{id}`; per-client collections hang off it as
//! `client:{id}:<section>` lists, except the command queue, which follows an
//! id-list-plus-payload-key scheme so entries can be removed by id without
//! value matching: `client:{id}:queue` holds command ids in insertion order
//! and `client:{id}:command:{uuid}` holds each payload.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use fleet_state::error::StoreError;
use fleet_state::store::{ClientDataStore, RecordStore};
use fleet_state::types::{
    ClientData, ClientPatch, ClientRecord, DownloadRecord, LocationFix, Presence, QueuedCommand,
};

#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self { redis })
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        let mut conn = self.redis.clone();
        let raw: Vec<String> = conn.lrange(key, 0, -1).await.map_err(backend)?;
        // Entries that fail to parse are skipped rather than failing the read.
        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }
}

fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn record_key(client_id: &str) -> String {
    format!("client:{client_id}")
}

fn section_key(client_id: &str, section: &str) -> String {
    format!("client:{client_id}:{section}")
}

fn command_key(client_id: &str, id: Uuid) -> String {
    format!("client:{client_id}:command:{id}")
}

/// Record keys are exactly `client:{id}`; anything with a further segment is
/// a sub-collection.
fn is_record_key(key: &str) -> bool {
    key.strip_prefix("client:")
        .map(|rest| !rest.contains(':'))
        .unwrap_or(false)
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn get(&self, client_id: &str) -> Result<Option<ClientRecord>, StoreError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn
            .get(record_key(client_id))
            .await
            .map_err(backend)?;
        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, record: ClientRecord) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let value = serde_json::to_string(&record)?;
        conn.set::<_, _, ()>(record_key(&record.client_id), value)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn apply(&self, client_id: &str, patch: ClientPatch) -> Result<(), StoreError> {
        let Some(mut record) = self.get(client_id).await? else {
            return Ok(());
        };
        if let Some(last_seen) = patch.last_seen {
            record.last_seen = last_seen;
        }
        if let Some(is_online) = patch.is_online {
            record.is_online = is_online;
        }
        if let Some(dynamic_data) = patch.dynamic_data {
            record.dynamic_data = dynamic_data;
        }
        self.insert(record).await
    }

    async fn list(&self, presence: Presence) -> Result<Vec<ClientRecord>, StoreError> {
        let mut conn = self.redis.clone();
        let mut cursor: u64 = 0;
        let mut results = Vec::new();
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg("client:*")
                .arg("COUNT")
                .arg(100u32)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            cursor = next_cursor;

            let record_keys: Vec<String> =
                keys.into_iter().filter(|key| is_record_key(key)).collect();
            if !record_keys.is_empty() {
                let values: Vec<Option<String>> = redis::cmd("MGET")
                    .arg(record_keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(backend)?;
                for value in values.into_iter().flatten() {
                    if let Ok(record) = serde_json::from_str::<ClientRecord>(&value) {
                        results.push(record);
                    }
                }
            }
            if cursor == 0 {
                break;
            }
        }
        Ok(results
            .into_iter()
            .filter(|record| match presence {
                Presence::All => true,
                Presence::Online => record.is_online,
                Presence::Offline => !record.is_online,
            })
            .collect())
    }

    async fn remove(&self, client_id: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(record_key(client_id))
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl ClientDataStore for RedisStore {
    async fn queued_commands(&self, client_id: &str) -> Result<Vec<QueuedCommand>, StoreError> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .lrange(section_key(client_id, "queue"), 0, -1)
            .await
            .map_err(backend)?;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(id) = id.parse::<Uuid>() else { continue };
            let payload: Option<String> = conn
                .get(command_key(client_id, id))
                .await
                .map_err(backend)?;
            if let Some(json) = payload {
                if let Ok(command) = serde_json::from_str::<QueuedCommand>(&json) {
                    results.push(command);
                }
            }
        }
        Ok(results)
    }

    async fn push_command(
        &self,
        client_id: &str,
        command: QueuedCommand,
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let serialized = serde_json::to_string(&command)?;
        redis::pipe()
            .cmd("SET")
            .arg(command_key(client_id, command.id))
            .arg(serialized)
            .ignore()
            .cmd("RPUSH")
            .arg(section_key(client_id, "queue"))
            .arg(command.id.to_string())
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn remove_command(&self, client_id: &str, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        redis::pipe()
            .cmd("LREM")
            .arg(section_key(client_id, "queue"))
            .arg(0)
            .arg(id.to_string())
            .ignore()
            .cmd("DEL")
            .arg(command_key(client_id, id))
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn push_download(
        &self,
        client_id: &str,
        record: DownloadRecord,
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let serialized = serde_json::to_string(&record)?;
        conn.rpush::<_, _, ()>(section_key(client_id, "downloads"), serialized)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn latest_location(&self, client_id: &str) -> Result<Option<LocationFix>, StoreError> {
        let fixes: Vec<LocationFix> = self.read_list(&section_key(client_id, "locations")).await?;
        Ok(fixes.into_iter().max_by_key(|fix| fix.recorded_at))
    }

    async fn load(&self, client_id: &str) -> Result<ClientData, StoreError> {
        let mut data = ClientData {
            calls: self.read_list(&section_key(client_id, "calls")).await?,
            sms: self.read_list(&section_key(client_id, "sms")).await?,
            notifications: self
                .read_list(&section_key(client_id, "notifications"))
                .await?,
            clipboard: self.read_list(&section_key(client_id, "clipboard")).await?,
            locations: self.read_list(&section_key(client_id, "locations")).await?,
            downloads: self.read_list(&section_key(client_id, "downloads")).await?,
            ..ClientData::default()
        };

        let mut conn = self.redis.clone();
        let snapshot: HashMap<String, String> = conn
            .hgetall(section_key(client_id, "snapshot"))
            .await
            .map_err(backend)?;
        for (field, raw) in snapshot {
            let Ok(value) = serde_json::from_str(&raw) else {
                continue;
            };
            match field.as_str() {
                "contacts" => data.contacts = value,
                "apps" => data.apps = value,
                "permissions" => data.permissions = value,
                "wifi_now" => data.wifi_now = value,
                "wifi_log" => data.wifi_log = value,
                "current_folder" => data.current_folder = value,
                "lock_state" => data.lock_state = value,
                _ => {}
            }
        }
        Ok(data)
    }
}
