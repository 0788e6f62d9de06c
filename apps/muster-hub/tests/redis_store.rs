//! Redis-backed integration test for the hub store layer.
//!
//! This test is ignored by default. To run it locally:
//! - Start Redis (e.g., `docker run -p 6379:6379 redis`)
//! - Export `MUSTER_REDIS_URL` to point at the instance
//! - Run: `cargo test -p muster-hub -- --ignored redis_store_e2e`

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use fleet_state::store::{ClientDataStore, RecordStore};
use fleet_state::types::{
    ClientPatch, ClientRecord, CommandKind, DownloadRecord, MediaKind, Presence, QueuedCommand,
};
use muster_hub::storage::RedisStore;

#[ignore]
#[tokio::test]
async fn redis_store_e2e() {
    let url = std::env::var("MUSTER_REDIS_URL")
        .expect("MUSTER_REDIS_URL must be set for this test");
    let store = RedisStore::connect(&url).await.expect("redis reachable");

    let client_id = format!("it-{}", Uuid::new_v4());
    let now = Utc::now();

    store
        .insert(ClientRecord {
            client_id: client_id.clone(),
            first_seen: now,
            last_seen: now,
            is_online: true,
            dynamic_data: json!({ "os": "it" }),
        })
        .await
        .expect("insert record");

    let fetched = store
        .get(&client_id)
        .await
        .expect("get record")
        .expect("record present");
    assert!(fetched.is_online);
    assert_eq!(fetched.dynamic_data, json!({ "os": "it" }));

    store
        .apply(
            &client_id,
            ClientPatch {
                last_seen: None,
                is_online: Some(false),
                dynamic_data: None,
            },
        )
        .await
        .expect("patch record");
    let offline = store
        .list(Presence::Offline)
        .await
        .expect("list offline");
    assert!(offline.iter().any(|record| record.client_id == client_id));

    let command = QueuedCommand {
        id: Uuid::new_v4(),
        kind: CommandKind::Lock,
        payload: json!({}),
        queued_at: now,
    };
    store
        .push_command(&client_id, command.clone())
        .await
        .expect("push command");
    let queued = store
        .queued_commands(&client_id)
        .await
        .expect("list commands");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, command.id);
    store
        .remove_command(&client_id, command.id)
        .await
        .expect("remove command");
    assert!(store
        .queued_commands(&client_id)
        .await
        .expect("list again")
        .is_empty());

    store
        .push_download(
            &client_id,
            DownloadRecord {
                time: now,
                kind: MediaKind::Screenshot,
                original_name: "shot.png".into(),
                path: "media/abc.png".into(),
            },
        )
        .await
        .expect("push download");
    let data = store.load(&client_id).await.expect("load document");
    assert_eq!(data.downloads.len(), 1);
    assert!(store
        .latest_location(&client_id)
        .await
        .expect("latest fix")
        .is_none());

    store.remove(&client_id).await.expect("remove record");
    assert!(store.get(&client_id).await.expect("get gone").is_none());
}
