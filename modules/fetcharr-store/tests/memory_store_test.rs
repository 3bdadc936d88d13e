//! Uniqueness-invariant tests against the in-memory store.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use fetcharr_common::{MediaType, QualityPreference, TransferState};
use fetcharr_store::{
    ActionRecord, ActionType, MemoryStore, RequestRecord, RequestStatus, StepKey, TransferRecord,
    WorkflowError,
};
use fetcharr_store::{RequestStore, TransferStore, WorkflowStore};

fn request(id: Uuid) -> RequestRecord {
    RequestRecord {
        id,
        title: "Test Movie".to_string(),
        year: Some(2024),
        media_type: MediaType::Movie,
        quality_preference: QualityPreference::default(),
        requested_by: Some("alice".to_string()),
        status: RequestStatus::Pending,
        status_message: None,
        created_at: Utc::now(),
        completed_at: None,
    }
}

fn payload(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn upsert_step_called_twice_yields_one_row() {
    let store = MemoryStore::new();
    let request_id = Uuid::new_v4();

    let first = store
        .upsert_step(request_id, StepKey::Search, 3)
        .await
        .unwrap();
    let second = store
        .upsert_step(request_id, StepKey::Search, 3)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.list_steps(request_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn steps_list_in_pipeline_order() {
    let store = MemoryStore::new();
    let request_id = Uuid::new_v4();

    // Create out of order
    store
        .upsert_step(request_id, StepKey::PlexScan, 3)
        .await
        .unwrap();
    store
        .upsert_step(request_id, StepKey::Search, 3)
        .await
        .unwrap();
    store
        .upsert_step(request_id, StepKey::DownloadAdd, 3)
        .await
        .unwrap();

    let keys: Vec<StepKey> = store
        .list_steps(request_id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.step_key)
        .collect();
    assert_eq!(
        keys,
        vec![StepKey::Search, StepKey::DownloadAdd, StepKey::PlexScan]
    );
}

#[tokio::test]
async fn repeated_open_action_upsert_updates_in_place() {
    let store = MemoryStore::new();
    let request_id = Uuid::new_v4();

    let first = store
        .upsert_open_action(&ActionRecord::new(
            request_id,
            ActionType::FixSearchQuery,
            None,
            payload(json!({"query": "test movie 2024"})),
            Some("No results".to_string()),
            70,
        ))
        .await
        .unwrap();

    let second = store
        .upsert_open_action(&ActionRecord::new(
            request_id,
            ActionType::FixSearchQuery,
            None,
            payload(json!({"query": "test movie"})),
            Some("Still no results".to_string()),
            70,
        ))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.payload["query"], json!("test movie"));

    let open = store.list_open_actions(None, 50).await.unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn open_actions_order_by_priority_then_age() {
    let store = MemoryStore::new();
    let low = Uuid::new_v4();
    let high = Uuid::new_v4();

    store
        .upsert_open_action(&ActionRecord::new(
            low,
            ActionType::ConfirmRename,
            None,
            payload(json!({})),
            None,
            40,
        ))
        .await
        .unwrap();
    store
        .upsert_open_action(&ActionRecord::new(
            high,
            ActionType::FixSearchQuery,
            None,
            payload(json!({})),
            None,
            70,
        ))
        .await
        .unwrap();

    let open = store.list_open_actions(None, 50).await.unwrap();
    assert_eq!(open[0].request_id, high);
    assert_eq!(open[1].request_id, low);
}

#[tokio::test]
async fn set_status_on_missing_request_is_not_found() {
    let store = MemoryStore::new();
    let err = store
        .set_status(Uuid::new_v4(), RequestStatus::Searching, "searching")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}

#[tokio::test]
async fn transfer_upsert_replaces_per_request_row() {
    let store = MemoryStore::new();
    let request_id = Uuid::new_v4();
    store.insert(&request(request_id)).await.unwrap();

    let mut transfer = TransferRecord {
        request_id,
        handle: "abc123".to_string(),
        name: "Test.Movie.2024.1080p".to_string(),
        size_bytes: 4_000_000_000,
        progress: 0.25,
        speed_bps: 1_000_000,
        state: TransferState::Downloading,
        save_path: None,
        updated_at: Utc::now(),
    };
    TransferStore::upsert(&store, &transfer).await.unwrap();

    transfer.progress = 0.80;
    transfer.save_path = Some("/downloads/Test.Movie.2024.1080p".to_string());
    TransferStore::upsert(&store, &transfer).await.unwrap();

    let stored = TransferStore::get(&store, request_id).await.unwrap().unwrap();
    assert_eq!(stored.progress, 0.80);
    assert!(stored.save_path.is_some());

    TransferStore::delete(&store, request_id).await.unwrap();
    assert!(TransferStore::get(&store, request_id)
        .await
        .unwrap()
        .is_none());
}
