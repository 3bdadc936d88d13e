//! Integration tests for PgStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use fetcharr_common::{MediaType, QualityPreference};
use fetcharr_store::{
    migrate::migrate, ActionRecord, ActionType, PgStore, RequestRecord, RequestStatus, StepKey,
    StepStatus,
};
use fetcharr_store::{RequestStore, WorkflowStore};

/// Get a test store, or skip if no test DB is available.
async fn test_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    migrate(&pool).await.ok()?;

    // Clean slate for each test; steps/actions/transfers cascade.
    sqlx::query("TRUNCATE media_requests CASCADE")
        .execute(&pool)
        .await
        .ok()?;

    Some(PgStore::new(pool))
}

async fn seed_request(store: &PgStore) -> Uuid {
    let id = Uuid::new_v4();
    store
        .insert(&RequestRecord {
            id,
            title: "Test Movie".to_string(),
            year: Some(2024),
            media_type: MediaType::Movie,
            quality_preference: QualityPreference::default(),
            requested_by: None,
            status: RequestStatus::Pending,
            status_message: None,
            created_at: Utc::now(),
            completed_at: None,
        })
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn upsert_step_is_idempotent_against_unique_constraint() {
    let Some(store) = test_store().await else {
        return;
    };
    let request_id = seed_request(&store).await;

    let first = store
        .upsert_step(request_id, StepKey::Search, 3)
        .await
        .unwrap();
    let second = store
        .upsert_step(request_id, StepKey::Search, 3)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.status, StepStatus::Pending);
    assert_eq!(store.list_steps(request_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn step_round_trips_through_save() {
    let Some(store) = test_store().await else {
        return;
    };
    let request_id = seed_request(&store).await;

    let mut step = store
        .upsert_step(request_id, StepKey::Search, 3)
        .await
        .unwrap();
    step.status = StepStatus::Running;
    step.attempts += 1;
    step.started_at = Some(Utc::now());
    step.artifacts
        .insert("query".to_string(), json!("test movie 2024"));
    store.save_step(&step).await.unwrap();

    let loaded = store
        .get_step(request_id, StepKey::Search)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, StepStatus::Running);
    assert_eq!(loaded.attempts, 1);
    assert_eq!(loaded.artifacts["query"], json!("test movie 2024"));
}

#[tokio::test]
async fn open_action_upsert_hits_partial_unique_index() {
    let Some(store) = test_store().await else {
        return;
    };
    let request_id = seed_request(&store).await;

    let payload = |q: &str| {
        json!({"query": q})
            .as_object()
            .cloned()
            .unwrap_or_default()
    };

    let first = store
        .upsert_open_action(&ActionRecord::new(
            request_id,
            ActionType::FixSearchQuery,
            None,
            payload("test movie 2024"),
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
            payload("test movie"),
            Some("Still nothing".to_string()),
            70,
        ))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.payload["query"], json!("test movie"));
    assert_eq!(store.list_open_actions(None, 50).await.unwrap().len(), 1);
}
