//! Postgres store implementation.
//!
//! Raw SQL over a `PgPool`. The uniqueness invariants live in the schema
//! (see `migrate`): a UNIQUE constraint on (request_id, step_key) and a
//! partial unique index on (request_id, action_type) WHERE status='open'.
//! All writes go through upserts against those constraints, so two
//! concurrent orchestrator passes cannot create duplicate rows.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use fetcharr_common::TransferState;

use crate::error::WorkflowError;
use crate::records::{
    ActionRecord, ActionType, RequestRecord, RequestStatus, StepKey, StepRecord, TransferRecord,
};
use crate::traits::{RequestStore, TransferStore, WorkflowStore};

const STEP_COLUMNS: &str = "id, request_id, step_key, step_order, status, attempts, max_attempts, \
     started_at, ended_at, last_error_code, last_error_message, artifacts, created_at, updated_at";

const ACTION_COLUMNS: &str = "id, request_id, step_id, action_type, status, priority, payload, \
     resolution, message, created_at, resolved_at, resolved_by";

const REQUEST_COLUMNS: &str = "id, title, year, media_type, quality_preference, requested_by, \
     status, status_message, created_at, completed_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, WorkflowError> {
    raw.parse().map_err(WorkflowError::Database)
}

fn json_map(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn step_from_row(row: &PgRow) -> Result<StepRecord, WorkflowError> {
    let step_key: String = row.try_get("step_key")?;
    let status: String = row.try_get("status")?;
    let artifacts: Value = row.try_get("artifacts")?;
    Ok(StepRecord {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        step_key: parse(&step_key)?,
        step_order: row.try_get("step_order")?,
        status: parse(&status)?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        last_error_code: row.try_get("last_error_code")?,
        last_error_message: row.try_get("last_error_message")?,
        artifacts: json_map(artifacts),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn action_from_row(row: &PgRow) -> Result<ActionRecord, WorkflowError> {
    let action_type: String = row.try_get("action_type")?;
    let status: String = row.try_get("status")?;
    let payload: Value = row.try_get("payload")?;
    let resolution: Option<Value> = row.try_get("resolution")?;
    Ok(ActionRecord {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        step_id: row.try_get("step_id")?,
        action_type: parse(&action_type)?,
        status: parse(&status)?,
        priority: row.try_get("priority")?,
        payload: json_map(payload),
        resolution: resolution.map(json_map),
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
        resolved_by: row.try_get("resolved_by")?,
    })
}

fn request_from_row(row: &PgRow) -> Result<RequestRecord, WorkflowError> {
    let media_type: String = row.try_get("media_type")?;
    let quality: String = row.try_get("quality_preference")?;
    let status: String = row.try_get("status")?;
    Ok(RequestRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        media_type: parse(&media_type)?,
        quality_preference: parse(&quality)?,
        requested_by: row.try_get("requested_by")?,
        status: parse(&status)?,
        status_message: row.try_get("status_message")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn transfer_from_row(row: &PgRow) -> Result<TransferRecord, WorkflowError> {
    let state: String = row.try_get("state")?;
    Ok(TransferRecord {
        request_id: row.try_get("request_id")?,
        handle: row.try_get("handle")?,
        name: row.try_get("name")?,
        size_bytes: row.try_get("size_bytes")?,
        progress: row.try_get("progress")?,
        speed_bps: row.try_get("speed_bps")?,
        state: parse::<TransferState>(&state)?,
        save_path: row.try_get("save_path")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ---------------------------------------------------------------------------
// WorkflowStore
// ---------------------------------------------------------------------------

#[async_trait]
impl WorkflowStore for PgStore {
    async fn upsert_step(
        &self,
        request_id: Uuid,
        step_key: StepKey,
        max_attempts: i32,
    ) -> Result<StepRecord, WorkflowError> {
        sqlx::query(
            "INSERT INTO request_workflow_steps
                 (id, request_id, step_key, step_order, status, attempts, max_attempts, artifacts)
             VALUES ($1, $2, $3, $4, 'pending', 0, $5, '{}'::jsonb)
             ON CONFLICT (request_id, step_key) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(request_id)
        .bind(step_key.to_string())
        .bind(step_key.order())
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM request_workflow_steps
             WHERE request_id = $1 AND step_key = $2"
        ))
        .bind(request_id)
        .bind(step_key.to_string())
        .fetch_one(&self.pool)
        .await?;

        step_from_row(&row)
    }

    async fn get_step(
        &self,
        request_id: Uuid,
        step_key: StepKey,
    ) -> Result<Option<StepRecord>, WorkflowError> {
        let row = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM request_workflow_steps
             WHERE request_id = $1 AND step_key = $2"
        ))
        .bind(request_id)
        .bind(step_key.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(step_from_row).transpose()
    }

    async fn save_step(&self, step: &StepRecord) -> Result<(), WorkflowError> {
        let result = sqlx::query(
            "UPDATE request_workflow_steps
             SET status = $2,
                 attempts = $3,
                 max_attempts = $4,
                 started_at = $5,
                 ended_at = $6,
                 last_error_code = $7,
                 last_error_message = $8,
                 artifacts = $9,
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(step.id)
        .bind(step.status.to_string())
        .bind(step.attempts)
        .bind(step.max_attempts)
        .bind(step.started_at)
        .bind(step.ended_at)
        .bind(&step.last_error_code)
        .bind(&step.last_error_message)
        .bind(Value::Object(step.artifacts.clone()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(format!(
                "workflow step {}",
                step.step_key
            )));
        }
        Ok(())
    }

    async fn list_steps(&self, request_id: Uuid) -> Result<Vec<StepRecord>, WorkflowError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM request_workflow_steps
             WHERE request_id = $1
             ORDER BY step_order"
        ))
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(step_from_row).collect()
    }

    async fn upsert_open_action(
        &self,
        action: &ActionRecord,
    ) -> Result<ActionRecord, WorkflowError> {
        let row = sqlx::query(&format!(
            "INSERT INTO request_actions
                 (id, request_id, step_id, action_type, status, priority, payload, message, created_at)
             VALUES ($1, $2, $3, $4, 'open', $5, $6, $7, $8)
             ON CONFLICT (request_id, action_type) WHERE status = 'open'
             DO UPDATE SET payload = EXCLUDED.payload,
                           message = EXCLUDED.message,
                           step_id = EXCLUDED.step_id,
                           priority = EXCLUDED.priority
             RETURNING {ACTION_COLUMNS}"
        ))
        .bind(action.id)
        .bind(action.request_id)
        .bind(action.step_id)
        .bind(action.action_type.to_string())
        .bind(action.priority)
        .bind(Value::Object(action.payload.clone()))
        .bind(&action.message)
        .bind(action.created_at)
        .fetch_one(&self.pool)
        .await?;

        action_from_row(&row)
    }

    async fn find_open_action(
        &self,
        request_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionRecord>, WorkflowError> {
        let row = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM request_actions
             WHERE request_id = $1 AND action_type = $2 AND status = 'open'"
        ))
        .bind(request_id)
        .bind(action_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(action_from_row).transpose()
    }

    async fn get_action(&self, action_id: Uuid) -> Result<Option<ActionRecord>, WorkflowError> {
        let row = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM request_actions WHERE id = $1"
        ))
        .bind(action_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(action_from_row).transpose()
    }

    async fn save_action(&self, action: &ActionRecord) -> Result<(), WorkflowError> {
        let result = sqlx::query(
            "UPDATE request_actions
             SET step_id = $2,
                 status = $3,
                 priority = $4,
                 payload = $5,
                 resolution = $6,
                 message = $7,
                 resolved_at = $8,
                 resolved_by = $9
             WHERE id = $1",
        )
        .bind(action.id)
        .bind(action.step_id)
        .bind(action.status.to_string())
        .bind(action.priority)
        .bind(Value::Object(action.payload.clone()))
        .bind(action.resolution.clone().map(Value::Object))
        .bind(&action.message)
        .bind(action.resolved_at)
        .bind(&action.resolved_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(format!("action {}", action.id)));
        }
        Ok(())
    }

    async fn list_open_actions(
        &self,
        action_type: Option<ActionType>,
        limit: i64,
    ) -> Result<Vec<ActionRecord>, WorkflowError> {
        let limit = limit.clamp(1, 200);
        let rows = match action_type {
            Some(kind) => {
                sqlx::query(&format!(
                    "SELECT {ACTION_COLUMNS} FROM request_actions
                     WHERE status = 'open' AND action_type = $1
                     ORDER BY priority DESC, created_at
                     LIMIT $2"
                ))
                .bind(kind.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ACTION_COLUMNS} FROM request_actions
                     WHERE status = 'open'
                     ORDER BY priority DESC, created_at
                     LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(action_from_row).collect()
    }

    async fn list_actions_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<ActionRecord>, WorkflowError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM request_actions
             WHERE request_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(action_from_row).collect()
    }

    async fn find_resolved_action(
        &self,
        request_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionRecord>, WorkflowError> {
        let row = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM request_actions
             WHERE request_id = $1 AND action_type = $2 AND status = 'done'
             ORDER BY resolved_at DESC NULLS LAST
             LIMIT 1"
        ))
        .bind(request_id)
        .bind(action_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(action_from_row).transpose()
    }
}

// ---------------------------------------------------------------------------
// RequestStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RequestStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<RequestRecord>, WorkflowError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM media_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn insert(&self, request: &RequestRecord) -> Result<(), WorkflowError> {
        sqlx::query(
            "INSERT INTO media_requests
                 (id, title, year, media_type, quality_preference, requested_by,
                  status, status_message, created_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(request.id)
        .bind(&request.title)
        .bind(request.year)
        .bind(request.media_type.to_string())
        .bind(request.quality_preference.to_string())
        .bind(&request.requested_by)
        .bind(request.status.to_string())
        .bind(&request.status_message)
        .bind(request.created_at)
        .bind(request.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        message: &str,
    ) -> Result<(), WorkflowError> {
        let result = sqlx::query(
            "UPDATE media_requests SET status = $2, status_message = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(format!("request {id}")));
        }
        Ok(())
    }

    async fn set_message(&self, id: Uuid, message: &str) -> Result<(), WorkflowError> {
        let result = sqlx::query("UPDATE media_requests SET status_message = $2 WHERE id = $1")
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(format!("request {id}")));
        }
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, message: &str) -> Result<(), WorkflowError> {
        let result = sqlx::query(
            "UPDATE media_requests
             SET status = 'completed', status_message = $2, completed_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(format!("request {id}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TransferStore
// ---------------------------------------------------------------------------

#[async_trait]
impl TransferStore for PgStore {
    async fn upsert(&self, transfer: &TransferRecord) -> Result<(), WorkflowError> {
        sqlx::query(
            "INSERT INTO transfers
                 (request_id, handle, name, size_bytes, progress, speed_bps, state, save_path, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
             ON CONFLICT (request_id)
             DO UPDATE SET handle = EXCLUDED.handle,
                           name = EXCLUDED.name,
                           size_bytes = EXCLUDED.size_bytes,
                           progress = EXCLUDED.progress,
                           speed_bps = EXCLUDED.speed_bps,
                           state = EXCLUDED.state,
                           save_path = EXCLUDED.save_path,
                           updated_at = now()",
        )
        .bind(transfer.request_id)
        .bind(&transfer.handle)
        .bind(&transfer.name)
        .bind(transfer.size_bytes)
        .bind(transfer.progress)
        .bind(transfer.speed_bps)
        .bind(transfer.state.to_string())
        .bind(&transfer.save_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<TransferRecord>, WorkflowError> {
        let row = sqlx::query(
            "SELECT request_id, handle, name, size_bytes, progress, speed_bps, state, save_path, updated_at
             FROM transfers WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn delete(&self, request_id: Uuid) -> Result<(), WorkflowError> {
        sqlx::query("DELETE FROM transfers WHERE request_id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
