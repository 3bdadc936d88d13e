//! Store traits — the persistence seam between the pipeline and its
//! backing database.
//!
//! Two implementations exist: `PgStore` (Postgres, production) and
//! `MemoryStore` (in-process, tests and embedding). Both enforce the two
//! uniqueness invariants: one step row per (request_id, step_key), and
//! one OPEN action per (request_id, action_type). That is what makes
//! concurrent orchestrator passes for the same request safe without an
//! application-level lock.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::records::{
    ActionRecord, ActionType, RequestRecord, RequestStatus, StepKey, StepRecord, TransferRecord,
};

/// Persistence for workflow steps and human-in-the-loop actions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Get-or-create the step row for (request_id, step_key). Two
    /// concurrent callers observe the same single row.
    async fn upsert_step(
        &self,
        request_id: Uuid,
        step_key: StepKey,
        max_attempts: i32,
    ) -> Result<StepRecord, WorkflowError>;

    async fn get_step(
        &self,
        request_id: Uuid,
        step_key: StepKey,
    ) -> Result<Option<StepRecord>, WorkflowError>;

    /// Persist a mutated step record (full-row update).
    async fn save_step(&self, step: &StepRecord) -> Result<(), WorkflowError>;

    /// All steps for a request, ordered by step_order.
    async fn list_steps(&self, request_id: Uuid) -> Result<Vec<StepRecord>, WorkflowError>;

    /// Insert an OPEN action, or update the existing OPEN action of the
    /// same (request_id, action_type) in place. Returns the surviving row.
    async fn upsert_open_action(
        &self,
        action: &ActionRecord,
    ) -> Result<ActionRecord, WorkflowError>;

    async fn find_open_action(
        &self,
        request_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionRecord>, WorkflowError>;

    async fn get_action(&self, action_id: Uuid) -> Result<Option<ActionRecord>, WorkflowError>;

    /// Persist a mutated action record (full-row update).
    async fn save_action(&self, action: &ActionRecord) -> Result<(), WorkflowError>;

    /// Open actions, highest priority first, oldest first within a
    /// priority band.
    async fn list_open_actions(
        &self,
        action_type: Option<ActionType>,
        limit: i64,
    ) -> Result<Vec<ActionRecord>, WorkflowError>;

    /// All actions for a request, newest first.
    async fn list_actions_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<ActionRecord>, WorkflowError>;

    /// The most recently resolved DONE action of the given type, if any.
    /// Retrying stages read corrected inputs from its resolution.
    async fn find_resolved_action(
        &self,
        request_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionRecord>, WorkflowError>;
}

/// Read/update access to the request aggregate. Creation is owned by the
/// API layer; the pipeline only advances status and completion.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<RequestRecord>, WorkflowError>;

    async fn insert(&self, request: &RequestRecord) -> Result<(), WorkflowError>;

    async fn set_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        message: &str,
    ) -> Result<(), WorkflowError>;

    /// Update the user-visible message without touching the status.
    async fn set_message(&self, id: Uuid, message: &str) -> Result<(), WorkflowError>;

    /// Terminal success: status completed, completed_at stamped.
    async fn mark_completed(&self, id: Uuid, message: &str) -> Result<(), WorkflowError>;
}

/// Per-tick download state. Kept separate from steps so the monitor can
/// update progress every poll without touching the step row.
#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn upsert(&self, transfer: &TransferRecord) -> Result<(), WorkflowError>;

    async fn get(&self, request_id: Uuid) -> Result<Option<TransferRecord>, WorkflowError>;

    async fn delete(&self, request_id: Uuid) -> Result<(), WorkflowError>;
}
