//! Human-in-the-loop action management.
//!
//! Creation is idempotent per (request, action type): a step retried and
//! failing again for the same root cause updates the existing open action
//! instead of storming the operator queue. Priority ordering lets
//! operators triage systemic issues first.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use fetcharr_store::{
    clamp_message, ActionRecord, ActionStatus, ActionType, WorkflowError, WorkflowStore,
};

#[derive(Clone)]
pub struct ActionInbox {
    store: Arc<dyn WorkflowStore>,
}

impl ActionInbox {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Open an action, or refresh the payload/message/step reference of
    /// the already-open action of the same type for this request.
    pub async fn create(
        &self,
        request_id: Uuid,
        action_type: ActionType,
        step_id: Option<Uuid>,
        payload: Map<String, Value>,
        message: Option<String>,
        priority: i32,
    ) -> Result<ActionRecord, WorkflowError> {
        let candidate = ActionRecord::new(
            request_id,
            action_type,
            step_id,
            payload,
            message.map(|m| clamp_message(&m)),
            priority,
        );
        let action = self.store.upsert_open_action(&candidate).await?;

        if action.id == candidate.id {
            info!(%request_id, action = %action_type, "Created action");
        } else {
            info!(%request_id, action = %action_type, "Updated existing open action");
        }
        Ok(action)
    }

    /// Record the operator's decision: OPEN → DONE with resolution data.
    pub async fn resolve(
        &self,
        action_id: Uuid,
        resolver: &str,
        resolution: Map<String, Value>,
    ) -> Result<ActionRecord, WorkflowError> {
        let mut action = self
            .store
            .get_action(action_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("action {action_id}")))?;

        if action.status != ActionStatus::Open {
            return Err(WorkflowError::InvalidState(format!(
                "action {action_id} is {}, not open",
                action.status
            )));
        }

        action.status = ActionStatus::Done;
        action.resolved_at = Some(Utc::now());
        action.resolved_by = Some(resolver.to_string());
        action.resolution = Some(resolution);
        self.store.save_action(&action).await?;

        info!(action_id = %action_id, resolver, "Resolved action");
        Ok(action)
    }

    /// Dismiss an action without acting on it: OPEN → CANCELLED.
    pub async fn cancel(
        &self,
        action_id: Uuid,
        resolver: &str,
    ) -> Result<ActionRecord, WorkflowError> {
        let mut action = self
            .store
            .get_action(action_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("action {action_id}")))?;

        if action.status != ActionStatus::Open {
            return Err(WorkflowError::InvalidState(format!(
                "action {action_id} is {}, not open",
                action.status
            )));
        }

        action.status = ActionStatus::Cancelled;
        action.resolved_at = Some(Utc::now());
        action.resolved_by = Some(resolver.to_string());
        self.store.save_action(&action).await?;

        info!(action_id = %action_id, resolver, "Cancelled action");
        Ok(action)
    }

    pub async fn get(&self, action_id: Uuid) -> Result<Option<ActionRecord>, WorkflowError> {
        self.store.get_action(action_id).await
    }

    /// Open actions, highest priority first.
    pub async fn list_open(
        &self,
        action_type: Option<ActionType>,
        limit: i64,
    ) -> Result<Vec<ActionRecord>, WorkflowError> {
        self.store.list_open_actions(action_type, limit).await
    }

    /// All actions for a request, newest first.
    pub async fn list_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<ActionRecord>, WorkflowError> {
        self.store.list_actions_for_request(request_id).await
    }

    /// The resolution payload of the most recently resolved action of the
    /// given type, if any. Retrying stages read corrected inputs from it.
    pub async fn latest_resolution(
        &self,
        request_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<Map<String, Value>>, WorkflowError> {
        let action = self
            .store
            .find_resolved_action(request_id, action_type)
            .await?;
        Ok(action.and_then(|a| a.resolution))
    }
}
