//! Step lifecycle management.
//!
//! Every transition is idempotent with respect to duplicate delivery of
//! the same logical event: an outer supervisor may re-invoke the
//! orchestrator after a crash without knowing which calls already landed,
//! so a second `start` on a RUNNING step must not count a new attempt.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use fetcharr_store::{
    clamp_message, ActionType, StepKey, StepRecord, StepStatus, WorkflowError, WorkflowStore,
};

use crate::inbox::ActionInbox;

/// A request to open a human-in-the-loop action alongside a step failure.
#[derive(Debug, Clone)]
pub struct Escalation {
    pub action_type: ActionType,
    pub payload: Map<String, Value>,
    pub priority: i32,
}

pub struct StepTracker {
    store: Arc<dyn WorkflowStore>,
    inbox: ActionInbox,
    default_max_attempts: i32,
}

impl StepTracker {
    pub fn new(store: Arc<dyn WorkflowStore>, default_max_attempts: i32) -> Self {
        let inbox = ActionInbox::new(store.clone());
        Self {
            store,
            inbox,
            default_max_attempts,
        }
    }

    /// Get the existing step or create it PENDING. Idempotent.
    pub async fn get_or_create(
        &self,
        request_id: Uuid,
        step_key: StepKey,
    ) -> Result<StepRecord, WorkflowError> {
        self.store
            .upsert_step(request_id, step_key, self.default_max_attempts)
            .await
    }

    /// Mark a step RUNNING. No-op if it already is — a crashed pass being
    /// re-driven does not burn an attempt.
    pub async fn start(
        &self,
        request_id: Uuid,
        step_key: StepKey,
    ) -> Result<StepRecord, WorkflowError> {
        let mut step = self.get_or_create(request_id, step_key).await?;

        if step.status == StepStatus::Running {
            debug!(%request_id, step = %step_key, "Step already running");
            return Ok(step);
        }

        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now());
        step.ended_at = None;
        step.attempts += 1;
        step.last_error_code = None;
        step.last_error_message = None;
        self.store.save_step(&step).await?;

        info!(
            %request_id,
            step = %step_key,
            attempt = step.attempts,
            "Started step"
        );
        Ok(step)
    }

    /// Mark a step SUCCESS, merging any produced artifacts.
    pub async fn complete(
        &self,
        request_id: Uuid,
        step_key: StepKey,
        artifacts: Option<Map<String, Value>>,
    ) -> Result<StepRecord, WorkflowError> {
        let mut step = self.get_or_create(request_id, step_key).await?;

        step.status = StepStatus::Success;
        step.ended_at = Some(Utc::now());
        if let Some(artifacts) = artifacts {
            step.merge_artifacts(artifacts);
        }
        self.store.save_step(&step).await?;

        info!(%request_id, step = %step_key, "Completed step");
        Ok(step)
    }

    /// Mark a step FAILED, or BLOCKED when `escalation` opens an action.
    pub async fn fail(
        &self,
        request_id: Uuid,
        step_key: StepKey,
        error_code: &str,
        error_message: &str,
        artifacts: Option<Map<String, Value>>,
        escalation: Option<Escalation>,
    ) -> Result<StepRecord, WorkflowError> {
        let mut step = self.get_or_create(request_id, step_key).await?;

        step.status = StepStatus::Failed;
        step.ended_at = Some(Utc::now());
        step.last_error_code = Some(error_code.to_string());
        step.last_error_message = Some(clamp_message(error_message));
        if let Some(artifacts) = artifacts {
            step.merge_artifacts(artifacts);
        }
        self.store.save_step(&step).await?;

        warn!(
            %request_id,
            step = %step_key,
            code = error_code,
            attempt = step.attempts,
            "Step failed"
        );

        if let Some(escalation) = escalation {
            self.inbox
                .create(
                    request_id,
                    escalation.action_type,
                    Some(step.id),
                    escalation.payload,
                    Some(error_message.to_string()),
                    escalation.priority,
                )
                .await?;

            step.status = StepStatus::Blocked;
            self.store.save_step(&step).await?;
        }

        Ok(step)
    }

    /// Reset a failed/blocked step to PENDING for retry. The attempts
    /// counter survives so the next `start` increments from the right
    /// baseline.
    pub async fn reset_for_retry(
        &self,
        request_id: Uuid,
        step_key: StepKey,
    ) -> Result<StepRecord, WorkflowError> {
        let mut step = self.get_or_create(request_id, step_key).await?;

        step.status = StepStatus::Pending;
        step.last_error_code = None;
        step.last_error_message = None;
        step.started_at = None;
        step.ended_at = None;
        self.store.save_step(&step).await?;

        info!(
            %request_id,
            step = %step_key,
            next_attempt = step.attempts + 1,
            "Reset step for retry"
        );
        Ok(step)
    }

    /// All steps for a request in pipeline order.
    pub async fn list(&self, request_id: Uuid) -> Result<Vec<StepRecord>, WorkflowError> {
        self.store.list_steps(request_id).await
    }
}
