//! In-memory store implementation.
//!
//! Backs the test suites and small embedded deployments. Enforces the
//! same uniqueness invariants as the Postgres implementation so tests
//! exercise real store semantics, not a lenient fake.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::records::{
    ActionRecord, ActionStatus, ActionType, RequestRecord, RequestStatus, StepKey, StepRecord,
    TransferRecord,
};
use crate::traits::{RequestStore, TransferStore, WorkflowStore};

#[derive(Default)]
struct Inner {
    steps: HashMap<(Uuid, StepKey), StepRecord>,
    actions: HashMap<Uuid, ActionRecord>,
    requests: HashMap<Uuid, RequestRecord>,
    transfers: HashMap<Uuid, TransferRecord>,
}

/// Mutex-guarded maps behind the store traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn upsert_step(
        &self,
        request_id: Uuid,
        step_key: StepKey,
        max_attempts: i32,
    ) -> Result<StepRecord, WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let step = inner
            .steps
            .entry((request_id, step_key))
            .or_insert_with(|| StepRecord::new(request_id, step_key, max_attempts));
        Ok(step.clone())
    }

    async fn get_step(
        &self,
        request_id: Uuid,
        step_key: StepKey,
    ) -> Result<Option<StepRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.steps.get(&(request_id, step_key)).cloned())
    }

    async fn save_step(&self, step: &StepRecord) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let key = (step.request_id, step.step_key);
        if !inner.steps.contains_key(&key) {
            return Err(WorkflowError::NotFound(format!(
                "workflow step {}",
                step.step_key
            )));
        }
        let mut saved = step.clone();
        saved.updated_at = Utc::now();
        inner.steps.insert(key, saved);
        Ok(())
    }

    async fn list_steps(&self, request_id: Uuid) -> Result<Vec<StepRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut steps: Vec<StepRecord> = inner
            .steps
            .values()
            .filter(|s| s.request_id == request_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_order);
        Ok(steps)
    }

    async fn upsert_open_action(
        &self,
        action: &ActionRecord,
    ) -> Result<ActionRecord, WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let existing_id = inner
            .actions
            .values()
            .find(|a| {
                a.request_id == action.request_id
                    && a.action_type == action.action_type
                    && a.status == ActionStatus::Open
            })
            .map(|a| a.id);

        match existing_id {
            Some(id) => {
                let existing = inner
                    .actions
                    .get_mut(&id)
                    .expect("open action disappeared under lock");
                existing.payload = action.payload.clone();
                existing.message = action.message.clone();
                existing.step_id = action.step_id;
                existing.priority = action.priority;
                Ok(existing.clone())
            }
            None => {
                inner.actions.insert(action.id, action.clone());
                Ok(action.clone())
            }
        }
    }

    async fn find_open_action(
        &self,
        request_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .actions
            .values()
            .find(|a| {
                a.request_id == request_id
                    && a.action_type == action_type
                    && a.status == ActionStatus::Open
            })
            .cloned())
    }

    async fn get_action(&self, action_id: Uuid) -> Result<Option<ActionRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.actions.get(&action_id).cloned())
    }

    async fn save_action(&self, action: &ActionRecord) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        if !inner.actions.contains_key(&action.id) {
            return Err(WorkflowError::NotFound(format!("action {}", action.id)));
        }
        inner.actions.insert(action.id, action.clone());
        Ok(())
    }

    async fn list_open_actions(
        &self,
        action_type: Option<ActionType>,
        limit: i64,
    ) -> Result<Vec<ActionRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut actions: Vec<ActionRecord> = inner
            .actions
            .values()
            .filter(|a| a.status == ActionStatus::Open)
            .filter(|a| action_type.map_or(true, |t| a.action_type == t))
            .cloned()
            .collect();
        actions.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        actions.truncate(limit.max(0) as usize);
        Ok(actions)
    }

    async fn list_actions_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<ActionRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut actions: Vec<ActionRecord> = inner
            .actions
            .values()
            .filter(|a| a.request_id == request_id)
            .cloned()
            .collect();
        actions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(actions)
    }

    async fn find_resolved_action(
        &self,
        request_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .actions
            .values()
            .filter(|a| {
                a.request_id == request_id
                    && a.action_type == action_type
                    && a.status == ActionStatus::Done
            })
            .max_by_key(|a| a.resolved_at)
            .cloned())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<RequestRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.requests.get(&id).cloned())
    }

    async fn insert(&self, request: &RequestRecord) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        message: &str,
    ) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::NotFound(format!("request {id}")))?;
        request.status = status;
        request.status_message = Some(message.to_string());
        Ok(())
    }

    async fn set_message(&self, id: Uuid, message: &str) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::NotFound(format!("request {id}")))?;
        request.status_message = Some(message.to_string());
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, message: &str) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::NotFound(format!("request {id}")))?;
        request.status = RequestStatus::Completed;
        request.status_message = Some(message.to_string());
        request.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn upsert(&self, transfer: &TransferRecord) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.transfers.insert(transfer.request_id, transfer.clone());
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<TransferRecord>, WorkflowError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.transfers.get(&request_id).cloned())
    }

    async fn delete(&self, request_id: Uuid) -> Result<(), WorkflowError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.transfers.remove(&request_id);
        Ok(())
    }
}
