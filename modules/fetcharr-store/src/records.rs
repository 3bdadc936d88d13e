//! Persistent record types for the request fulfillment pipeline.
//!
//! A request owns one `StepRecord` per pipeline stage and any number of
//! `ActionRecord`s (human-in-the-loop decisions). `TransferRecord` is the
//! ephemeral per-tick download state, kept off the step row so monitor
//! polling does not write-amplify it.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use fetcharr_common::{MediaRef, MediaType, QualityPreference, TransferState};

/// Storage bound for error and operator messages.
pub const MESSAGE_MAX_LEN: usize = 2000;

/// Truncate a message to the storage bound without splitting a char.
pub fn clamp_message(message: &str) -> String {
    message.chars().take(MESSAGE_MAX_LEN).collect()
}

// ---------------------------------------------------------------------------
// Step records
// ---------------------------------------------------------------------------

/// Pipeline step identifiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    Search,
    Select,
    DownloadAdd,
    DownloadMonitor,
    Postprocess,
    PlexScan,
}

impl StepKey {
    /// The fixed stage sequence driven by the orchestrator.
    pub const ORDER: [StepKey; 6] = [
        StepKey::Search,
        StepKey::Select,
        StepKey::DownloadAdd,
        StepKey::DownloadMonitor,
        StepKey::Postprocess,
        StepKey::PlexScan,
    ];

    /// 1-based position in the fixed sequence.
    pub fn order(&self) -> i32 {
        match self {
            StepKey::Search => 1,
            StepKey::Select => 2,
            StepKey::DownloadAdd => 3,
            StepKey::DownloadMonitor => 4,
            StepKey::Postprocess => 5,
            StepKey::PlexScan => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKey::Search => "search",
            StepKey::Select => "select",
            StepKey::DownloadAdd => "download_add",
            StepKey::DownloadMonitor => "download_monitor",
            StepKey::Postprocess => "postprocess",
            StepKey::PlexScan => "plex_scan",
        }
    }
}

impl std::fmt::Display for StepKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(StepKey::Search),
            "select" => Ok(StepKey::Select),
            "download_add" => Ok(StepKey::DownloadAdd),
            "download_monitor" => Ok(StepKey::DownloadMonitor),
            "postprocess" => Ok(StepKey::Postprocess),
            "plex_scan" => Ok(StepKey::PlexScan),
            other => Err(format!("unknown step key: {other}")),
        }
    }
}

/// Step execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// Halted awaiting an open action; untouched until it is resolved.
    Blocked,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "success" => Ok(StepStatus::Success),
            "failed" => Ok(StepStatus::Failed),
            "blocked" => Ok(StepStatus::Blocked),
            other => Err(format!("unknown step status: {other}")),
        }
    }
}

/// One pipeline stage of one request: execution state, timing, errors
/// and artifacts. At most one row exists per (request_id, step_key).
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub id: Uuid,
    pub request_id: Uuid,
    pub step_key: StepKey,
    pub step_order: i32,
    pub status: StepStatus,
    /// Incremented only on a real start, never on idempotent re-delivery.
    pub attempts: i32,
    pub max_attempts: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    /// Step outputs, merged incrementally across attempts.
    pub artifacts: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(request_id: Uuid, step_key: StepKey, max_attempts: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request_id,
            step_key,
            step_order: step_key.order(),
            status: StepStatus::Pending,
            attempts: 0,
            max_attempts,
            started_at: None,
            ended_at: None,
            last_error_code: None,
            last_error_message: None,
            artifacts: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge new artifacts over the existing map. Existing keys not named
    /// in `artifacts` survive; the map is never wholesale-replaced.
    pub fn merge_artifacts(&mut self, artifacts: Map<String, Value>) {
        for (key, value) in artifacts {
            self.artifacts.insert(key, value);
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

// ---------------------------------------------------------------------------
// Action records
// ---------------------------------------------------------------------------

/// Kinds of human-in-the-loop decisions the pipeline can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    FixSearchQuery,
    PickCandidate,
    ConfirmRename,
    MarkUnavailable,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::FixSearchQuery => "fix_search_query",
            ActionType::PickCandidate => "pick_candidate",
            ActionType::ConfirmRename => "confirm_rename",
            ActionType::MarkUnavailable => "mark_unavailable",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fix_search_query" => Ok(ActionType::FixSearchQuery),
            "pick_candidate" => Ok(ActionType::PickCandidate),
            "confirm_rename" => Ok(ActionType::ConfirmRename),
            "mark_unavailable" => Ok(ActionType::MarkUnavailable),
            other => Err(format!("unknown action type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Open,
    Done,
    Cancelled,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Open => "open",
            ActionStatus::Done => "done",
            ActionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ActionStatus::Open),
            "done" => Ok(ActionStatus::Done),
            "cancelled" => Ok(ActionStatus::Cancelled),
            other => Err(format!("unknown action status: {other}")),
        }
    }
}

/// A pending operator decision. At most one OPEN action exists per
/// (request_id, action_type); repeated escalations update it in place.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub id: Uuid,
    pub request_id: Uuid,
    /// Back-reference to the step that escalated, not ownership.
    pub step_id: Option<Uuid>,
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub priority: i32,
    /// Context the operator UI renders the decision from.
    pub payload: Map<String, Value>,
    /// Operator answer, filled when the action is resolved.
    pub resolution: Option<Map<String, Value>>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl ActionRecord {
    pub fn new(
        request_id: Uuid,
        action_type: ActionType,
        step_id: Option<Uuid>,
        payload: Map<String, Value>,
        message: Option<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            step_id,
            action_type,
            status: ActionStatus::Open,
            priority,
            payload,
            resolution: None,
            message,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Request records
// ---------------------------------------------------------------------------

/// Request lifecycle, as surfaced to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Searching,
    /// A step is blocked on an open action.
    AwaitingApproval,
    Downloading,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Searching => "searching",
            RequestStatus::AwaitingApproval => "awaiting_approval",
            RequestStatus::Downloading => "downloading",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Error => "error",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Error | RequestStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "searching" => Ok(RequestStatus::Searching),
            "awaiting_approval" => Ok(RequestStatus::AwaitingApproval),
            "downloading" => Ok(RequestStatus::Downloading),
            "processing" => Ok(RequestStatus::Processing),
            "completed" => Ok(RequestStatus::Completed),
            "error" => Ok(RequestStatus::Error),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// The aggregate root. Created by the API layer; mutated here as the
/// pipeline advances. Steps and actions cascade-delete with it.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: Uuid,
    pub title: String,
    pub year: Option<i32>,
    pub media_type: MediaType,
    pub quality_preference: QualityPreference,
    pub requested_by: Option<String>,
    pub status: RequestStatus,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RequestRecord {
    /// The media reference handed to collaborators.
    pub fn media_ref(&self) -> MediaRef {
        MediaRef {
            request_id: self.id,
            title: self.title.clone(),
            year: self.year,
            media_type: self.media_type,
            quality_preference: self.quality_preference,
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer records
// ---------------------------------------------------------------------------

/// In-flight download state, 1:1 with a request while the monitor runs.
/// Updated on every poll tick; the step row is not.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub request_id: Uuid,
    pub handle: String,
    pub name: String,
    pub size_bytes: i64,
    pub progress: f64,
    pub speed_bps: i64,
    pub state: TransferState,
    pub save_path: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_order_matches_fixed_sequence() {
        let orders: Vec<i32> = StepKey::ORDER.iter().map(|k| k.order()).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn step_key_round_trips_through_str() {
        for key in StepKey::ORDER {
            assert_eq!(key.as_str().parse::<StepKey>().unwrap(), key);
        }
    }

    #[test]
    fn merge_artifacts_keeps_existing_keys() {
        let mut step = StepRecord::new(Uuid::new_v4(), StepKey::Search, 3);
        let mut first = Map::new();
        first.insert("query".to_string(), json!("test movie 2024"));
        step.merge_artifacts(first);

        let mut second = Map::new();
        second.insert("result_count".to_string(), json!(3));
        step.merge_artifacts(second);

        assert_eq!(step.artifacts["query"], json!("test movie 2024"));
        assert_eq!(step.artifacts["result_count"], json!(3));
    }
}
