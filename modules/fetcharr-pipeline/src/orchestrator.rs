//! The pipeline orchestrator.
//!
//! Drives the fixed stage sequence for one request:
//! search → select → download_add → download_monitor → postprocess → plex_scan.
//!
//! `process_request` is re-entrant: it derives the next action purely
//! from persisted step statuses, so the caller may re-invoke it after a
//! crash, on a scheduler tick, or after an operator resolves an action.
//! Steps already SUCCESS are skipped, PENDING/FAILED steps are
//! (re)started, and a BLOCKED step halts the pass until its action is
//! resolved.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use fetcharr_common::{Candidate, Config, TransferHandle, TransferState};
use fetcharr_store::{
    ActionRecord, ActionStatus, ActionType, RequestRecord, RequestStatus, RequestStore, StepKey,
    StepRecord, StepStatus, TransferRecord, TransferStore, WorkflowError, WorkflowStore,
};

use crate::artifacts::{self, keys};
use crate::escalation::{codes, escalation_for, step_for_action};
use crate::inbox::ActionInbox;
use crate::monitor::{DownloadMonitor, MonitorVerdict};
use crate::notify::Notifier;
use crate::selector::FallbackSelector;
use crate::tracker::{Escalation, StepTracker};
use crate::traits::{
    DownloadBackend, FileOrganizer, LibraryIndex, OrganizeError, OrganizeRequest, Selector,
    TorrentSource,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Monitor poll cadence.
    pub poll_interval: Duration,
    /// Wall-clock cap for one transfer.
    pub monitor_timeout: Duration,
    /// Per-call cap for every collaborator call.
    pub call_timeout: Duration,
    /// How many top candidates the search step persists for select.
    pub candidate_artifact_limit: usize,
    pub max_attempts: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            monitor_timeout: Duration::from_secs(24 * 3600),
            call_timeout: Duration::from_secs(30),
            candidate_artifact_limit: 10,
            max_attempts: 3,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            monitor_timeout: Duration::from_secs(config.monitor_timeout_hours * 3600),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            candidate_artifact_limit: config.candidate_artifact_limit,
            max_attempts: config.max_attempts,
        }
    }
}

/// Immutable dependencies injected into the orchestrator. No globals:
/// every collaborator arrives through here.
pub struct PipelineDeps {
    pub requests: Arc<dyn RequestStore>,
    pub workflow: Arc<dyn WorkflowStore>,
    pub transfers: Arc<dyn TransferStore>,
    pub source: Arc<dyn TorrentSource>,
    pub selector: Arc<dyn Selector>,
    pub backend: Arc<dyn DownloadBackend>,
    pub organizer: Arc<dyn FileOrganizer>,
    pub library: Arc<dyn LibraryIndex>,
    pub notifier: Arc<dyn Notifier>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What one orchestrator pass concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// All six stages are SUCCESS and the request is completed.
    Completed,
    /// A stage escalated; the request awaits an operator decision.
    Blocked {
        step: StepKey,
        action_type: ActionType,
    },
    /// A stage failed transiently; the outer scheduler may re-invoke.
    Failed { step: StepKey, code: String },
    /// A failed stage ran out of attempts; the request surfaced as ERROR.
    Exhausted { step: StepKey },
    /// The request was cancelled externally; the pass aborted cleanly.
    Cancelled,
    NotFound,
}

enum StageResult {
    Done,
    Failed { code: String },
    Blocked { action_type: ActionType },
    Cancelled,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct PipelineOrchestrator {
    requests: Arc<dyn RequestStore>,
    workflow: Arc<dyn WorkflowStore>,
    transfers: Arc<dyn TransferStore>,
    source: Arc<dyn TorrentSource>,
    backend: Arc<dyn DownloadBackend>,
    organizer: Arc<dyn FileOrganizer>,
    library: Arc<dyn LibraryIndex>,
    notifier: Arc<dyn Notifier>,
    tracker: StepTracker,
    inbox: ActionInbox,
    selector: FallbackSelector,
    monitor: DownloadMonitor,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        let tracker = StepTracker::new(deps.workflow.clone(), config.max_attempts);
        let inbox = ActionInbox::new(deps.workflow.clone());
        let selector = FallbackSelector::new(deps.selector);
        let monitor = DownloadMonitor::new(
            deps.backend.clone(),
            deps.requests.clone(),
            deps.transfers.clone(),
            config.poll_interval,
            config.monitor_timeout,
            config.call_timeout,
        );
        Self {
            requests: deps.requests,
            workflow: deps.workflow,
            transfers: deps.transfers,
            source: deps.source,
            backend: deps.backend,
            organizer: deps.organizer,
            library: deps.library,
            notifier: deps.notifier,
            tracker,
            inbox,
            selector,
            monitor,
            config,
        }
    }

    pub fn tracker(&self) -> &StepTracker {
        &self.tracker
    }

    pub fn inbox(&self) -> &ActionInbox {
        &self.inbox
    }

    /// Drive the request as far as it will go. Re-entrant: every decision
    /// is derived from persisted state.
    pub async fn process_request(&self, request_id: Uuid) -> Result<PipelineOutcome, WorkflowError> {
        let Some(request) = self.requests.get(request_id).await? else {
            warn!(%request_id, "Request not found");
            return Ok(PipelineOutcome::NotFound);
        };

        if request.status == RequestStatus::Cancelled {
            return Ok(PipelineOutcome::Cancelled);
        }
        if request.status == RequestStatus::Completed {
            return Ok(PipelineOutcome::Completed);
        }

        info!(
            %request_id,
            title = %request.title,
            status = %request.status,
            "Processing request"
        );

        for step_key in StepKey::ORDER {
            // Fresh read per stage: cancellation may land mid-pass.
            let Some(request) = self.requests.get(request_id).await? else {
                return Ok(PipelineOutcome::NotFound);
            };
            if request.status == RequestStatus::Cancelled {
                info!(%request_id, step = %step_key, "Request cancelled, aborting pass");
                return Ok(PipelineOutcome::Cancelled);
            }

            let step = self.tracker.get_or_create(request_id, step_key).await?;
            match step.status {
                StepStatus::Success => continue,
                StepStatus::Blocked => {
                    let action_type = self.blocked_action_type(&step).await?;
                    info!(%request_id, step = %step_key, "Step blocked awaiting operator action");
                    return Ok(PipelineOutcome::Blocked {
                        step: step_key,
                        action_type,
                    });
                }
                StepStatus::Failed if step.attempts_exhausted() => {
                    warn!(
                        %request_id,
                        step = %step_key,
                        attempts = step.attempts,
                        "Attempts exhausted"
                    );
                    self.requests
                        .set_status(
                            request_id,
                            RequestStatus::Error,
                            "Request failed after repeated attempts",
                        )
                        .await?;
                    return Ok(PipelineOutcome::Exhausted { step: step_key });
                }
                StepStatus::Pending | StepStatus::Running | StepStatus::Failed => {}
            }

            match self.run_stage(&request, step_key).await? {
                StageResult::Done => {}
                StageResult::Failed { code } => {
                    return Ok(PipelineOutcome::Failed {
                        step: step_key,
                        code,
                    });
                }
                StageResult::Blocked { action_type } => {
                    self.requests
                        .set_status(
                            request_id,
                            RequestStatus::AwaitingApproval,
                            "Awaiting operator decision",
                        )
                        .await?;
                    self.spawn_needs_attention(request_id, action_type).await;
                    return Ok(PipelineOutcome::Blocked {
                        step: step_key,
                        action_type,
                    });
                }
                StageResult::Cancelled => return Ok(PipelineOutcome::Cancelled),
            }
        }

        // Every stage is SUCCESS: finish the request.
        let final_path = self.final_path(request_id).await?;
        self.transfers.delete(request_id).await?;
        self.requests
            .mark_completed(request_id, "Available in the library")
            .await?;
        info!(%request_id, "Request completed");

        if let Some(request) = self.requests.get(request_id).await? {
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                if let Err(err) = notifier
                    .request_completed(&request, final_path.as_deref())
                    .await
                {
                    warn!(error = %err, "Completion notification failed");
                }
            });
        }

        Ok(PipelineOutcome::Completed)
    }

    /// Entry point for the operator API: record the decision, reset the
    /// blocked step, and re-drive the pipeline. The retried stage reads
    /// its corrected input from the resolution payload.
    pub async fn resolve_action(
        &self,
        action_id: Uuid,
        resolver: &str,
        resolution: Map<String, Value>,
    ) -> Result<PipelineOutcome, WorkflowError> {
        let action = self.inbox.resolve(action_id, resolver, resolution).await?;

        if action.action_type == ActionType::MarkUnavailable {
            self.requests
                .set_status(
                    action.request_id,
                    RequestStatus::Cancelled,
                    "Marked unavailable by operator",
                )
                .await?;
            return Ok(PipelineOutcome::Cancelled);
        }

        if let Some(step_key) = self.step_for(&action).await? {
            self.tracker
                .reset_for_retry(action.request_id, step_key)
                .await?;
        }

        self.process_request(action.request_id).await
    }

    /// Dismiss an action without retrying anything.
    pub async fn cancel_action(
        &self,
        action_id: Uuid,
        resolver: &str,
    ) -> Result<ActionRecord, WorkflowError> {
        self.inbox.cancel(action_id, resolver).await
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn run_stage(
        &self,
        request: &RequestRecord,
        step_key: StepKey,
    ) -> Result<StageResult, WorkflowError> {
        self.tracker.start(request.id, step_key).await?;

        match step_key {
            StepKey::Search => self.stage_search(request).await,
            StepKey::Select => self.stage_select(request).await,
            StepKey::DownloadAdd => self.stage_download_add(request).await,
            StepKey::DownloadMonitor => self.stage_download_monitor(request).await,
            StepKey::Postprocess => self.stage_postprocess(request).await,
            StepKey::PlexScan => self.stage_plex_scan(request).await,
        }
    }

    async fn stage_search(&self, request: &RequestRecord) -> Result<StageResult, WorkflowError> {
        let media = request.media_ref();

        // A resolved fix_search_query action overrides the default query.
        let query = match self
            .inbox
            .latest_resolution(request.id, ActionType::FixSearchQuery)
            .await?
        {
            Some(resolution) => artifacts::get::<String>(&resolution, keys::NEW_QUERY)
                .unwrap_or_else(|| media.search_query()),
            None => media.search_query(),
        };

        self.requests
            .set_status(
                request.id,
                RequestStatus::Searching,
                &format!("Searching for \"{query}\""),
            )
            .await?;

        let mut query_artifact = Map::new();
        query_artifact.insert(keys::QUERY.to_string(), json!(query));

        let candidates = match timeout(
            self.config.call_timeout,
            self.source.search(&query, media.media_type),
        )
        .await
        {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(err)) => {
                return self
                    .fail_transient(
                        request.id,
                        StepKey::Search,
                        codes::SEARCH_FAILED,
                        &err.to_string(),
                        Some(query_artifact),
                    )
                    .await;
            }
            Err(_) => {
                return self
                    .fail_transient(
                        request.id,
                        StepKey::Search,
                        codes::SEARCH_FAILED,
                        "search timed out",
                        Some(query_artifact),
                    )
                    .await;
            }
        };

        if candidates.is_empty() {
            let payload = artifacts::from_value(json!({
                "query": query,
                "media_type": media.media_type,
            }));
            return self
                .fail_escalating(
                    request.id,
                    StepKey::Search,
                    codes::NO_RESULTS,
                    &format!("No candidates found for \"{query}\""),
                    Some(query_artifact),
                    payload,
                )
                .await;
        }

        info!(
            request_id = %request.id,
            count = candidates.len(),
            "Search returned candidates"
        );

        let top: Vec<&Candidate> = candidates
            .iter()
            .take(self.config.candidate_artifact_limit)
            .collect();
        let mut arts = query_artifact;
        arts.insert(keys::RESULT_COUNT.to_string(), json!(candidates.len()));
        arts.insert(keys::CANDIDATES.to_string(), json!(top));

        self.tracker
            .complete(request.id, StepKey::Search, Some(arts))
            .await?;
        Ok(StageResult::Done)
    }

    async fn stage_select(&self, request: &RequestRecord) -> Result<StageResult, WorkflowError> {
        let candidates: Vec<Candidate> = match self
            .workflow
            .get_step(request.id, StepKey::Search)
            .await?
        {
            Some(step) => artifacts::get(&step.artifacts, keys::CANDIDATES).unwrap_or_default(),
            None => Vec::new(),
        };

        if candidates.is_empty() {
            return self
                .fail_transient(
                    request.id,
                    StepKey::Select,
                    codes::NO_CANDIDATES,
                    "no candidates in search artifacts",
                    None,
                )
                .await;
        }

        let media = request.media_ref();
        let ranked = self
            .selector
            .rank(&media, &candidates, media.quality_preference)
            .await;

        let Some(best) = ranked.into_iter().next() else {
            return self
                .fail_transient(
                    request.id,
                    StepKey::Select,
                    codes::NO_CANDIDATES,
                    "ranking produced no candidates",
                    None,
                )
                .await;
        };

        info!(
            request_id = %request.id,
            selected = %best.name,
            seeders = best.seeders,
            "Selected candidate"
        );

        let mut arts = Map::new();
        arts.insert(keys::SELECTED.to_string(), json!(best));
        self.tracker
            .complete(request.id, StepKey::Select, Some(arts))
            .await?;
        Ok(StageResult::Done)
    }

    async fn stage_download_add(
        &self,
        request: &RequestRecord,
    ) -> Result<StageResult, WorkflowError> {
        let selected: Option<Candidate> = match self
            .workflow
            .get_step(request.id, StepKey::Select)
            .await?
        {
            Some(step) => artifacts::get(&step.artifacts, keys::SELECTED),
            None => None,
        };
        let Some(candidate) = selected else {
            return self
                .fail_transient(
                    request.id,
                    StepKey::DownloadAdd,
                    codes::UNEXPECTED,
                    "no selected candidate in artifacts",
                    None,
                )
                .await;
        };

        self.requests
            .set_status(
                request.id,
                RequestStatus::Downloading,
                &format!("Downloading {}", candidate.name),
            )
            .await?;

        let handle = match timeout(self.config.call_timeout, self.backend.enqueue(&candidate)).await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => {
                return self
                    .fail_transient(
                        request.id,
                        StepKey::DownloadAdd,
                        codes::ADD_FAILED,
                        &err.to_string(),
                        None,
                    )
                    .await;
            }
            Err(_) => {
                return self
                    .fail_transient(
                        request.id,
                        StepKey::DownloadAdd,
                        codes::ADD_FAILED,
                        "enqueue timed out",
                        None,
                    )
                    .await;
            }
        };

        self.transfers
            .upsert(&TransferRecord {
                request_id: request.id,
                handle: handle.to_string(),
                name: candidate.name.clone(),
                size_bytes: candidate.size_bytes,
                progress: 0.0,
                speed_bps: 0,
                state: TransferState::Queued,
                save_path: None,
                updated_at: Utc::now(),
            })
            .await?;

        info!(
            request_id = %request.id,
            handle = %handle,
            name = %candidate.name,
            size_gb = %format!("{:.2}", candidate.size_gb()),
            "Transfer enqueued"
        );

        {
            let notifier = self.notifier.clone();
            let request = request.clone();
            let name = candidate.name.clone();
            tokio::spawn(async move {
                if let Err(err) = notifier.download_started(&request, &name).await {
                    warn!(error = %err, "Download-started notification failed");
                }
            });
        }

        let mut arts = Map::new();
        arts.insert(keys::HANDLE.to_string(), json!(handle.as_str()));
        arts.insert(keys::CANDIDATE_NAME.to_string(), json!(candidate.name));
        self.tracker
            .complete(request.id, StepKey::DownloadAdd, Some(arts))
            .await?;
        Ok(StageResult::Done)
    }

    async fn stage_download_monitor(
        &self,
        request: &RequestRecord,
    ) -> Result<StageResult, WorkflowError> {
        let add_step = self.workflow.get_step(request.id, StepKey::DownloadAdd).await?;
        let handle: Option<String> = add_step
            .as_ref()
            .and_then(|step| artifacts::get(&step.artifacts, keys::HANDLE));
        let Some(handle) = handle else {
            return self
                .fail_transient(
                    request.id,
                    StepKey::DownloadMonitor,
                    codes::UNEXPECTED,
                    "no transfer handle in artifacts",
                    None,
                )
                .await;
        };
        let name: String = add_step
            .as_ref()
            .and_then(|step| artifacts::get(&step.artifacts, keys::CANDIDATE_NAME))
            .unwrap_or_default();

        let handle = TransferHandle(handle);
        match self.monitor.run(request.id, &handle, &name).await? {
            MonitorVerdict::Completed {
                save_path: Some(path),
            } => {
                let mut arts = Map::new();
                arts.insert(keys::DOWNLOADED_PATH.to_string(), json!(path));
                self.tracker
                    .complete(request.id, StepKey::DownloadMonitor, Some(arts))
                    .await?;
                Ok(StageResult::Done)
            }
            MonitorVerdict::Completed { save_path: None } => {
                self.fail_transient(
                    request.id,
                    StepKey::DownloadMonitor,
                    codes::DOWNLOAD_FAILED,
                    "backend reported completion without a save path",
                    None,
                )
                .await
            }
            MonitorVerdict::Failed => {
                self.fail_transient(
                    request.id,
                    StepKey::DownloadMonitor,
                    codes::DOWNLOAD_FAILED,
                    "backend reported the transfer failed",
                    None,
                )
                .await
            }
            MonitorVerdict::TimedOut => {
                self.fail_transient(
                    request.id,
                    StepKey::DownloadMonitor,
                    codes::TIMEOUT,
                    &format!(
                        "transfer did not finish within {}s",
                        self.config.monitor_timeout.as_secs()
                    ),
                    None,
                )
                .await
            }
            MonitorVerdict::Cancelled => Ok(StageResult::Cancelled),
        }
    }

    async fn stage_postprocess(
        &self,
        request: &RequestRecord,
    ) -> Result<StageResult, WorkflowError> {
        let downloaded_path: Option<String> = match self
            .workflow
            .get_step(request.id, StepKey::DownloadMonitor)
            .await?
        {
            Some(step) => artifacts::get(&step.artifacts, keys::DOWNLOADED_PATH),
            None => None,
        };
        let Some(downloaded_path) = downloaded_path else {
            return self
                .fail_transient(
                    request.id,
                    StepKey::Postprocess,
                    codes::UNEXPECTED,
                    "no downloaded path in artifacts",
                    None,
                )
                .await;
        };

        self.requests
            .set_status(request.id, RequestStatus::Processing, "Organizing files")
            .await?;

        // An operator may already have confirmed a name for this request.
        let name_override = self
            .inbox
            .latest_resolution(request.id, ActionType::ConfirmRename)
            .await?
            .and_then(|resolution| artifacts::get::<String>(&resolution, keys::CONFIRMED_NAME));

        let organize = OrganizeRequest {
            downloaded_path: downloaded_path.clone(),
            media: request.media_ref(),
            name_override,
        };

        match timeout(self.config.call_timeout, self.organizer.organize(&organize)).await {
            Ok(Ok(final_path)) => {
                info!(request_id = %request.id, final_path = %final_path, "Moved to library");
                let mut arts = Map::new();
                arts.insert(keys::FINAL_PATH.to_string(), json!(final_path));
                self.tracker
                    .complete(request.id, StepKey::Postprocess, Some(arts))
                    .await?;
                Ok(StageResult::Done)
            }
            Ok(Err(OrganizeError::Ambiguous { suggestions })) => {
                let payload = artifacts::from_value(json!({
                    "original_path": downloaded_path,
                    "suggested_name": suggestions.first(),
                    "alternatives": suggestions,
                }));
                self.fail_escalating(
                    request.id,
                    StepKey::Postprocess,
                    codes::RENAME_FAILED,
                    "Cannot pick a library name automatically",
                    None,
                    payload,
                )
                .await
            }
            Ok(Err(OrganizeError::Failed(message))) => {
                let payload = artifacts::from_value(json!({
                    "original_path": downloaded_path,
                    "suggested_name": null,
                    "alternatives": [],
                }));
                self.fail_escalating(
                    request.id,
                    StepKey::Postprocess,
                    codes::RENAME_FAILED,
                    &message,
                    None,
                    payload,
                )
                .await
            }
            Err(_) => {
                self.fail_transient(
                    request.id,
                    StepKey::Postprocess,
                    codes::UNEXPECTED,
                    "organize timed out",
                    None,
                )
                .await
            }
        }
    }

    async fn stage_plex_scan(&self, request: &RequestRecord) -> Result<StageResult, WorkflowError> {
        // Best-effort: a failed rescan never blocks completion, a later
        // periodic scan picks the file up.
        let rescan = match timeout(self.config.call_timeout, self.library.rescan()).await {
            Ok(Ok(())) => "ok",
            Ok(Err(err)) => {
                warn!(request_id = %request.id, error = %err, "Library rescan failed, continuing");
                "failed"
            }
            Err(_) => {
                warn!(request_id = %request.id, "Library rescan timed out, continuing");
                "failed"
            }
        };

        let mut arts = Map::new();
        arts.insert(keys::RESCAN.to_string(), json!(rescan));
        self.tracker
            .complete(request.id, StepKey::PlexScan, Some(arts))
            .await?;
        Ok(StageResult::Done)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn fail_transient(
        &self,
        request_id: Uuid,
        step_key: StepKey,
        code: &str,
        message: &str,
        arts: Option<Map<String, Value>>,
    ) -> Result<StageResult, WorkflowError> {
        self.tracker
            .fail(request_id, step_key, code, message, arts, None)
            .await?;
        self.requests
            .set_message(request_id, &format!("{code}: {message}"))
            .await?;
        Ok(StageResult::Failed {
            code: code.to_string(),
        })
    }

    async fn fail_escalating(
        &self,
        request_id: Uuid,
        step_key: StepKey,
        code: &str,
        message: &str,
        arts: Option<Map<String, Value>>,
        payload: Map<String, Value>,
    ) -> Result<StageResult, WorkflowError> {
        match escalation_for(step_key, code) {
            Some((action_type, priority)) => {
                let escalation = Escalation {
                    action_type,
                    payload,
                    priority,
                };
                self.tracker
                    .fail(request_id, step_key, code, message, arts, Some(escalation))
                    .await?;
                Ok(StageResult::Blocked { action_type })
            }
            None => self.fail_transient(request_id, step_key, code, message, arts).await,
        }
    }

    /// The action type a blocked step is waiting on.
    async fn blocked_action_type(&self, step: &StepRecord) -> Result<ActionType, WorkflowError> {
        let actions = self.inbox.list_for_request(step.request_id).await?;
        if let Some(action) = actions
            .iter()
            .find(|a| a.status == ActionStatus::Open && a.step_id == Some(step.id))
        {
            return Ok(action.action_type);
        }

        // Back-reference gone (step row recreated): derive from the code.
        if let Some(code) = step.last_error_code.as_deref() {
            if let Some((action_type, _)) = escalation_for(step.step_key, code) {
                return Ok(action_type);
            }
        }

        actions
            .iter()
            .find(|a| a.status == ActionStatus::Open)
            .map(|a| a.action_type)
            .ok_or_else(|| {
                WorkflowError::InvalidState(format!(
                    "step {} is blocked without an open action",
                    step.step_key
                ))
            })
    }

    /// Which step a resolved action unblocks.
    async fn step_for(&self, action: &ActionRecord) -> Result<Option<StepKey>, WorkflowError> {
        if let Some(step_id) = action.step_id {
            let steps = self.tracker.list(action.request_id).await?;
            if let Some(step) = steps.iter().find(|s| s.id == step_id) {
                return Ok(Some(step.step_key));
            }
        }
        Ok(step_for_action(action.action_type))
    }

    async fn final_path(&self, request_id: Uuid) -> Result<Option<String>, WorkflowError> {
        Ok(self
            .workflow
            .get_step(request_id, StepKey::Postprocess)
            .await?
            .and_then(|step| artifacts::get(&step.artifacts, keys::FINAL_PATH)))
    }

    async fn spawn_needs_attention(&self, request_id: Uuid, action_type: ActionType) {
        let request = match self.requests.get(request_id).await {
            Ok(Some(request)) => request,
            _ => return,
        };
        let action = match self.workflow.find_open_action(request_id, action_type).await {
            Ok(Some(action)) => action,
            _ => return,
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.needs_attention(&request, &action).await {
                warn!(error = %err, "Needs-attention notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_config_maps_env_config() {
        let config = Config {
            database_url: "postgres://user:secret@db/fetcharr".to_string(),
            webhook_url: None,
            poll_interval_secs: 15,
            monitor_timeout_hours: 2,
            call_timeout_secs: 10,
            max_attempts: 5,
            candidate_artifact_limit: 7,
        };

        let pipeline = PipelineConfig::from_config(&config);
        assert_eq!(pipeline.poll_interval, Duration::from_secs(15));
        assert_eq!(pipeline.monitor_timeout, Duration::from_secs(7200));
        assert_eq!(pipeline.call_timeout, Duration::from_secs(10));
        assert_eq!(pipeline.max_attempts, 5);
        assert_eq!(pipeline.candidate_artifact_limit, 7);
    }
}
