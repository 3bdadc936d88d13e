//! End-to-end orchestrator scenarios over the in-memory store and mock
//! collaborators. No network, no database.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use fetcharr_common::TransferState;
use fetcharr_pipeline::testing::{
    candidate, movie_request, status, MockDownloadBackend, MockLibraryIndex, MockOrganizer,
    MockTorrentSource, RecordingNotifier,
};
use fetcharr_pipeline::{
    PipelineConfig, PipelineDeps, PipelineOrchestrator, PipelineOutcome, RuleBasedSelector,
};
use fetcharr_store::{
    ActionStatus, ActionType, MemoryStore, RequestRecord, RequestStatus, StepKey, StepStatus,
};
use fetcharr_store::{RequestStore, WorkflowStore};

struct Harness {
    store: Arc<MemoryStore>,
    source: Arc<MockTorrentSource>,
    organizer: Arc<MockOrganizer>,
    library: Arc<MockLibraryIndex>,
    notifier: Arc<RecordingNotifier>,
    pipeline: PipelineOrchestrator,
}

impl Harness {
    fn new(
        source: MockTorrentSource,
        backend: MockDownloadBackend,
        organizer: MockOrganizer,
        library: MockLibraryIndex,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(source);
        let backend = Arc::new(backend);
        let organizer = Arc::new(organizer);
        let library = Arc::new(library);
        let notifier = Arc::new(RecordingNotifier::new());

        let deps = PipelineDeps {
            requests: store.clone(),
            workflow: store.clone(),
            transfers: store.clone(),
            source: source.clone(),
            selector: Arc::new(RuleBasedSelector::new()),
            backend: backend.clone(),
            organizer: organizer.clone(),
            library: library.clone(),
            notifier: notifier.clone(),
        };
        let config = PipelineConfig {
            poll_interval: Duration::from_millis(5),
            monitor_timeout: Duration::from_millis(250),
            call_timeout: Duration::from_secs(2),
            candidate_artifact_limit: 10,
            max_attempts: 3,
        };
        let pipeline = PipelineOrchestrator::new(deps, config);

        Self {
            store,
            source,
            organizer,
            library,
            notifier,
            pipeline,
        }
    }

    async fn seed(&self, request: &RequestRecord) -> Uuid {
        self.store.insert(request).await.unwrap();
        request.id
    }

    async fn request(&self, id: Uuid) -> RequestRecord {
        RequestStore::get(self.store.as_ref(), id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn step_status(&self, id: Uuid, key: StepKey) -> Option<StepStatus> {
        self.store
            .get_step(id, key)
            .await
            .unwrap()
            .map(|s| s.status)
    }
}

fn happy_backend() -> MockDownloadBackend {
    MockDownloadBackend::new("hash-1").with_statuses(vec![
        status(TransferState::Downloading, 0.5, None),
        status(
            TransferState::Completed,
            1.0,
            Some("/downloads/Test.Movie.2024.1080p"),
        ),
    ])
}

fn three_candidates() -> Vec<fetcharr_common::Candidate> {
    vec![
        candidate("Test.Movie.2024.720p.WEB", 40, "720p"),
        candidate("Test.Movie.2024.1080p.WEB.x265", 60, "1080p"),
        candidate("Test.Movie.2024.1080p.CAM", 3, "1080p"),
    ]
}

// ---------------------------------------------------------------------------
// Scenario A: zero search results escalate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_results_block_search_with_one_open_action() {
    let harness = Harness::new(
        MockTorrentSource::new(),
        happy_backend(),
        MockOrganizer::succeeding("/library/Test Movie (2024)"),
        MockLibraryIndex::new(),
    );
    let id = harness.seed(&movie_request("Test Movie", 2024)).await;

    let outcome = harness.pipeline.process_request(id).await.unwrap();
    assert_eq!(
        outcome,
        PipelineOutcome::Blocked {
            step: StepKey::Search,
            action_type: ActionType::FixSearchQuery,
        }
    );

    assert_eq!(
        harness.step_status(id, StepKey::Search).await,
        Some(StepStatus::Blocked)
    );
    // The pass halted before later stages existed.
    assert_eq!(harness.step_status(id, StepKey::DownloadAdd).await, None);

    let open = harness
        .store
        .list_open_actions(Some(ActionType::FixSearchQuery), 50)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].payload["query"], json!("Test Movie 2024"));

    assert_eq!(
        harness.request(id).await.status,
        RequestStatus::AwaitingApproval
    );

    // Re-driving while blocked neither duplicates the action nor runs the stage.
    let again = harness.pipeline.process_request(id).await.unwrap();
    assert!(matches!(again, PipelineOutcome::Blocked { .. }));
    assert_eq!(
        harness
            .store
            .list_open_actions(Some(ActionType::FixSearchQuery), 50)
            .await
            .unwrap()
            .len(),
        1
    );
}

// ---------------------------------------------------------------------------
// Scenario B: full happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_completes_all_six_steps() {
    let harness = Harness::new(
        MockTorrentSource::new().with_results(three_candidates()),
        happy_backend(),
        MockOrganizer::succeeding("/library/Test Movie (2024)/Test Movie (2024).mkv"),
        MockLibraryIndex::new(),
    );
    let id = harness.seed(&movie_request("Test Movie", 2024)).await;

    let outcome = harness.pipeline.process_request(id).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed);

    for key in StepKey::ORDER {
        assert_eq!(
            harness.step_status(id, key).await,
            Some(StepStatus::Success),
            "step {key} should be success"
        );
    }

    let request = harness.request(id).await;
    assert_eq!(request.status, RequestStatus::Completed);
    assert!(request.completed_at.is_some());

    // The rule-based selector picked the healthy 1080p x265 encode.
    let select = harness
        .store
        .get_step(id, StepKey::Select)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        select.artifacts["selected"]["name"],
        json!("Test.Movie.2024.1080p.WEB.x265")
    );

    assert_eq!(harness.library.calls(), 1);

    // Fire-and-forget notifications land shortly after.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = harness.notifier.events();
    assert!(events
        .iter()
        .any(|e| e.starts_with("download_started:Test.Movie.2024.1080p.WEB.x265")));
    assert!(events.iter().any(|e| e.starts_with("request_completed:")));
}

// ---------------------------------------------------------------------------
// Scenario C: monitor timeout is transient, then exhausts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitor_timeout_fails_without_action_then_exhausts() {
    let harness = Harness::new(
        MockTorrentSource::new().with_results(three_candidates()),
        MockDownloadBackend::new("hash-1")
            .with_statuses(vec![status(TransferState::Downloading, 0.1, None)]),
        MockOrganizer::succeeding("/library/Test Movie (2024)"),
        MockLibraryIndex::new(),
    );
    let id = harness.seed(&movie_request("Test Movie", 2024)).await;

    let outcome = harness.pipeline.process_request(id).await.unwrap();
    assert_eq!(
        outcome,
        PipelineOutcome::Failed {
            step: StepKey::DownloadMonitor,
            code: "TIMEOUT".to_string(),
        }
    );

    let step = harness
        .store
        .get_step(id, StepKey::DownloadMonitor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.last_error_code.as_deref(), Some("TIMEOUT"));
    assert!(harness.store.list_open_actions(None, 50).await.unwrap().is_empty());

    // The scheduler re-invokes until attempts run out.
    for _ in 0..2 {
        let retried = harness.pipeline.process_request(id).await.unwrap();
        assert!(matches!(retried, PipelineOutcome::Failed { .. }));
    }
    let exhausted = harness.pipeline.process_request(id).await.unwrap();
    assert_eq!(
        exhausted,
        PipelineOutcome::Exhausted {
            step: StepKey::DownloadMonitor,
        }
    );
    assert_eq!(harness.request(id).await.status, RequestStatus::Error);
}

// ---------------------------------------------------------------------------
// Scenario D: resolved fix_search_query drives the retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolved_query_fix_reruns_search_with_corrected_query() {
    let harness = Harness::new(
        MockTorrentSource::new()
            .on_query("Test Movie 2024", Vec::new())
            .on_query("The Test Movie 2024", three_candidates()),
        happy_backend(),
        MockOrganizer::succeeding("/library/The Test Movie (2024)"),
        MockLibraryIndex::new(),
    );
    let id = harness.seed(&movie_request("Test Movie", 2024)).await;

    let outcome = harness.pipeline.process_request(id).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Blocked { .. }));

    let action = harness
        .store
        .list_open_actions(Some(ActionType::FixSearchQuery), 1)
        .await
        .unwrap()
        .remove(0);

    let resolution = json!({"new_query": "The Test Movie 2024"})
        .as_object()
        .cloned()
        .unwrap_or_default();
    let outcome = harness
        .pipeline
        .resolve_action(action.id, "admin", resolution)
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed);

    // The retry used the corrected query, not the original title.
    assert_eq!(
        harness.source.queries(),
        vec!["Test Movie 2024".to_string(), "The Test Movie 2024".to_string()]
    );

    let search = harness
        .store
        .get_step(id, StepKey::Search)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(search.artifacts["query"], json!("The Test Movie 2024"));
    assert_eq!(search.attempts, 2);

    let resolved = harness.store.get_action(action.id).await.unwrap().unwrap();
    assert_eq!(resolved.status, ActionStatus::Done);
}

// ---------------------------------------------------------------------------
// Ambiguous rename escalates, confirmation unblocks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ambiguous_rename_escalates_and_confirmation_unblocks() {
    let harness = Harness::new(
        MockTorrentSource::new().with_results(three_candidates()),
        happy_backend(),
        MockOrganizer::ambiguous(vec!["Test Movie (2024)", "Test Movie (1994)"]),
        MockLibraryIndex::new(),
    );
    let id = harness.seed(&movie_request("Test Movie", 2024)).await;

    let outcome = harness.pipeline.process_request(id).await.unwrap();
    assert_eq!(
        outcome,
        PipelineOutcome::Blocked {
            step: StepKey::Postprocess,
            action_type: ActionType::ConfirmRename,
        }
    );

    let action = harness
        .store
        .list_open_actions(Some(ActionType::ConfirmRename), 1)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(
        action.payload["alternatives"],
        json!(["Test Movie (2024)", "Test Movie (1994)"])
    );
    assert_eq!(
        action.payload["original_path"],
        json!("/downloads/Test.Movie.2024.1080p")
    );

    let resolution = json!({"confirmed_name": "Test Movie (2024)"})
        .as_object()
        .cloned()
        .unwrap_or_default();
    let outcome = harness
        .pipeline
        .resolve_action(action.id, "admin", resolution)
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed);

    // The retried organize call carried the confirmed name.
    let calls = harness.organizer.requests();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].name_override, None);
    assert_eq!(calls[1].name_override.as_deref(), Some("Test Movie (2024)"));

    let postprocess = harness
        .store
        .get_step(id, StepKey::Postprocess)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        postprocess.artifacts["final_path"],
        json!("/library/Test Movie (2024)")
    );
}

// ---------------------------------------------------------------------------
// Library rescan is best-effort
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_rescan_does_not_block_completion() {
    let harness = Harness::new(
        MockTorrentSource::new().with_results(three_candidates()),
        happy_backend(),
        MockOrganizer::succeeding("/library/Test Movie (2024)"),
        MockLibraryIndex::failing(),
    );
    let id = harness.seed(&movie_request("Test Movie", 2024)).await;

    let outcome = harness.pipeline.process_request(id).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed);
    assert_eq!(harness.library.calls(), 1);

    let scan = harness
        .store
        .get_step(id, StepKey::PlexScan)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scan.status, StepStatus::Success);
    assert_eq!(scan.artifacts["rescan"], json!("failed"));
}

// ---------------------------------------------------------------------------
// Cancellation aborts without failing steps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_request_aborts_pass_cleanly() {
    let harness = Harness::new(
        MockTorrentSource::new().with_results(three_candidates()),
        happy_backend(),
        MockOrganizer::succeeding("/library/Test Movie (2024)"),
        MockLibraryIndex::new(),
    );
    let mut request = movie_request("Test Movie", 2024);
    request.status = RequestStatus::Cancelled;
    let id = harness.seed(&request).await;

    let outcome = harness.pipeline.process_request(id).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Cancelled);

    // Nothing ran, nothing failed.
    assert_eq!(harness.step_status(id, StepKey::Search).await, None);
    assert!(harness.source.queries().is_empty());
}

// ---------------------------------------------------------------------------
// Transient add failure does not escalate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_failure_is_transient() {
    let harness = Harness::new(
        MockTorrentSource::new().with_results(three_candidates()),
        MockDownloadBackend::new("hash-1").failing_enqueue(),
        MockOrganizer::succeeding("/library/Test Movie (2024)"),
        MockLibraryIndex::new(),
    );
    let id = harness.seed(&movie_request("Test Movie", 2024)).await;

    let outcome = harness.pipeline.process_request(id).await.unwrap();
    assert_eq!(
        outcome,
        PipelineOutcome::Failed {
            step: StepKey::DownloadAdd,
            code: "ADD_FAILED".to_string(),
        }
    );
    assert!(harness.store.list_open_actions(None, 50).await.unwrap().is_empty());

    let request = harness.request(id).await;
    assert_eq!(request.status, RequestStatus::Downloading);
    assert!(request
        .status_message
        .as_deref()
        .unwrap_or_default()
        .starts_with("ADD_FAILED"));
}
