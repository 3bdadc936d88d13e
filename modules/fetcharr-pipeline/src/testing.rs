//! Test mocks for the pipeline.
//!
//! One mock per collaborator trait boundary:
//! - `MockTorrentSource` (TorrentSource) — query→candidates map, records queries
//! - `MockDownloadBackend` (DownloadBackend) — scripted status sequence
//! - `MockOrganizer` (FileOrganizer) — fixed outcome, records requests
//! - `MockLibraryIndex` (LibraryIndex) — success/failure switch, counts calls
//! - `RecordingNotifier` (Notifier) — records every event
//!
//! Plus fixtures for requests and candidates. Together with `MemoryStore`
//! the whole pipeline runs deterministically in-process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use fetcharr_common::{
    Candidate, MediaType, QualityPreference, TransferHandle, TransferState, TransferStatus,
};
use fetcharr_store::{ActionRecord, RequestRecord, RequestStatus};

use crate::notify::Notifier;
use crate::traits::{
    BackendError, DownloadBackend, FileOrganizer, LibraryIndex, OrganizeError, OrganizeRequest,
    SourceError, TorrentSource,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn movie_request(title: &str, year: i32) -> RequestRecord {
    RequestRecord {
        id: Uuid::new_v4(),
        title: title.to_string(),
        year: Some(year),
        media_type: MediaType::Movie,
        quality_preference: QualityPreference::Q1080p,
        requested_by: Some("tester".to_string()),
        status: RequestStatus::Pending,
        status_message: None,
        created_at: Utc::now(),
        completed_at: None,
    }
}

pub fn candidate(name: &str, seeders: i32, quality: &str) -> Candidate {
    Candidate {
        source_id: format!("src-{name}"),
        name: name.to_string(),
        size_bytes: 4_000_000_000,
        seeders,
        quality: Some(quality.to_string()),
        release_group: None,
        download_url: Some(format!("https://tracker.example/{name}.torrent")),
    }
}

pub fn status(state: TransferState, progress: f64, save_path: Option<&str>) -> TransferStatus {
    TransferStatus {
        state,
        progress,
        speed_bps: 2_500_000,
        save_path: save_path.map(String::from),
    }
}

// ---------------------------------------------------------------------------
// MockTorrentSource
// ---------------------------------------------------------------------------

/// Query→candidates source. Unregistered queries fall back to the default
/// result set. Records every query it sees.
#[derive(Default)]
pub struct MockTorrentSource {
    by_query: HashMap<String, Vec<Candidate>>,
    default: Vec<Candidate>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockTorrentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default results for any query without a specific registration.
    pub fn with_results(mut self, candidates: Vec<Candidate>) -> Self {
        self.default = candidates;
        self
    }

    pub fn on_query(mut self, query: &str, candidates: Vec<Candidate>) -> Self {
        self.by_query.insert(query.to_string(), candidates);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Every query this source has been asked, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("mock poisoned").clone()
    }
}

#[async_trait]
impl TorrentSource for MockTorrentSource {
    async fn search(
        &self,
        query: &str,
        _media_type: MediaType,
    ) -> Result<Vec<Candidate>, SourceError> {
        self.queries
            .lock()
            .expect("mock poisoned")
            .push(query.to_string());

        if self.fail {
            return Err(SourceError::Unavailable("mock source down".to_string()));
        }
        Ok(self
            .by_query
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockDownloadBackend
// ---------------------------------------------------------------------------

/// Scripted download backend. `status` walks the configured snapshots and
/// repeats the last one; with no snapshots it reports NotFound forever.
#[derive(Default)]
pub struct MockDownloadBackend {
    handle: String,
    enqueue_fails: bool,
    statuses: Vec<TransferStatus>,
    cursor: AtomicUsize,
}

impl MockDownloadBackend {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            ..Self::default()
        }
    }

    pub fn with_statuses(mut self, statuses: Vec<TransferStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn failing_enqueue(mut self) -> Self {
        self.enqueue_fails = true;
        self
    }
}

#[async_trait]
impl DownloadBackend for MockDownloadBackend {
    async fn enqueue(&self, _candidate: &Candidate) -> Result<TransferHandle, BackendError> {
        if self.enqueue_fails {
            return Err(BackendError::Unavailable("mock backend down".to_string()));
        }
        Ok(TransferHandle(self.handle.clone()))
    }

    async fn status(&self, handle: &TransferHandle) -> Result<TransferStatus, BackendError> {
        if self.statuses.is_empty() {
            return Err(BackendError::NotFound(handle.to_string()));
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let index = index.min(self.statuses.len() - 1);
        Ok(self.statuses[index].clone())
    }
}

// ---------------------------------------------------------------------------
// MockOrganizer
// ---------------------------------------------------------------------------

enum OrganizerScript {
    Succeed { final_path: String },
    Ambiguous { suggestions: Vec<String> },
    Fail { message: String },
}

/// Fixed-outcome organizer that records what it was asked to do. An
/// ambiguous script still succeeds when the request carries an operator
/// name override, the way a real organizer would.
pub struct MockOrganizer {
    script: OrganizerScript,
    requests: Mutex<Vec<OrganizeRequest>>,
}

impl MockOrganizer {
    pub fn succeeding(final_path: &str) -> Self {
        Self {
            script: OrganizerScript::Succeed {
                final_path: final_path.to_string(),
            },
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn ambiguous(suggestions: Vec<&str>) -> Self {
        Self {
            script: OrganizerScript::Ambiguous {
                suggestions: suggestions.into_iter().map(String::from).collect(),
            },
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            script: OrganizerScript::Fail {
                message: message.to_string(),
            },
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OrganizeRequest> {
        self.requests.lock().expect("mock poisoned").clone()
    }
}

#[async_trait]
impl FileOrganizer for MockOrganizer {
    async fn organize(&self, request: &OrganizeRequest) -> Result<String, OrganizeError> {
        self.requests
            .lock()
            .expect("mock poisoned")
            .push(request.clone());

        match &self.script {
            OrganizerScript::Succeed { final_path } => Ok(final_path.clone()),
            OrganizerScript::Ambiguous { suggestions } => match &request.name_override {
                Some(name) => Ok(format!("/library/{name}")),
                None => Err(OrganizeError::Ambiguous {
                    suggestions: suggestions.clone(),
                }),
            },
            OrganizerScript::Fail { message } => Err(OrganizeError::Failed(message.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// MockLibraryIndex
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockLibraryIndex {
    fail: bool,
    calls: AtomicUsize,
}

impl MockLibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LibraryIndex for MockLibraryIndex {
    async fn rescan(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("mock library unreachable");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Records every notification as a "kind:detail" line.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("mock poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn download_started(&self, _request: &RequestRecord, name: &str) -> anyhow::Result<()> {
        self.events
            .lock()
            .expect("mock poisoned")
            .push(format!("download_started:{name}"));
        Ok(())
    }

    async fn request_completed(
        &self,
        request: &RequestRecord,
        final_path: Option<&str>,
    ) -> anyhow::Result<()> {
        self.events.lock().expect("mock poisoned").push(format!(
            "request_completed:{}:{}",
            request.title,
            final_path.unwrap_or("-")
        ));
        Ok(())
    }

    async fn needs_attention(
        &self,
        _request: &RequestRecord,
        action: &ActionRecord,
    ) -> anyhow::Result<()> {
        self.events
            .lock()
            .expect("mock poisoned")
            .push(format!("needs_attention:{}", action.action_type));
        Ok(())
    }
}
