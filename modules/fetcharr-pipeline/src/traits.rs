//! Collaborator contracts consumed by the pipeline.
//!
//! Every external service sits behind one of these traits, injected into
//! the orchestrator's constructor. Implementations live with the services
//! themselves; the pipeline ships only the deterministic selector fallback
//! and the notification backends.
//!
//! The traits are sized for deterministic testing: `testing` provides a
//! mock for each boundary, so the full pipeline runs in-process with no
//! network and no database.

use async_trait::async_trait;
use thiserror::Error;

use fetcharr_common::{Candidate, MediaRef, MediaType, QualityPreference, TransferHandle, TransferStatus};

// ---------------------------------------------------------------------------
// TorrentSource
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("search failed: {0}")]
    Failed(String),
}

/// Candidate search against a torrent index.
#[async_trait]
pub trait TorrentSource: Send + Sync {
    async fn search(
        &self,
        query: &str,
        media_type: MediaType,
    ) -> Result<Vec<Candidate>, SourceError>;
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Ranks candidates best-first. Primary implementations (LLM-backed
/// scoring) may fail; the orchestrator wraps whatever is injected in
/// `FallbackSelector`, so ranking never fails for non-empty input.
#[async_trait]
pub trait Selector: Send + Sync {
    async fn rank(
        &self,
        media: &MediaRef,
        candidates: &[Candidate],
        quality_preference: QualityPreference,
    ) -> anyhow::Result<Vec<Candidate>>;
}

// ---------------------------------------------------------------------------
// DownloadBackend
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("download backend unavailable: {0}")]
    Unavailable(String),

    #[error("transfer not found: {0}")]
    NotFound(String),
}

/// The transfer client (qBittorrent or compatible).
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Enqueue a download and return the backend's handle for it.
    async fn enqueue(&self, candidate: &Candidate) -> Result<TransferHandle, BackendError>;

    /// One status snapshot for an in-flight transfer.
    async fn status(&self, handle: &TransferHandle) -> Result<TransferStatus, BackendError>;
}

// ---------------------------------------------------------------------------
// FileOrganizer
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum OrganizeError {
    /// The organizer cannot pick a library name on its own. The
    /// suggestions feed the operator prompt.
    #[error("ambiguous rename: {suggestions:?}")]
    Ambiguous { suggestions: Vec<String> },

    #[error("organize failed: {0}")]
    Failed(String),
}

/// Inputs for placing a finished download into the library.
#[derive(Debug, Clone)]
pub struct OrganizeRequest {
    pub downloaded_path: String,
    pub media: MediaRef,
    /// Operator-confirmed name from a resolved confirm_rename action.
    pub name_override: Option<String>,
}

/// Renames and moves a finished download into the media library.
#[async_trait]
pub trait FileOrganizer: Send + Sync {
    /// Returns the final library path.
    async fn organize(&self, request: &OrganizeRequest) -> Result<String, OrganizeError>;
}

// ---------------------------------------------------------------------------
// LibraryIndex
// ---------------------------------------------------------------------------

/// The media library's index (Plex). Rescans are best-effort; a periodic
/// scan self-heals anything missed here.
#[async_trait]
pub trait LibraryIndex: Send + Sync {
    async fn rescan(&self) -> anyhow::Result<()>;
}
