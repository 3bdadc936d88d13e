use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Media ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Series,
    Anime,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Movie => write!(f, "movie"),
            MediaType::Series => write!(f, "series"),
            MediaType::Anime => write!(f, "anime"),
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "series" => Ok(MediaType::Series),
            "anime" => Ok(MediaType::Anime),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// Reference to the media a request is about. The field set all
/// collaborators agree on — search builds queries from it, the selector
/// ranks against it, the organizer names files after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    pub request_id: Uuid,
    pub title: String,
    pub year: Option<i32>,
    pub media_type: MediaType,
    pub quality_preference: QualityPreference,
}

impl MediaRef {
    /// Default search query: title plus year when known.
    pub fn search_query(&self) -> String {
        match self.year {
            Some(year) => format!("{} {}", self.title, year),
            None => self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreference {
    #[serde(rename = "720p")]
    Q720p,
    #[serde(rename = "1080p")]
    Q1080p,
    #[serde(rename = "4k")]
    Q4k,
}

impl QualityPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreference::Q720p => "720p",
            QualityPreference::Q1080p => "1080p",
            QualityPreference::Q4k => "4K",
        }
    }
}

impl Default for QualityPreference {
    fn default() -> Self {
        QualityPreference::Q1080p
    }
}

impl std::fmt::Display for QualityPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QualityPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "720p" => Ok(QualityPreference::Q720p),
            "1080p" => Ok(QualityPreference::Q1080p),
            "4k" | "4K" => Ok(QualityPreference::Q4k),
            other => Err(format!("unknown quality preference: {other}")),
        }
    }
}

// --- Candidates ---

/// A ranked download option returned by search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifier on the source site, used to fetch the download URL.
    pub source_id: String,
    pub name: String,
    pub size_bytes: i64,
    pub seeders: i32,
    /// Detected quality label (720p, 1080p, 4K), if any.
    pub quality: Option<String>,
    pub release_group: Option<String>,
    pub download_url: Option<String>,
}

impl Candidate {
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

// --- Transfers ---

/// Opaque handle to an in-flight transfer on the download backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferHandle(pub String);

impl TransferHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferState::Queued => write!(f, "queued"),
            TransferState::Downloading => write!(f, "downloading"),
            TransferState::Completed => write!(f, "completed"),
            TransferState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TransferState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TransferState::Queued),
            "downloading" => Ok(TransferState::Downloading),
            "completed" => Ok(TransferState::Completed),
            "failed" => Ok(TransferState::Failed),
            other => Err(format!("unknown transfer state: {other}")),
        }
    }
}

/// One status snapshot from the download backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferStatus {
    pub state: TransferState,
    /// Completion fraction in 0.0..=1.0.
    pub progress: f64,
    pub speed_bps: i64,
    /// Where the backend is writing the payload, once known.
    pub save_path: Option<String>,
}
