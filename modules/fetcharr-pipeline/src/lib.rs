pub mod artifacts;
pub mod escalation;
pub mod inbox;
pub mod monitor;
pub mod notify;
pub mod orchestrator;
pub mod selector;
pub mod testing;
pub mod tracker;
pub mod traits;

pub use inbox::ActionInbox;
pub use monitor::{DownloadMonitor, MonitorVerdict};
pub use orchestrator::{PipelineConfig, PipelineDeps, PipelineOrchestrator, PipelineOutcome};
pub use selector::{FallbackSelector, RuleBasedSelector};
pub use tracker::{Escalation, StepTracker};
pub use traits::{
    BackendError, DownloadBackend, FileOrganizer, LibraryIndex, OrganizeError, OrganizeRequest,
    Selector, SourceError, TorrentSource,
};
