//! Step error codes and the escalation table.
//!
//! The mapping from (step, error code) to a human-in-the-loop action is a
//! static lookup, kept explicit here rather than inferred at the call
//! sites. Codes without an entry are transient: the step fails, attempts
//! count up, and the outer scheduler re-invokes the pipeline.

use fetcharr_store::{ActionType, StepKey};

/// Step failure codes.
pub mod codes {
    /// Search returned zero candidates — needs a corrected query.
    pub const NO_RESULTS: &str = "NO_RESULTS";
    /// Search call errored or timed out.
    pub const SEARCH_FAILED: &str = "SEARCH_FAILED";
    /// Select found no usable candidates in the search artifacts.
    pub const NO_CANDIDATES: &str = "NO_CANDIDATES";
    /// Enqueueing the transfer failed.
    pub const ADD_FAILED: &str = "ADD_FAILED";
    /// The backend reported the transfer failed.
    pub const DOWNLOAD_FAILED: &str = "DOWNLOAD_FAILED";
    /// The transfer did not finish within the monitor's wall-clock cap.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Organizing the finished download failed — needs a rename decision.
    pub const RENAME_FAILED: &str = "RENAME_FAILED";
    /// Anything a stage did not anticipate.
    pub const UNEXPECTED: &str = "UNEXPECTED";
}

/// Escalating failures: (step, code) → (action type, priority).
pub fn escalation_for(step: StepKey, code: &str) -> Option<(ActionType, i32)> {
    match (step, code) {
        (StepKey::Search, codes::NO_RESULTS) => Some((ActionType::FixSearchQuery, 70)),
        (StepKey::Postprocess, codes::RENAME_FAILED) => Some((ActionType::ConfirmRename, 60)),
        _ => None,
    }
}

/// The step an action type unblocks when resolved. Used when an action
/// carries no step back-reference.
pub fn step_for_action(action_type: ActionType) -> Option<StepKey> {
    match action_type {
        ActionType::FixSearchQuery => Some(StepKey::Search),
        ActionType::PickCandidate => Some(StepKey::Select),
        ActionType::ConfirmRename => Some(StepKey::Postprocess),
        ActionType::MarkUnavailable => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_results_escalates_to_fix_search_query() {
        let (action, priority) = escalation_for(StepKey::Search, codes::NO_RESULTS).unwrap();
        assert_eq!(action, ActionType::FixSearchQuery);
        assert!(priority > 50);
    }

    #[test]
    fn transient_codes_do_not_escalate() {
        assert!(escalation_for(StepKey::Search, codes::SEARCH_FAILED).is_none());
        assert!(escalation_for(StepKey::DownloadAdd, codes::ADD_FAILED).is_none());
        assert!(escalation_for(StepKey::DownloadMonitor, codes::TIMEOUT).is_none());
        assert!(escalation_for(StepKey::DownloadMonitor, codes::DOWNLOAD_FAILED).is_none());
    }

    #[test]
    fn rename_failures_escalate_to_confirm_rename() {
        let (action, _) = escalation_for(StepKey::Postprocess, codes::RENAME_FAILED).unwrap();
        assert_eq!(action, ActionType::ConfirmRename);
    }
}
