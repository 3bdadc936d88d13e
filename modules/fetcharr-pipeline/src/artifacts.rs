//! Artifact keys and typed accessors.
//!
//! Stages communicate across process restarts through step artifacts:
//! search persists its candidates, select its pick, download_add its
//! transfer handle, the monitor its save path. Each stage reads its
//! inputs back from the previous step's persisted artifacts, which is
//! what makes a pipeline pass re-entrant after a crash.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub mod keys {
    pub const QUERY: &str = "query";
    pub const RESULT_COUNT: &str = "result_count";
    pub const CANDIDATES: &str = "candidates";
    pub const SELECTED: &str = "selected";
    pub const HANDLE: &str = "handle";
    pub const CANDIDATE_NAME: &str = "candidate_name";
    pub const DOWNLOADED_PATH: &str = "downloaded_path";
    pub const FINAL_PATH: &str = "final_path";
    pub const RESCAN: &str = "rescan";

    // Resolution payload fields operators fill in.
    pub const NEW_QUERY: &str = "new_query";
    pub const CONFIRMED_NAME: &str = "confirmed_name";
}

/// Read a typed value out of an artifact map. Missing or malformed
/// entries both come back as `None`; the caller decides whether that is
/// a corrupted-state failure.
pub fn get<T: DeserializeOwned>(artifacts: &Map<String, Value>, key: &str) -> Option<T> {
    artifacts
        .get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

/// Coerce a `json!({...})` literal into an artifact map.
pub fn from_value(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_tolerates_missing_and_malformed() {
        let mut artifacts = Map::new();
        artifacts.insert("count".to_string(), json!("not a number"));

        assert_eq!(get::<u32>(&artifacts, "missing"), None);
        assert_eq!(get::<u32>(&artifacts, "count"), None);

        artifacts.insert("count".to_string(), json!(3));
        assert_eq!(get::<u32>(&artifacts, "count"), Some(3));
    }
}
