use std::env;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Notifications (optional; unset disables them)
    pub webhook_url: Option<String>,

    // Pipeline tuning
    pub poll_interval_secs: u64,
    pub monitor_timeout_hours: u64,
    pub call_timeout_secs: u64,
    pub max_attempts: i32,
    pub candidate_artifact_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            webhook_url: env::var("WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            poll_interval_secs: parsed_env("POLL_INTERVAL_SECS", 30),
            monitor_timeout_hours: parsed_env("MONITOR_TIMEOUT_HOURS", 24),
            call_timeout_secs: parsed_env("CALL_TIMEOUT_SECS", 30),
            max_attempts: parsed_env("MAX_ATTEMPTS", 3),
            candidate_artifact_limit: parsed_env("CANDIDATE_ARTIFACT_LIMIT", 10),
        }
    }

    /// Log the loaded configuration with secrets redacted.
    pub fn log_redacted(&self) {
        info!(
            database_url = %redact_url(&self.database_url),
            webhook = self.webhook_url.is_some(),
            poll_interval_secs = self.poll_interval_secs,
            monitor_timeout_hours = self.monitor_timeout_hours,
            call_timeout_secs = self.call_timeout_secs,
            max_attempts = self.max_attempts,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}

/// Strip userinfo from a connection URL for logging.
fn redact_url(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((_, host)) => format!("postgres://***@{host}"),
        None => url.to_string(),
    }
}
