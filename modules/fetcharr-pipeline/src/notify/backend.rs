use async_trait::async_trait;

use fetcharr_store::{ActionRecord, RequestRecord};

/// Pluggable notification backend. All sends are best-effort and
/// fire-and-forget: the pipeline logs failures and never blocks on them.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A transfer was enqueued for the request.
    async fn download_started(&self, request: &RequestRecord, name: &str) -> anyhow::Result<()>;

    /// The request finished end to end and is available in the library.
    async fn request_completed(
        &self,
        request: &RequestRecord,
        final_path: Option<&str>,
    ) -> anyhow::Result<()>;

    /// A step blocked on an operator decision.
    async fn needs_attention(
        &self,
        request: &RequestRecord,
        action: &ActionRecord,
    ) -> anyhow::Result<()>;
}
