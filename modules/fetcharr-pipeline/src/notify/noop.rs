use async_trait::async_trait;

use fetcharr_store::{ActionRecord, RequestRecord};

use super::backend::Notifier;

/// No-op notification backend for tests and unconfigured deployments.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn download_started(&self, _request: &RequestRecord, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn request_completed(
        &self,
        _request: &RequestRecord,
        _final_path: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn needs_attention(
        &self,
        _request: &RequestRecord,
        _action: &ActionRecord,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
