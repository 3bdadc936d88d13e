use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use fetcharr_store::{ActionRecord, RequestRecord};

use super::backend::Notifier;

const COLOR_INFO: u32 = 0x3498db;
const COLOR_SUCCESS: u32 = 0x2ecc71;
const COLOR_WARNING: u32 = 0xf39c12;

/// Discord-style incoming webhook notification backend.
pub struct WebhookNotifier {
    webhook_url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    /// Build from `WEBHOOK_URL`, or `None` when unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("WEBHOOK_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .map(Self::new)
    }

    async fn post_embed(
        &self,
        title: &str,
        description: String,
        color: u32,
        fields: serde_json::Value,
    ) -> anyhow::Result<()> {
        let payload = json!({
            "embeds": [{
                "title": title,
                "description": description,
                "color": color,
                "fields": fields,
            }]
        });

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Webhook returned non-success");
            anyhow::bail!("webhook returned {status}");
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn download_started(&self, request: &RequestRecord, name: &str) -> anyhow::Result<()> {
        self.post_embed(
            "Download started",
            format!("**{}**\n{name}", request.title),
            COLOR_INFO,
            json!([
                {"name": "Type", "value": request.media_type.to_string(), "inline": true},
            ]),
        )
        .await
    }

    async fn request_completed(
        &self,
        request: &RequestRecord,
        final_path: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut fields = vec![json!(
            {"name": "Type", "value": request.media_type.to_string(), "inline": true}
        )];
        if let Some(path) = final_path {
            fields.push(json!({"name": "Location", "value": path, "inline": false}));
        }
        let requested_by = request.requested_by.as_deref().unwrap_or("unknown");

        self.post_embed(
            "Request completed",
            format!("**{}**\nRequested by **{requested_by}**", request.title),
            COLOR_SUCCESS,
            serde_json::Value::Array(fields),
        )
        .await
    }

    async fn needs_attention(
        &self,
        request: &RequestRecord,
        action: &ActionRecord,
    ) -> anyhow::Result<()> {
        let message = action.message.as_deref().unwrap_or("Operator input needed");
        self.post_embed(
            "Action required",
            format!("**{}**\n{message}", request.title),
            COLOR_WARNING,
            json!([
                {"name": "Action", "value": action.action_type.to_string(), "inline": true},
                {"name": "Priority", "value": action.priority.to_string(), "inline": true},
            ]),
        )
        .await
    }
}
