//! Bounded polling loop for in-flight transfers.
//!
//! Each tick updates only the Transfer record — progress changes every
//! 30 seconds for up to a day, and none of that belongs on the step row.
//! The loop holds no state the pipeline cannot rebuild: the handle comes
//! from persisted artifacts, so a crashed monitor resumes on the next
//! orchestrator pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use fetcharr_common::{TransferHandle, TransferState};
use fetcharr_store::{RequestStatus, RequestStore, TransferRecord, TransferStore, WorkflowError};

use crate::traits::DownloadBackend;

/// Terminal outcome of one monitoring run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorVerdict {
    /// The backend reports the transfer finished.
    Completed { save_path: Option<String> },
    /// The backend reports the transfer failed.
    Failed,
    /// The wall-clock cap elapsed first.
    TimedOut,
    /// The request was cancelled externally mid-transfer.
    Cancelled,
}

pub struct DownloadMonitor {
    backend: Arc<dyn DownloadBackend>,
    requests: Arc<dyn RequestStore>,
    transfers: Arc<dyn TransferStore>,
    poll_interval: Duration,
    monitor_timeout: Duration,
    call_timeout: Duration,
}

impl DownloadMonitor {
    pub fn new(
        backend: Arc<dyn DownloadBackend>,
        requests: Arc<dyn RequestStore>,
        transfers: Arc<dyn TransferStore>,
        poll_interval: Duration,
        monitor_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            requests,
            transfers,
            poll_interval,
            monitor_timeout,
            call_timeout,
        }
    }

    /// Poll the backend until the transfer completes, fails, or the
    /// wall-clock cap elapses. Suspends cooperatively between ticks so
    /// other requests' orchestrators keep running.
    pub async fn run(
        &self,
        request_id: Uuid,
        handle: &TransferHandle,
        name: &str,
    ) -> Result<MonitorVerdict, WorkflowError> {
        let deadline = Instant::now() + self.monitor_timeout;
        info!(%request_id, handle = %handle, "Monitoring transfer");

        loop {
            sleep(self.poll_interval).await;

            if Instant::now() >= deadline {
                warn!(%request_id, handle = %handle, "Transfer timed out");
                return Ok(MonitorVerdict::TimedOut);
            }

            // Honor external cancellation between ticks.
            if let Some(request) = self.requests.get(request_id).await? {
                if request.status == RequestStatus::Cancelled {
                    info!(%request_id, "Request cancelled mid-transfer");
                    return Ok(MonitorVerdict::Cancelled);
                }
            }

            let status = match timeout(self.call_timeout, self.backend.status(handle)).await {
                Ok(Ok(status)) => status,
                Ok(Err(err)) => {
                    // Transient: the transfer may not be registered yet,
                    // or the backend is briefly unreachable.
                    debug!(%request_id, handle = %handle, error = %err, "Status check failed, will retry");
                    continue;
                }
                Err(_) => {
                    debug!(%request_id, handle = %handle, "Status check timed out, will retry");
                    continue;
                }
            };

            self.record_tick(request_id, handle, name, &status).await?;

            match status.state {
                TransferState::Completed => {
                    info!(%request_id, handle = %handle, "Transfer complete");
                    return Ok(MonitorVerdict::Completed {
                        save_path: status.save_path,
                    });
                }
                TransferState::Failed => {
                    warn!(%request_id, handle = %handle, "Transfer failed");
                    return Ok(MonitorVerdict::Failed);
                }
                TransferState::Queued | TransferState::Downloading => {}
            }
        }
    }

    /// Upsert the transfer row with this tick's snapshot.
    async fn record_tick(
        &self,
        request_id: Uuid,
        handle: &TransferHandle,
        name: &str,
        status: &fetcharr_common::TransferStatus,
    ) -> Result<(), WorkflowError> {
        let existing = self.transfers.get(request_id).await?;
        let record = TransferRecord {
            request_id,
            handle: handle.to_string(),
            name: existing
                .as_ref()
                .map(|t| t.name.clone())
                .unwrap_or_else(|| name.to_string()),
            size_bytes: existing.as_ref().map(|t| t.size_bytes).unwrap_or(0),
            progress: status.progress,
            speed_bps: status.speed_bps,
            state: status.state,
            save_path: status
                .save_path
                .clone()
                .or_else(|| existing.and_then(|t| t.save_path)),
            updated_at: Utc::now(),
        };
        self.transfers.upsert(&record).await
    }
}
