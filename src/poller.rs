//! Job status polling.

use crate::config::PollConfig;
use crate::error::{ClipWeaveError, Result, GENERIC_GENERATION_MESSAGE};
use crate::service::{GenerationService, ProbeOutcome};
use crate::types::{GenerationJob, JobStatus, VideoHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How polling ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The video is available.
    Ready(VideoHandle),
    /// The token was cancelled; the job was left untouched.
    Cancelled,
}

/// Probes a job until it is ready, fails, gives up, or is cancelled.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: PollConfig,
}

impl Poller {
    /// Creates a poller with the given policy.
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Returns the polling policy.
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Polls `job` until it leaves `Pending`.
    ///
    /// Exactly one probe is in flight at a time. The token is checked before
    /// every probe and raced against every probe and wait; a probe whose
    /// response arrives after cancellation is discarded.
    pub async fn poll_until_ready<S>(
        &self,
        service: &S,
        job: &mut GenerationJob,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome>
    where
        S: GenerationService + ?Sized,
    {
        let start = Instant::now();
        // A timeout past the end of the clock means no deadline.
        let deadline = self.config.timeout.and_then(|t| start.checked_add(t));
        let mut probes: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(PollOutcome::Cancelled);
            }
            if let (Some(deadline), Some(timeout)) = (deadline, self.config.timeout) {
                if Instant::now() >= deadline {
                    job.transition(JobStatus::Failed);
                    tracing::warn!(video_id = %job.id, probes, "polling timed out");
                    return Err(ClipWeaveError::Timeout(timeout));
                }
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                result = service.probe(&job.id) => result,
            };
            probes += 1;

            if cancel.is_cancelled() {
                tracing::debug!(video_id = %job.id, "discarding probe result after cancellation");
                return Ok(PollOutcome::Cancelled);
            }

            match result {
                Ok(ProbeOutcome::Ready) => {
                    job.transition(JobStatus::Ready);
                    tracing::debug!(
                        video_id = %job.id,
                        probes,
                        elapsed_secs = start.elapsed().as_secs(),
                        "video ready"
                    );
                    return Ok(PollOutcome::Ready(job.handle()));
                }
                Ok(ProbeOutcome::Pending) => {
                    if self.config.max_probes.is_some_and(|max| probes >= max) {
                        job.transition(JobStatus::Failed);
                        tracing::warn!(video_id = %job.id, probes, "probe ceiling reached");
                        return Err(ClipWeaveError::Timeout(start.elapsed()));
                    }
                    let mut wait = self.config.delay_after(probes);
                    if let Some(deadline) = deadline {
                        wait = wait.min(deadline.saturating_duration_since(Instant::now()));
                    }
                    tracing::debug!(
                        video_id = %job.id,
                        probes,
                        elapsed_secs = start.elapsed().as_secs(),
                        wait_ms = wait.as_millis() as u64,
                        "video not ready yet"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Ok(ProbeOutcome::Unexpected(status)) => {
                    job.transition(JobStatus::Failed);
                    tracing::warn!(video_id = %job.id, status, "probe returned unexpected status");
                    return Err(ClipWeaveError::Poll {
                        status: Some(status),
                        message: GENERIC_GENERATION_MESSAGE.to_string(),
                    });
                }
                Err(e) => {
                    job.transition(JobStatus::Failed);
                    tracing::warn!(video_id = %job.id, error = %e, "probe failed");
                    return Err(ClipWeaveError::Poll {
                        status: None,
                        message: GENERIC_GENERATION_MESSAGE.to_string(),
                    });
                }
            }
        }
    }
}
