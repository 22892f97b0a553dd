use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::job::{JobId, JobStatus};
use crate::services::api::{ApiError, JobApi};

/// How a job is polled.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Delay before the first status check and between checks.
    pub interval: Duration,
    /// Consecutive failed status checks tolerated before giving up. `1` stops on
    /// the first failure.
    pub max_consecutive_failures: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_consecutive_failures: 1,
        }
    }
}

/// Spawns status polling tasks.
pub struct JobPoller;

impl JobPoller {
    /// Start polling `job_id` on the current runtime. The first check fires one
    /// interval after start.
    pub fn spawn<A>(api: Arc<A>, job_id: JobId, settings: PollSettings) -> PollHandle
    where
        A: JobApi + ?Sized + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let task_job_id = job_id.clone();
        let task = tokio::spawn(async move {
            let outcome = poll_until_terminal(api, task_job_id, settings, cancel_rx, status_tx).await;
            let _ = outcome_tx.send(outcome);
        });

        PollHandle {
            job_id,
            cancel_tx,
            status_rx,
            outcome_rx: Some(outcome_rx),
            task,
        }
    }
}

/// Owner of one running poll task. Dropping the handle cancels the task.
pub struct PollHandle {
    job_id: JobId,
    cancel_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<JobStatus>,
    outcome_rx: Option<oneshot::Receiver<Result<JobStatus, PollError>>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Latest status observed by the poller.
    pub fn status(&self) -> JobStatus {
        *self.status_rx.borrow()
    }

    /// Watch status changes as they are observed.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_rx.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Stop polling. No tick, including one whose request is already in
    /// flight, is applied afterwards. Safe to call more than once.
    pub fn cancel(&mut self) {
        if self.is_cancelled() {
            return;
        }
        self.cancel_tx.send_replace(true);
        self.task.abort();
        self.outcome_rx = None;
        debug!(job_id = %self.job_id, "Polling cancelled");
    }

    /// Wait for the job to reach a terminal status.
    ///
    /// Resolves to `Completed`, or an error for a failed job, an exhausted
    /// status check budget, or cancellation.
    pub async fn finished(&mut self) -> Result<JobStatus, PollError> {
        let Some(rx) = self.outcome_rx.as_mut() else {
            return Err(PollError::Cancelled);
        };
        let outcome = rx.await.unwrap_or(Err(PollError::Cancelled));
        self.outcome_rx = None;
        outcome
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn poll_until_terminal<A>(
    api: Arc<A>,
    job_id: JobId,
    settings: PollSettings,
    mut cancel_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<JobStatus>,
) -> Result<JobStatus, PollError>
where
    A: JobApi + ?Sized,
{
    let mut ticker = time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let max_failures = settings.max_consecutive_failures.max(1);
    let mut observed = JobStatus::Pending;
    let mut failures = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.changed() => return Err(PollError::Cancelled),
            _ = ticker.tick() => {}
        }

        let response = tokio::select! {
            biased;
            _ = cancel_rx.changed() => return Err(PollError::Cancelled),
            response = api.get_status(&job_id) => response,
        };
        metrics::counter!("pii_status_checks_total").increment(1);

        if *cancel_rx.borrow() {
            return Err(PollError::Cancelled);
        }

        let status = match response {
            Ok(status) => {
                failures = 0;
                status
            }
            Err(e) => {
                failures += 1;
                if failures >= max_failures {
                    warn!(job_id = %job_id, attempts = failures, error = %e, "Status check failed, giving up");
                    return Err(PollError::StatusCheck {
                        attempts: failures,
                        source: e,
                    });
                }
                warn!(job_id = %job_id, attempts = failures, error = %e, "Status check failed, will retry");
                continue;
            }
        };

        if status == observed {
            continue;
        }
        if !observed.can_advance_to(status) {
            debug!(job_id = %job_id, observed = %observed, received = %status, "Ignoring stale status");
            continue;
        }

        info!(job_id = %job_id, status = %status, "Job status changed");
        observed = status;
        status_tx.send_replace(status);

        match status {
            JobStatus::Completed => return Ok(status),
            JobStatus::Failed => return Err(PollError::JobFailed(job_id)),
            JobStatus::Pending | JobStatus::Processing => {}
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Job {0} failed on the server")]
    JobFailed(JobId),

    #[error("Status check failed after {attempts} attempt(s): {source}")]
    StatusCheck {
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("Polling was cancelled")]
    Cancelled,
}
