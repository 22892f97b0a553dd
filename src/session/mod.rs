//! Session controller: drives one job from upload to submitted review.

mod error;
mod state;

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::models::job::{Job, JobId, JobStatus};
use crate::services::api::JobApi;
use crate::services::poller::{JobPoller, PollError, PollSettings};
use crate::services::render::RenderedResult;
use crate::services::review::{ReviewCollector, ReviewError};
use crate::services::upload::{UploadFile, UploadLimits, UploadSubmitter};

pub use error::{ErrorKind, SessionError};
pub use state::{ReadyState, SessionFailure, SessionPhase};

use state::SessionState;

#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub poll: PollSettings,
    pub upload: UploadLimits,
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            poll: config.poll_settings(),
            upload: config.upload_limits(),
        }
    }
}

/// Owns the single active job and everything derived from it.
///
/// `idle -> uploading -> polling -> fetching_result -> review_ready`, with
/// `error` reachable from the three middle phases and `reset` back to `idle`
/// from anywhere.
pub struct Session<A: JobApi + ?Sized + 'static> {
    api: Arc<A>,
    settings: SessionSettings,
    state: SessionState,
    notice: Option<SessionFailure>,
}

impl<A: JobApi + ?Sized + 'static> Session<A> {
    pub fn new(api: Arc<A>, settings: SessionSettings) -> Self {
        Self {
            api,
            settings,
            state: SessionState::Idle,
            notice: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn job(&self) -> Option<&Job> {
        self.state.job()
    }

    /// Latest known status of the active job.
    pub fn status(&self) -> Option<JobStatus> {
        match &self.state {
            SessionState::Polling { poll, .. } => Some(poll.status()),
            other => other.job().map(|job| job.status),
        }
    }

    pub fn ready(&self) -> Option<&ReadyState> {
        match &self.state {
            SessionState::ReviewReady(ready) => Some(ready),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&RenderedResult> {
        self.ready().map(|ready| &ready.result)
    }

    pub fn review(&self) -> Option<&ReviewCollector> {
        self.ready().map(|ready| &ready.review)
    }

    /// The error that put the session into `error`, or the latest review
    /// submission failure.
    pub fn last_error(&self) -> Option<&SessionFailure> {
        match &self.state {
            SessionState::Error(failure) => Some(failure),
            _ => self.notice.as_ref(),
        }
    }

    /// Drop the active job, its poller, result and review.
    pub fn reset(&mut self) {
        if let Some(job) = self.state.job() {
            info!(job_id = %job.id, phase = %self.phase(), "Discarding session job");
        }
        // Replacing the state drops any PollHandle, which cancels its task.
        self.state = SessionState::Idle;
        self.notice = None;
    }

    /// Dismiss the current error notice. From `error` this is a full reset.
    pub fn dismiss_error(&mut self) {
        if self.phase() == SessionPhase::Error {
            self.reset();
        } else {
            self.notice = None;
        }
    }

    /// Upload a file and start polling the new job. Any previous job is
    /// discarded first.
    pub async fn start_upload(
        &mut self,
        file: &UploadFile,
        languages: &[String],
    ) -> Result<JobId, SessionError> {
        self.reset();
        self.state = SessionState::Uploading;

        let created = UploadSubmitter::new(self.api.as_ref(), &self.settings.upload)
            .submit(file, languages)
            .await;

        let job_id = match created {
            Ok(job_id) => job_id,
            Err(e) => return Err(self.fail(SessionPhase::Uploading, e.into(), None)),
        };

        let poll = JobPoller::spawn(self.api.clone(), job_id.clone(), self.settings.poll.clone());
        let job = Job::new(job_id.clone(), languages.to_vec());
        self.state = SessionState::Polling { job, poll };

        Ok(job_id)
    }

    /// Wait for the polled job to finish, then fetch and render its result.
    pub async fn await_result(&mut self) -> Result<&RenderedResult, SessionError> {
        let started = Instant::now();
        let outcome = match &mut self.state {
            SessionState::Polling { poll, .. } => poll.finished().await,
            other => return Err(SessionError::InvalidPhase(other.phase())),
        };

        let SessionState::Polling { mut job, poll } =
            std::mem::replace(&mut self.state, SessionState::Idle)
        else {
            return Err(SessionError::InvalidPhase(SessionPhase::Idle));
        };
        job.observe(poll.status());
        drop(poll);

        metrics::histogram!("pii_job_wait_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(_) => {
                metrics::counter!("pii_jobs_completed_total").increment(1);
            }
            Err(PollError::Cancelled) => {
                warn!(job_id = %job.id, "Polling ended by cancellation");
                return Err(PollError::Cancelled.into());
            }
            Err(e) => {
                if matches!(e, PollError::JobFailed(_)) {
                    metrics::counter!("pii_jobs_failed_total").increment(1);
                }
                return Err(self.fail(SessionPhase::Polling, e.into(), Some(job.id)));
            }
        }

        let job_id = job.id.clone();
        self.state = SessionState::FetchingResult { job };
        info!(job_id = %job_id, "Fetching job result");

        let fetched = self.api.get_result(&job_id).await;
        let rendered = match fetched {
            Ok(result) => RenderedResult::from_job_result(result).map_err(SessionError::from),
            Err(e) => Err(SessionError::FetchResult(e)),
        };
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(e) => return Err(self.fail(SessionPhase::FetchingResult, e, Some(job_id))),
        };

        let SessionState::FetchingResult { job } =
            std::mem::replace(&mut self.state, SessionState::Idle)
        else {
            return Err(SessionError::InvalidPhase(SessionPhase::Idle));
        };

        let stats = rendered.stats();
        info!(
            job_id = %job.id,
            total = stats.total,
            flagged = stats.flagged,
            auto_masked = stats.auto_masked,
            "Job result ready"
        );

        let review = ReviewCollector::new(rendered.flagged().to_vec());
        self.state = SessionState::ReviewReady(Box::new(ReadyState {
            job,
            result: rendered,
            review,
        }));

        self.result()
            .ok_or(SessionError::InvalidPhase(SessionPhase::Idle))
    }

    /// Upload, poll and fetch in one go.
    pub async fn process(
        &mut self,
        file: &UploadFile,
        languages: &[String],
    ) -> Result<&RenderedResult, SessionError> {
        self.start_upload(file, languages).await?;
        self.await_result().await
    }

    pub fn record_decision(&mut self, index: usize, mask: bool) -> Result<(), SessionError> {
        match &mut self.state {
            SessionState::ReviewReady(ready) => Ok(ready.review.record_decision(index, mask)?),
            other => Err(SessionError::InvalidPhase(other.phase())),
        }
    }

    /// Submit the review. A failed submission leaves the session in
    /// `review_ready` with every decision intact and records a notice.
    pub async fn submit_review(&mut self) -> Result<(), SessionError> {
        let phase = self.phase();
        let SessionState::ReviewReady(ready) = &mut self.state else {
            return Err(SessionError::InvalidPhase(phase));
        };
        let ReadyState { job, review, .. } = &mut **ready;

        let outcome = review.submit(self.api.as_ref(), &job.id).await;
        match outcome {
            Ok(()) => {
                self.notice = None;
                Ok(())
            }
            Err(e @ ReviewError::Submission(_)) => {
                let job_id = job.id.clone();
                let err = SessionError::from(e);
                self.notice = Some(SessionFailure {
                    stage: SessionPhase::ReviewReady,
                    kind: err.kind(),
                    message: err.to_string(),
                    job_id: Some(job_id),
                });
                Err(err)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move to `error`, discarding the job and stopping any polling.
    fn fail(&mut self, stage: SessionPhase, err: SessionError, job_id: Option<JobId>) -> SessionError {
        error!(
            phase = %stage,
            kind = %err.kind(),
            job_id = ?job_id.as_ref().map(JobId::as_str),
            error = %err,
            "Session failed"
        );
        self.state = SessionState::Error(SessionFailure {
            stage,
            kind: err.kind(),
            message: err.to_string(),
            job_id,
        });
        err
    }
}
