use strum::Display;

use crate::models::job::{Job, JobId};
use crate::services::poller::PollHandle;
use crate::services::render::RenderedResult;
use crate::services::review::ReviewCollector;

use super::error::ErrorKind;

/// Where a session is in the job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Uploading,
    Polling,
    FetchingResult,
    ReviewReady,
    Error,
}

/// A dismissible error notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    /// Phase the session was in when the error happened.
    pub stage: SessionPhase,
    pub kind: ErrorKind,
    pub message: String,
    pub job_id: Option<JobId>,
}

/// A finished job on display, with its review.
#[derive(Debug)]
pub struct ReadyState {
    pub job: Job,
    pub result: RenderedResult,
    pub review: ReviewCollector,
}

/// Everything a session owns. Each variant carries only what is alive in that
/// phase, so leaving `Polling` drops (and cancels) the poll task.
pub(crate) enum SessionState {
    Idle,
    Uploading,
    Polling { job: Job, poll: PollHandle },
    FetchingResult { job: Job },
    ReviewReady(Box<ReadyState>),
    Error(SessionFailure),
}

impl SessionState {
    pub(crate) fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Uploading => SessionPhase::Uploading,
            SessionState::Polling { .. } => SessionPhase::Polling,
            SessionState::FetchingResult { .. } => SessionPhase::FetchingResult,
            SessionState::ReviewReady(_) => SessionPhase::ReviewReady,
            SessionState::Error(_) => SessionPhase::Error,
        }
    }

    pub(crate) fn job(&self) -> Option<&Job> {
        match self {
            SessionState::Polling { job, .. } | SessionState::FetchingResult { job } => Some(job),
            SessionState::ReviewReady(ready) => Some(&ready.job),
            SessionState::Idle | SessionState::Uploading | SessionState::Error(_) => None,
        }
    }
}
