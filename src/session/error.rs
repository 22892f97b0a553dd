use strum::Display;

use crate::services::api::ApiError;
use crate::services::poller::PollError;
use crate::services::render::RenderError;
use crate::services::review::ReviewError;
use crate::services::upload::UploadError;

use super::state::SessionPhase;

/// What went wrong, in the terms a user is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing input. Nothing was sent.
    Validation,
    /// A request did not complete or its response was unusable.
    Transport,
    /// The engine reported the job as failed.
    JobFailed,
    /// Review decisions were rejected or lost in transit.
    Submission,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Failed to fetch job result: {0}")]
    FetchResult(#[source] ApiError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("Not allowed while the session is {0}")]
    InvalidPhase(SessionPhase),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Upload(UploadError::Api(e)) if e.is_rejection() => ErrorKind::Validation,
            SessionError::Upload(UploadError::Api(_)) => ErrorKind::Transport,
            SessionError::Upload(_) => ErrorKind::Validation,
            SessionError::Poll(PollError::JobFailed(_)) => ErrorKind::JobFailed,
            SessionError::Poll(_) => ErrorKind::Transport,
            SessionError::FetchResult(_) | SessionError::Render(_) => ErrorKind::Transport,
            SessionError::Review(ReviewError::Submission(_)) => ErrorKind::Submission,
            SessionError::Review(_) | SessionError::InvalidPhase(_) => ErrorKind::Validation,
        }
    }
}
