use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::models::detection::Detection;
use crate::models::job::JobId;
use crate::services::api::{ApiError, JobApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReviewState {
    Open,
    Submitting,
    Submitted,
}

/// Immutable snapshot of a complete decision set, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionBatch {
    decisions: BTreeMap<usize, bool>,
}

impl DecisionBatch {
    pub fn decisions(&self) -> &BTreeMap<usize, bool> {
        &self.decisions
    }
}

/// Collects mask/keep decisions for flagged detections, identified by their
/// position in the flagged list, and submits them once as a batch.
#[derive(Debug, Clone)]
pub struct ReviewCollector {
    flagged: Vec<Detection>,
    decisions: BTreeMap<usize, bool>,
    state: ReviewState,
}

impl ReviewCollector {
    pub fn new(flagged: Vec<Detection>) -> Self {
        Self {
            flagged,
            decisions: BTreeMap::new(),
            state: ReviewState::Open,
        }
    }

    /// Flagged detections in review order.
    pub fn items(&self) -> &[Detection] {
        &self.flagged
    }

    pub fn len(&self) -> usize {
        self.flagged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }

    /// Record whether flagged item `index` should be masked. A later call for
    /// the same index overwrites the earlier decision.
    pub fn record_decision(&mut self, index: usize, mask: bool) -> Result<(), ReviewError> {
        match self.state {
            ReviewState::Submitted => return Err(ReviewError::Closed),
            ReviewState::Submitting => return Err(ReviewError::AlreadySubmitting),
            ReviewState::Open => {}
        }
        if index >= self.flagged.len() {
            return Err(ReviewError::IndexOutOfRange {
                index,
                len: self.flagged.len(),
            });
        }
        self.decisions.insert(index, mask);
        Ok(())
    }

    pub fn decision(&self, index: usize) -> Option<bool> {
        self.decisions.get(&index).copied()
    }

    /// `(decided, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.decisions.len(), self.flagged.len())
    }

    /// Indexes still waiting for a decision.
    pub fn undecided(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.flagged.len()).filter(|i| !self.decisions.contains_key(i))
    }

    pub fn ready_to_submit(&self) -> bool {
        self.decisions.len() == self.flagged.len()
    }

    pub fn is_submitting(&self) -> bool {
        self.state == ReviewState::Submitting
    }

    pub fn is_submitted(&self) -> bool {
        self.state == ReviewState::Submitted
    }

    /// Freeze the decisions for sending. Fails while another submission is in
    /// flight, after a successful one, or while any item is undecided.
    pub fn begin_submission(&mut self) -> Result<DecisionBatch, ReviewError> {
        match self.state {
            ReviewState::Submitted => return Err(ReviewError::Closed),
            ReviewState::Submitting => return Err(ReviewError::AlreadySubmitting),
            ReviewState::Open => {}
        }
        if !self.ready_to_submit() {
            let (decided, total) = self.progress();
            return Err(ReviewError::Incomplete { decided, total });
        }
        self.state = ReviewState::Submitting;
        Ok(DecisionBatch {
            decisions: self.decisions.clone(),
        })
    }

    /// Settle an in-flight submission. Success closes the review; failure
    /// reopens it with every decision kept.
    pub fn complete_submission(&mut self, succeeded: bool) {
        if self.state != ReviewState::Submitting {
            return;
        }
        self.state = if succeeded {
            ReviewState::Submitted
        } else {
            ReviewState::Open
        };
    }

    /// Send the decisions to the job owner in a single request.
    pub async fn submit<A>(&mut self, api: &A, job_id: &JobId) -> Result<(), ReviewError>
    where
        A: JobApi + ?Sized,
    {
        let batch = self.begin_submission()?;
        let guard = InFlight(&mut self.state);
        let outcome = api.submit_review(job_id, batch.decisions()).await;
        guard.settle(outcome.is_ok());

        match outcome {
            Ok(()) => {
                metrics::counter!("pii_review_submissions_total", "outcome" => "ok").increment(1);
                info!(job_id = %job_id, decisions = batch.decisions().len(), "Review submitted");
                Ok(())
            }
            Err(e) => {
                metrics::counter!("pii_review_submissions_total", "outcome" => "error").increment(1);
                warn!(job_id = %job_id, error = %e, "Review submission failed, decisions kept");
                Err(ReviewError::Submission(e))
            }
        }
    }
}

/// Reopens the review if a submission future is dropped before it settles.
struct InFlight<'a>(&'a mut ReviewState);

impl InFlight<'_> {
    fn settle(self, succeeded: bool) {
        *self.0 = if succeeded {
            ReviewState::Submitted
        } else {
            ReviewState::Open
        };
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if *self.0 == ReviewState::Submitting {
            *self.0 = ReviewState::Open;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Flagged item {index} does not exist ({len} items)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Review incomplete: {decided} of {total} items decided")]
    Incomplete { decided: usize, total: usize },

    #[error("A review submission is already in progress")]
    AlreadySubmitting,

    #[error("Review already submitted")]
    Closed,

    #[error("Review submission failed: {0}")]
    Submission(#[source] ApiError),
}
