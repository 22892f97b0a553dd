use std::collections::BTreeMap;

use garde::Validate;
use serde::{Deserialize, Serialize};

use super::detection::Detection;
use super::job::{JobId, JobStatus};

/// Response to `POST /upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: JobId,
}

/// Response to `GET /jobs/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
}

/// Full payload of a completed job, from `GET /jobs/{id}/result`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobResult {
    #[garde(dive)]
    pub detections: Vec<Detection>,

    /// Low-confidence subset of `detections` that needs human review.
    #[garde(dive)]
    #[serde(default)]
    pub flagged: Vec<Detection>,

    /// Masked image, base64-encoded.
    #[garde(length(min = 1))]
    pub image_base64: String,

    #[garde(skip)]
    #[serde(default)]
    pub languages: Vec<String>,
}

/// Body of `POST /review/{id}`: flagged index to "mask it" decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub decisions: BTreeMap<usize, bool>,
}

/// Response to a review submission. Servers either answer `{"ok": bool}` or
/// just a `{"message": ...}` acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReviewResponse {
    pub fn accepted(&self) -> bool {
        self.ok.unwrap_or(true)
    }
}

/// FastAPI-style error body (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}
