use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};

use crate::models::api::{
    ErrorBody, JobResult, ReviewRequest, ReviewResponse, StatusResponse, UploadResponse,
};
use crate::models::job::{JobId, JobStatus};
use crate::services::upload::UploadFile;

/// Boundary to the external detection job system.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Upload a file and create a detection job for it.
    async fn create_job(&self, file: &UploadFile, languages: &[String]) -> Result<JobId, ApiError>;

    /// Current status of a job.
    async fn get_status(&self, job_id: &JobId) -> Result<JobStatus, ApiError>;

    /// Detections and masked image of a completed job.
    async fn get_result(&self, job_id: &JobId) -> Result<JobResult, ApiError>;

    /// Send review decisions, keyed by flagged index, to the job owner.
    async fn submit_review(
        &self,
        job_id: &JobId,
        decisions: &BTreeMap<usize, bool>,
    ) -> Result<(), ApiError>;
}

/// HTTP client for the detection service.
pub struct HttpJobApi {
    http: Client,
    base_url: String,
}

impl HttpJobApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pii-mask-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-2xx response into [`ApiError::Rejected`], keeping the server's
/// `detail` message when it sent one.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body,
    };

    Err(ApiError::Rejected { status, message })
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn create_job(&self, file: &UploadFile, languages: &[String]) -> Result<JobId, ApiError> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?;
        let form = multipart::Form::new().part("file", part);

        let query: Vec<(&str, &str)> = languages
            .iter()
            .map(|lang| ("languages", lang.as_str()))
            .collect();

        let response = self
            .http
            .post(self.url("/upload"))
            .query(&query)
            .multipart(form)
            .send()
            .await?;

        let body: UploadResponse = check(response).await?.json().await?;
        Ok(body.job_id)
    }

    async fn get_status(&self, job_id: &JobId) -> Result<JobStatus, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{}/status", job_id)))
            .send()
            .await?;

        let body: StatusResponse = check(response).await?.json().await?;
        Ok(body.status)
    }

    async fn get_result(&self, job_id: &JobId) -> Result<JobResult, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{}/result", job_id)))
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    async fn submit_review(
        &self,
        job_id: &JobId,
        decisions: &BTreeMap<usize, bool>,
    ) -> Result<(), ApiError> {
        let request = ReviewRequest {
            decisions: decisions.clone(),
        };

        let response = self
            .http
            .post(self.url(&format!("/review/{}", job_id)))
            .json(&request)
            .send()
            .await?;

        let ack: ReviewResponse = check(response).await?.json().await?;
        if !ack.accepted() {
            return Err(ApiError::NotAccepted(
                ack.message.unwrap_or_else(|| "review not accepted".to_string()),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Server did not accept the request: {0}")]
    NotAccepted(String),
}

impl ApiError {
    /// Whether the server refused the request because of its content rather
    /// than because the exchange failed.
    pub fn is_rejection(&self) -> bool {
        match self {
            ApiError::Rejected { status, .. } => matches!(
                *status,
                StatusCode::BAD_REQUEST
                    | StatusCode::PAYLOAD_TOO_LARGE
                    | StatusCode::UNSUPPORTED_MEDIA_TYPE
                    | StatusCode::UNPROCESSABLE_ENTITY
            ),
            ApiError::NotAccepted(_) => true,
            ApiError::Http(_) => false,
        }
    }
}
