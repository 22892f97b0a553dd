//! Scripted in-memory job system for unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;

use crate::models::api::JobResult;
use crate::models::detection::{BoundingBox, Detection, PiiType};
use crate::models::job::{JobId, JobStatus};
use crate::services::api::{ApiError, JobApi};
use crate::services::upload::UploadFile;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn detection(pii_type: PiiType, x: f64, y: f64, confidence: f64) -> Detection {
    Detection {
        pii_type,
        text: Some(format!("{pii_type} text")),
        bbox: BoundingBox::from_rect(x, y, 40.0, 10.0),
        confidence,
    }
}

/// Five detections on a 200x100 image, the last two flagged.
pub fn sample_result() -> JobResult {
    let detections = vec![
        detection(PiiType::Email, 10.0, 10.0, 0.97),
        detection(PiiType::Phone, 10.0, 30.0, 0.91),
        detection(PiiType::Email, 60.0, 10.0, 0.88),
        detection(PiiType::Name, 60.0, 30.0, 0.62),
        detection(PiiType::Dob, 110.0, 50.0, 0.55),
    ];
    let flagged = detections[3..].to_vec();
    JobResult {
        detections,
        flagged,
        image_base64: base64::engine::general_purpose::STANDARD.encode(png_bytes(200, 100)),
        languages: vec!["en".to_string()],
    }
}

pub fn unavailable() -> ApiError {
    ApiError::Rejected {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: "try again".to_string(),
    }
}

#[derive(Default)]
struct Calls {
    create: usize,
    status: usize,
    result: usize,
    review: usize,
    decisions: Vec<BTreeMap<usize, bool>>,
}

/// A job system that answers status checks from a script.
pub struct ScriptedJobApi {
    job_id: JobId,
    statuses: Mutex<VecDeque<Result<JobStatus, ApiError>>>,
    review_outcomes: Mutex<VecDeque<Result<(), ApiError>>>,
    result: JobResult,
    status_delay: Duration,
    review_delay: Duration,
    calls: Mutex<Calls>,
}

impl ScriptedJobApi {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: JobId::from(job_id),
            statuses: Mutex::new(VecDeque::new()),
            review_outcomes: Mutex::new(VecDeque::new()),
            result: sample_result(),
            status_delay: Duration::ZERO,
            review_delay: Duration::ZERO,
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn with_statuses(self, statuses: &[JobStatus]) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .extend(statuses.iter().copied().map(Ok));
        self
    }

    pub fn then_error(self, error: ApiError) -> Self {
        self.statuses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn then_status(self, status: JobStatus) -> Self {
        self.statuses.lock().unwrap().push_back(Ok(status));
        self
    }

    pub fn with_result(mut self, result: JobResult) -> Self {
        self.result = result;
        self
    }

    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn with_review_delay(mut self, delay: Duration) -> Self {
        self.review_delay = delay;
        self
    }

    pub fn fail_next_review(self, error: ApiError) -> Self {
        self.review_outcomes.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn create_calls(&self) -> usize {
        self.calls.lock().unwrap().create
    }

    pub fn status_calls(&self) -> usize {
        self.calls.lock().unwrap().status
    }

    pub fn result_calls(&self) -> usize {
        self.calls.lock().unwrap().result
    }

    pub fn review_calls(&self) -> usize {
        self.calls.lock().unwrap().review
    }

    pub fn submitted_decisions(&self) -> Vec<BTreeMap<usize, bool>> {
        self.calls.lock().unwrap().decisions.clone()
    }
}

#[async_trait]
impl JobApi for ScriptedJobApi {
    async fn create_job(&self, _file: &UploadFile, _languages: &[String]) -> Result<JobId, ApiError> {
        self.calls.lock().unwrap().create += 1;
        Ok(self.job_id.clone())
    }

    async fn get_status(&self, _job_id: &JobId) -> Result<JobStatus, ApiError> {
        self.calls.lock().unwrap().status += 1;
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        // An exhausted script keeps reporting the job as still processing.
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(JobStatus::Processing))
    }

    async fn get_result(&self, _job_id: &JobId) -> Result<JobResult, ApiError> {
        self.calls.lock().unwrap().result += 1;
        Ok(self.result.clone())
    }

    async fn submit_review(
        &self,
        _job_id: &JobId,
        decisions: &BTreeMap<usize, bool>,
    ) -> Result<(), ApiError> {
        if !self.review_delay.is_zero() {
            tokio::time::sleep(self.review_delay).await;
        }
        let mut calls = self.calls.lock().unwrap();
        calls.review += 1;
        calls.decisions.push(decisions.clone());
        drop(calls);
        self.review_outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
