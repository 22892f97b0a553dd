//! In-process fake of the detection job system for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use uuid::Uuid;

use pii_mask_client::services::api::HttpJobApi;
use pii_mask_client::services::poller::PollSettings;
use pii_mask_client::services::upload::UploadLimits;
use pii_mask_client::session::SessionSettings;

/// What the fake received on `POST /upload`.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
    pub languages: Vec<String>,
}

#[derive(Default)]
struct Script {
    /// Status answers per job; an exhausted script reports "processing".
    statuses: VecDeque<&'static str>,
    result: Value,
    review_failures: VecDeque<(StatusCode, Value)>,
}

#[derive(Default)]
pub struct FakeState {
    fixed_job_id: Option<String>,
    script: Mutex<Script>,
    jobs: Mutex<HashMap<String, VecDeque<&'static str>>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    reviews: Mutex<Vec<(String, Value)>>,
    status_checks: AtomicUsize,
    result_fetches: AtomicUsize,
}

impl FakeState {
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn reviews(&self) -> Vec<(String, Value)> {
        self.reviews.lock().unwrap().clone()
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    pub fn result_fetches(&self) -> usize {
        self.result_fetches.load(Ordering::SeqCst)
    }
}

pub struct FakeJobServer {
    pub base_url: String,
    pub state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl Drop for FakeJobServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct FakeJobServerBuilder {
    fixed_job_id: Option<String>,
    script: Script,
}

impl FakeJobServer {
    pub fn builder() -> FakeJobServerBuilder {
        FakeJobServerBuilder {
            fixed_job_id: None,
            script: Script {
                result: crate::fixtures::aadhaar_card_result(),
                ..Script::default()
            },
        }
    }

    pub fn api(&self) -> HttpJobApi {
        HttpJobApi::new(&self.base_url, Duration::from_secs(5)).expect("build http client")
    }
}

impl FakeJobServerBuilder {
    pub fn job_id(mut self, job_id: &str) -> Self {
        self.fixed_job_id = Some(job_id.to_string());
        self
    }

    pub fn statuses(mut self, statuses: &[&'static str]) -> Self {
        self.script.statuses = statuses.iter().copied().collect();
        self
    }

    pub fn result(mut self, result: Value) -> Self {
        self.script.result = result;
        self
    }

    pub fn fail_review_once(mut self, status: StatusCode, body: Value) -> Self {
        self.script.review_failures.push_back((status, body));
        self
    }

    pub async fn start(self) -> FakeJobServer {
        let state = Arc::new(FakeState {
            fixed_job_id: self.fixed_job_id,
            script: Mutex::new(self.script),
            ..FakeState::default()
        });

        let app = Router::new()
            .route("/upload", post(upload))
            .route("/jobs/{job_id}/status", get(job_status))
            .route("/jobs/{job_id}/result", get(job_result))
            .route("/review/{job_id}", post(review))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake server");
        });

        FakeJobServer {
            base_url: format!("http://{addr}"),
            state,
            handle,
        }
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn upload(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<Vec<(String, String)>>,
    mut multipart: Multipart,
) -> Response {
    let languages: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == "languages")
        .map(|(_, value)| value)
        .collect();

    let mut recorded = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        recorded = Some(RecordedUpload {
            file_name,
            content_type,
            size,
            languages: languages.clone(),
        });
    }

    let Some(recorded) = recorded else {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "file is required");
    };
    let accepted = recorded
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/") || ct == "application/pdf");
    state.uploads.lock().unwrap().push(recorded);
    if !accepted {
        return detail(StatusCode::BAD_REQUEST, "Invalid file type");
    }

    let job_id = state
        .fixed_job_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let statuses = state.script.lock().unwrap().statuses.clone();
    state.jobs.lock().unwrap().insert(job_id.clone(), statuses);

    Json(json!({ "job_id": job_id })).into_response()
}

async fn job_status(State(state): State<Arc<FakeState>>, Path(job_id): Path<String>) -> Response {
    state.status_checks.fetch_add(1, Ordering::SeqCst);
    let mut jobs = state.jobs.lock().unwrap();
    let Some(script) = jobs.get_mut(&job_id) else {
        return detail(StatusCode::NOT_FOUND, "Job not found");
    };
    let status = script.pop_front().unwrap_or("processing");
    Json(json!({ "status": status })).into_response()
}

async fn job_result(State(state): State<Arc<FakeState>>, Path(job_id): Path<String>) -> Response {
    state.result_fetches.fetch_add(1, Ordering::SeqCst);
    if !state.jobs.lock().unwrap().contains_key(&job_id) {
        return detail(StatusCode::NOT_FOUND, "Job not found");
    }
    Json(state.script.lock().unwrap().result.clone()).into_response()
}

async fn review(
    State(state): State<Arc<FakeState>>,
    Path(job_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.reviews.lock().unwrap().push((job_id, body));
    if let Some((status, body)) = state.script.lock().unwrap().review_failures.pop_front() {
        return (status, Json(body)).into_response();
    }
    Json(json!({ "message": "Review recorded" })).into_response()
}

/// Session settings with a short poll interval for real-time tests.
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        poll: PollSettings {
            interval: Duration::from_millis(10),
            max_consecutive_failures: 1,
        },
        upload: UploadLimits::default(),
    }
}
