use std::time::Duration;

use serde::Deserialize;

use crate::services::poller::PollSettings;
use crate::services::upload::UploadLimits;

/// Client configuration, read from `PII_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the detection job system (e.g., "http://localhost:8000")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Delay between job status checks, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive failed status checks tolerated before polling gives up
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    /// Per-request HTTP timeout, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Advisory upload size ceiling, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Language codes offered for text recognition (comma-separated)
    #[serde(default = "default_supported_languages")]
    pub supported_languages: Vec<String>,

    /// Directory that exports are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Prometheus listener address (e.g., "127.0.0.1:9184"). Unset disables it.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_failures() -> u32 {
    1
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_supported_languages() -> Vec<String> {
    vec!["en".to_string(), "hi".to_string(), "ml".to_string()]
}

fn default_output_dir() -> String {
    ".".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_failures: default_max_poll_failures(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            supported_languages: default_supported_languages(),
            output_dir: default_output_dir(),
            metrics_addr: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("PII_").from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval(),
            max_consecutive_failures: self.max_poll_failures.max(1),
        }
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_bytes: self.max_upload_bytes,
            supported_languages: self.supported_languages.clone(),
        }
    }
}
