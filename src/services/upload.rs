use std::path::Path;

use garde::Validate;
use tracing::info;

use crate::models::job::JobId;
use crate::services::api::{ApiError, JobApi};

const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";
const UNKNOWN_MIME: &str = "application/octet-stream";

/// A file selected for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Build an upload from raw bytes. The content type is sniffed from the
    /// bytes, falling back to the file extension for formats the `image` crate
    /// cannot recognize (SVG, HEIC).
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = sniff_content_type(&bytes).unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_raw()
                .unwrap_or(UNKNOWN_MIME)
                .to_string()
        });
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self::from_bytes(file_name, bytes))
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type == PDF_MIME
    }

    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0 / 1024.0
    }
}

/// Content type from magic bytes: PDF or any format the `image` crate knows.
pub fn sniff_content_type(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(PDF_MAGIC) {
        return Some(PDF_MIME.to_string());
    }
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Client-side upload limits.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Advisory ceiling; the job system has the final say.
    pub max_bytes: u64,
    pub supported_languages: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            supported_languages: vec!["en".to_string(), "hi".to_string(), "ml".to_string()],
        }
    }
}

/// Shape checks on an upload before any request goes out.
#[derive(Debug, Validate)]
pub struct UploadRequest {
    #[garde(length(min = 1, max = 255))]
    pub file_name: String,

    #[garde(length(min = 1), inner(length(min = 2, max = 8)))]
    pub languages: Vec<String>,
}

/// Reject anything that is not an image or PDF, too large, or missing
/// language hints.
pub fn validate_upload(
    file: &UploadFile,
    languages: &[String],
    limits: &UploadLimits,
) -> Result<(), UploadError> {
    if file.bytes.is_empty() {
        return Err(UploadError::MissingFile);
    }

    if !(file.content_type.starts_with("image/") || file.content_type == PDF_MIME) {
        return Err(UploadError::UnsupportedType(file.content_type.clone()));
    }

    let size = file.bytes.len() as u64;
    if size > limits.max_bytes {
        return Err(UploadError::TooLarge {
            size,
            limit: limits.max_bytes,
        });
    }

    if languages.is_empty() {
        return Err(UploadError::NoLanguages);
    }

    UploadRequest {
        file_name: file.file_name.clone(),
        languages: languages.to_vec(),
    }
    .validate()
    .map_err(|report| UploadError::Invalid(report.to_string()))?;

    if let Some(lang) = languages
        .iter()
        .find(|lang| !limits.supported_languages.contains(lang))
    {
        return Err(UploadError::UnsupportedLanguage(lang.clone()));
    }

    Ok(())
}

/// Validates uploads and turns them into jobs.
pub struct UploadSubmitter<'a, A: JobApi + ?Sized> {
    api: &'a A,
    limits: &'a UploadLimits,
}

impl<'a, A: JobApi + ?Sized> UploadSubmitter<'a, A> {
    pub fn new(api: &'a A, limits: &'a UploadLimits) -> Self {
        Self { api, limits }
    }

    /// Validate, then issue exactly one job creation request.
    pub async fn submit(&self, file: &UploadFile, languages: &[String]) -> Result<JobId, UploadError> {
        validate_upload(file, languages, self.limits)?;

        info!(
            file_name = %file.file_name,
            content_type = %file.content_type,
            size_bytes = file.bytes.len(),
            languages = ?languages,
            "Uploading file for PII detection"
        );

        let job_id = self.api.create_job(file, languages).await?;
        metrics::counter!("pii_jobs_submitted_total").increment(1);

        info!(job_id = %job_id, "Detection job created");
        Ok(job_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file selected")]
    MissingFile,

    #[error("Unsupported file type: {0} (only images and PDFs are accepted)")]
    UnsupportedType(String),

    #[error("File is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("At least one language must be selected")]
    NoLanguages,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid upload: {0}")]
    Invalid(String),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}
