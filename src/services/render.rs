use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use garde::Validate;
use image::{ImageFormat, ImageReader};
use serde::Serialize;
use tracing::warn;

use crate::models::api::JobResult;
use crate::models::detection::{Detection, PiiType};

const IMAGE_EXPORT_STEM: &str = "masked_image";
const DETECTIONS_EXPORT_NAME: &str = "detections.json";

/// Rectangle drawn over the preview for one detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub pii_type: PiiType,
    pub color: &'static str,
    /// Tooltip text, e.g. "EMAIL - 97%".
    pub label: String,
}

impl Overlay {
    /// Anchor at bbox point 0, sized by the diagonal to point 2.
    pub fn for_detection(detection: &Detection) -> Self {
        let (x, y) = detection.bbox.top_left();
        Self {
            x,
            y,
            width: detection.bbox.width(),
            height: detection.bbox.height(),
            pii_type: detection.pii_type,
            color: detection.pii_type.color(),
            label: format!("{} - {}%", detection.pii_type, detection.confidence_percent()),
        }
    }

    fn clamp_to(&mut self, width: u32, height: u32) {
        let (w, h) = (f64::from(width), f64::from(height));
        let x2 = (self.x + self.width).clamp(0.0, w);
        let y2 = (self.y + self.height).clamp(0.0, h);
        self.x = self.x.clamp(0.0, w);
        self.y = self.y.clamp(0.0, h);
        self.width = (x2 - self.x).max(0.0);
        self.height = (y2 - self.y).max(0.0);
    }
}

/// Counts shown next to the preview. Always derived from the detections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionStats {
    pub total: usize,
    pub flagged: usize,
    pub auto_masked: usize,
    pub per_type: BTreeMap<PiiType, usize>,
}

impl DetectionStats {
    pub fn compute(detections: &[Detection], flagged: usize) -> Self {
        let mut per_type = BTreeMap::new();
        for detection in detections {
            *per_type.entry(detection.pii_type).or_insert(0) += 1;
        }
        let total = detections.len();
        Self {
            total,
            flagged,
            auto_masked: total.saturating_sub(flagged),
            per_type,
        }
    }

    pub fn distinct_types(&self) -> usize {
        self.per_type.len()
    }
}

/// A completed job, decoded and ready for display and export.
#[derive(Debug, Clone)]
pub struct RenderedResult {
    image: Vec<u8>,
    format: ImageFormat,
    dimensions: Option<(u32, u32)>,
    detections: Vec<Detection>,
    flagged: Vec<Detection>,
    overlays: Vec<Overlay>,
    languages: Vec<String>,
}

impl RenderedResult {
    pub fn from_job_result(result: JobResult) -> Result<Self, RenderError> {
        result
            .validate()
            .map_err(|report| RenderError::InvalidResult(report.to_string()))?;
        check_flagged_subset(&result.detections, &result.flagged)?;

        let image = base64::engine::general_purpose::STANDARD.decode(result.image_base64.trim())?;
        let format = image::guess_format(&image).map_err(|_| RenderError::UnknownImageFormat)?;
        let dimensions = match ImageReader::with_format(Cursor::new(&image), format).into_dimensions() {
            Ok(dimensions) => Some(dimensions),
            Err(e) => {
                // Export only needs the raw bytes; overlays go unclamped.
                warn!(format = ?format, error = %e, "Cannot read image dimensions");
                None
            }
        };

        let overlays = result
            .detections
            .iter()
            .map(|detection| {
                let mut overlay = Overlay::for_detection(detection);
                if let Some((width, height)) = dimensions {
                    if !detection.bbox.fits_within(width, height) {
                        warn!(
                            pii_type = %detection.pii_type,
                            bbox = ?detection.bbox,
                            image_width = width,
                            image_height = height,
                            "Detection outside image bounds, clamping overlay"
                        );
                        overlay.clamp_to(width, height);
                    }
                }
                overlay
            })
            .collect();

        Ok(Self {
            image,
            format,
            dimensions,
            detections: result.detections,
            flagged: result.flagged,
            overlays,
            languages: result.languages,
        })
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image
    }

    pub fn image_format(&self) -> ImageFormat {
        self.format
    }

    /// `(width, height)`, when the image decoder for the format is available.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn flagged(&self) -> &[Detection] {
        &self.flagged
    }

    /// Languages the engine actually used.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Overlays to draw; none when detections are hidden.
    pub fn overlays(&self, show_detections: bool) -> &[Overlay] {
        if show_detections {
            &self.overlays
        } else {
            &[]
        }
    }

    pub fn stats(&self) -> DetectionStats {
        DetectionStats::compute(&self.detections, self.flagged.len())
    }

    /// Pretty-printed JSON of every detection, in engine order.
    pub fn detections_json(&self) -> Result<String, RenderError> {
        Ok(serde_json::to_string_pretty(&self.detections)?)
    }

    pub fn image_file_name(&self) -> String {
        let ext = self.format.extensions_str().first().copied().unwrap_or("img");
        format!("{IMAGE_EXPORT_STEM}.{ext}")
    }

    /// Write the masked image into `dir` byte-for-byte.
    pub async fn export_image(&self, dir: &Path) -> Result<PathBuf, RenderError> {
        let path = dir.join(self.image_file_name());
        tokio::fs::write(&path, &self.image).await?;
        Ok(path)
    }

    /// Write `detections.json` into `dir`.
    pub async fn export_detections(&self, dir: &Path) -> Result<PathBuf, RenderError> {
        let path = dir.join(DETECTIONS_EXPORT_NAME);
        tokio::fs::write(&path, self.detections_json()?).await?;
        Ok(path)
    }
}

/// Every flagged detection must also be one of the detections.
fn check_flagged_subset(detections: &[Detection], flagged: &[Detection]) -> Result<(), RenderError> {
    if flagged.len() > detections.len() {
        return Err(RenderError::InvalidResult(format!(
            "{} flagged detections but only {} detections",
            flagged.len(),
            detections.len()
        )));
    }
    if let Some(index) = flagged.iter().position(|f| !detections.contains(f)) {
        return Err(RenderError::InvalidResult(format!(
            "flagged detection {index} is not among the detections"
        )));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Malformed job result: {0}")]
    InvalidResult(String),

    #[error("Image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unrecognized image format")]
    UnknownImageFormat,

    #[error("Failed to serialize detections: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),
}
