use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// PII categories reported by the detection engine.
///
/// Unknown labels from the engine deserialize to [`PiiType::Other`] instead of
/// failing the whole result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "UPPERCASE", from = "String")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum PiiType {
    Email,
    Phone,
    Aadhaar,
    Date,
    Name,
    Address,
    Dob,
    Other,
}

impl From<String> for PiiType {
    fn from(label: String) -> Self {
        label.parse().unwrap_or(PiiType::Other)
    }
}

impl PiiType {
    /// Overlay colour used when drawing this type over the preview.
    pub fn color(self) -> &'static str {
        match self {
            PiiType::Email => "red",
            PiiType::Phone => "yellow",
            PiiType::Aadhaar => "purple",
            PiiType::Date => "blue",
            PiiType::Name => "green",
            PiiType::Address => "orange",
            PiiType::Dob => "indigo",
            PiiType::Other => "gray",
        }
    }
}

/// Four `[x, y]` corners in image pixel space. Point 0 is top-left and point 2
/// is bottom-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundingBox(pub [[f64; 2]; 4]);

impl BoundingBox {
    /// Axis-aligned box from its top-left corner and size.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self([
            [x, y],
            [x + width, y],
            [x + width, y + height],
            [x, y + height],
        ])
    }

    pub fn top_left(&self) -> (f64, f64) {
        (self.0[0][0], self.0[0][1])
    }

    pub fn bottom_right(&self) -> (f64, f64) {
        (self.0[2][0], self.0[2][1])
    }

    pub fn width(&self) -> f64 {
        self.0[2][0] - self.0[0][0]
    }

    pub fn height(&self) -> f64 {
        self.0[2][1] - self.0[0][1]
    }

    /// True when the diagonal corners are ordered and inside a
    /// `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let (x1, y1) = self.top_left();
        let (x2, y2) = self.bottom_right();
        x1 >= 0.0
            && y1 >= 0.0
            && x2 >= x1
            && y2 >= y1
            && x2 <= f64::from(width)
            && y2 <= f64::from(height)
    }
}

/// One PII span found by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Detection {
    #[serde(rename = "type")]
    #[garde(skip)]
    pub pii_type: PiiType,

    /// Matched text. Only guaranteed for flagged detections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub text: Option<String>,

    #[garde(skip)]
    pub bbox: BoundingBox,

    #[garde(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
}

impl Detection {
    /// Confidence as a whole percentage, rounded half away from zero.
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u8
    }
}
