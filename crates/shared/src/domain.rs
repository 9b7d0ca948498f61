use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(SelectionId);
id_newtype!(RequestId);

/// Default upload ceiling: 5 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// A disease classification returned by the prediction endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_disease: String,
    /// Probability in `[0, 1]`.
    pub confidence: f64,
    pub treatment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PredictionResult {
    /// Confidence as a two-decimal percentage, e.g. `0.87` -> `"87.00%"`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", self.confidence * 100.0)
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Predicted Disease: {}", self.predicted_disease),
            format!("Confidence: {}", self.confidence_percent()),
            format!("Treatment: {}", self.treatment),
        ];
        if let Some(description) = &self.description {
            lines.push(format!("Description: {description}"));
        }
        lines
    }
}

/// Pixel rectangle chosen in the crop tool, relative to the preview image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Output of an interactive crop: the rectangle and, when the view rendered
/// it, the encoded image data of the cropped area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CroppedImage {
    pub rect: CropRect,
    pub data: Option<Vec<u8>>,
}

impl CroppedImage {
    pub fn from_rect(rect: CropRect) -> Self {
        Self { rect, data: None }
    }
}
