//! Product intake data model: the image blob plus seller-supplied
//! metadata that every downstream stage consumes read-only.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size ceiling for an accepted product image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

// ── Closed enumerations ────────────────────────────────

/// Supported output aspect ratios. Wire labels match the `"W:H"` strings
/// the model endpoints expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
}

impl AspectRatio {
    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
        }
    }
}

/// What kind of marketing shot a scene is planned as. Determines
/// downstream rendering only; the orchestrator never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneCategory {
    /// Plain environment shot with no overlaid copy.
    #[serde(rename = "scene")]
    PlainDisplay,
    /// Selling-point callout composition, may carry short text.
    #[serde(rename = "marketing")]
    FeatureCallout,
    /// Long-form detail-page breakdown panel.
    #[serde(rename = "aplus")]
    StructuredBreakdown,
}

/// Language any generated in-image text (and the analysis summary)
/// should be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    Zh,
    En,
    Ru,
}

impl TargetLanguage {
    pub fn english_name(&self) -> &'static str {
        match self {
            TargetLanguage::Zh => "Simplified Chinese",
            TargetLanguage::En => "English",
            TargetLanguage::Ru => "Russian",
        }
    }
}

// ── Image blob ─────────────────────────────────────────

/// Opaque still-image payload with its MIME tag. The engine never
/// interprets the pixels beyond format sniffing at intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageBlob {
    pub mime: String,
    pub data: Vec<u8>,
}

impl ImageBlob {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }

    /// Parse a `data:<mime>;base64,<payload>` URL back into a blob.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (mime, payload) = rest.split_once(";base64,")?;
        let data = general_purpose::STANDARD.decode(payload).ok()?;
        Some(Self {
            mime: mime.to_string(),
            data,
        })
    }

    /// Sniff the actual image format from the leading bytes, independent
    /// of whatever MIME tag the source claimed.
    pub fn sniffed_mime(&self) -> Option<&'static str> {
        match image::guess_format(&self.data).ok()? {
            image::ImageFormat::Png => Some("image/png"),
            image::ImageFormat::Jpeg => Some("image/jpeg"),
            image::ImageFormat::WebP => Some("image/webp"),
            _ => None,
        }
    }
}

// ── Generation configuration ───────────────────────────

/// One row of the "which shots, how many, what shape" selection the user
/// makes at intake time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(rename = "type")]
    pub category: SceneCategory,
    pub label: String,
    pub count: usize,
    pub aspect_ratio: AspectRatio,
    pub enabled: bool,
}

/// The stock selection offered before the user touches anything: two
/// plain scene shots on, callout and detail-page panels off.
pub fn default_generation_configs() -> Vec<GenerationConfig> {
    vec![
        GenerationConfig {
            category: SceneCategory::PlainDisplay,
            label: "Scene shots".to_string(),
            count: 2,
            aspect_ratio: AspectRatio::Square,
            enabled: true,
        },
        GenerationConfig {
            category: SceneCategory::FeatureCallout,
            label: "Selling-point callouts".to_string(),
            count: 1,
            aspect_ratio: AspectRatio::Portrait3x4,
            enabled: false,
        },
        GenerationConfig {
            category: SceneCategory::StructuredBreakdown,
            label: "Detail-page panels".to_string(),
            count: 1,
            aspect_ratio: AspectRatio::Portrait9x16,
            enabled: false,
        },
    ]
}

// ── Product input ──────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("product name must not be empty")]
    EmptyName,
    #[error("image is {0} bytes, over the {MAX_IMAGE_BYTES} byte ceiling")]
    ImageTooLarge(usize),
    #[error("unsupported image payload: {0}")]
    UnsupportedImage(String),
}

/// Everything the planning and generation stages need about one product.
/// Produced once at intake (manual upload, URL fetch or catalog lookup)
/// and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub selling_points: String,
    pub image: ImageBlob,
    pub source_url: Option<String>,
    pub target_language: TargetLanguage,
    pub remove_background: bool,
    pub generation_configs: Vec<GenerationConfig>,
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() {
            return Err(ProductError::EmptyName);
        }
        if self.image.data.len() > MAX_IMAGE_BYTES {
            return Err(ProductError::ImageTooLarge(self.image.data.len()));
        }
        match self.image.sniffed_mime() {
            Some(_) => Ok(()),
            None => Err(ProductError::UnsupportedImage(self.image.mime.clone())),
        }
    }

    /// Configs the user actually switched on.
    pub fn enabled_configs(&self) -> impl Iterator<Item = &GenerationConfig> {
        self.generation_configs.iter().filter(|c| c.enabled)
    }
}
