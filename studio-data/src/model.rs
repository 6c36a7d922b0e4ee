//! Model metadata as reported by the backend library endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ─── Pipeline tag ────────────────────────────────────────────────────────────

/// The kind of ML task a model performs. Drives every adaptation branch.
///
/// Parsed case-insensitively; tags this client has no specialised handling
/// for are kept verbatim in `Other` so they can still be shown and sent.
/// A null tag is the same as a missing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum PipelineTag {
    ObjectDetection,
    ImageSegmentation,
    ZeroShotObjectDetection,
    TextClassification,
    ZeroShotClassification,
    FeatureExtraction,
    TextGeneration,
    TextToSpeech,
    Translation,
    Other(String),
}

impl PipelineTag {
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        match tag.to_lowercase().as_str() {
            "object-detection" => Self::ObjectDetection,
            "image-segmentation" => Self::ImageSegmentation,
            "zero-shot-object-detection" => Self::ZeroShotObjectDetection,
            "text-classification" => Self::TextClassification,
            "zero-shot-classification" => Self::ZeroShotClassification,
            "feature-extraction" => Self::FeatureExtraction,
            "text-generation" => Self::TextGeneration,
            "text-to-speech" => Self::TextToSpeech,
            "translation" => Self::Translation,
            _ => Self::Other(tag.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ObjectDetection => "object-detection",
            Self::ImageSegmentation => "image-segmentation",
            Self::ZeroShotObjectDetection => "zero-shot-object-detection",
            Self::TextClassification => "text-classification",
            Self::ZeroShotClassification => "zero-shot-classification",
            Self::FeatureExtraction => "feature-extraction",
            Self::TextGeneration => "text-generation",
            Self::TextToSpeech => "text-to-speech",
            Self::Translation => "translation",
            Self::Other(tag) => tag,
        }
    }

    /// Display label for lists and status lines
    pub fn label(&self) -> &str {
        match self {
            Self::ObjectDetection => "Object Detection",
            Self::ImageSegmentation => "Image Segmentation",
            Self::ZeroShotObjectDetection => "Zero-Shot Object Detection",
            Self::TextClassification => "Text Classification",
            Self::ZeroShotClassification => "Zero-Shot Classification",
            Self::FeatureExtraction => "Feature Extraction",
            Self::TextGeneration => "Text Generation",
            Self::TextToSpeech => "Text to Speech",
            Self::Translation => "Translation",
            Self::Other(tag) if tag.is_empty() => "Unknown",
            Self::Other(tag) => tag,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl Default for PipelineTag {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for PipelineTag {
    fn from(tag: String) -> Self {
        Self::parse(&tag)
    }
}

impl From<Option<String>> for PipelineTag {
    fn from(tag: Option<String>) -> Self {
        tag.map(Self::from).unwrap_or_default()
    }
}

impl From<&str> for PipelineTag {
    fn from(tag: &str) -> Self {
        Self::parse(tag)
    }
}

impl From<PipelineTag> for String {
    fn from(tag: PipelineTag) -> Self {
        tag.as_str().to_string()
    }
}

impl std::fmt::Display for PipelineTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Model ───────────────────────────────────────────────────────────────────

/// A loadable inference unit known to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Unique identifier sent as `model_id` in every request
    pub model_id: String,
    #[serde(default)]
    pub pipeline_tag: PipelineTag,
    /// Whether the backend currently has the model loaded
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_online: bool,
    /// Free-form backend configuration
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Model {
    pub fn new(model_id: impl Into<String>, pipeline_tag: impl Into<PipelineTag>) -> Self {
        Self {
            model_id: model_id.into(),
            pipeline_tag: pipeline_tag.into(),
            is_online: false,
            config: Map::new(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_online {
            "Online"
        } else {
            "Offline"
        }
    }
}
