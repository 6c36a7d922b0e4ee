//! Builds the task-shaped `data` value sent with an inference request.
//!
//! Validation happens here, before anything touches the network. A request
//! that fails validation never reaches the backend.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use studio_data::{InferenceError, InferenceResult, PipelineTag};

use crate::video::is_video_path;

/// What the user has entered in the inference view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInput {
    pub text: String,
    pub file_path: Option<PathBuf>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_path: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            text: String::new(),
            file_path: Some(path.into()),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// The selected file, treating an empty path as no selection.
    fn selected_file(&self) -> Option<&Path> {
        self.file_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestPayload {
    Text(String),
    Lines(Vec<String>),
    Image {
        image_path: String,
    },
    ZeroShotImage {
        image_path: String,
        candidate_labels: Vec<String>,
    },
}

impl RequestPayload {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The image this payload refers to, for the process-image follow-up.
    pub fn image_path(&self) -> Option<&str> {
        match self {
            Self::Image { image_path } | Self::ZeroShotImage { image_path, .. } => Some(image_path),
            _ => None,
        }
    }
}

/// The original input lines of a translation, blanks included.
///
/// Kept for one round trip so translated lines can be put back around the
/// blank lines they replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineLayout {
    lines: Vec<String>,
}

impl LineLayout {
    /// Splits on `\n`, `\r\n` and `\r`.
    pub fn from_text(text: &str) -> Self {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        Self {
            lines: normalized.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The lines that actually get translated, in order.
    pub fn translatable(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|l| !is_blank(l))
            .cloned()
            .collect()
    }
}

pub(crate) fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedRequest {
    /// One `POST /model/inference` call
    SingleShot {
        payload: RequestPayload,
        /// Present for translation only
        layout: Option<LineLayout>,
    },
    /// Frame-by-frame over the live channel
    LiveVideo { video_path: PathBuf },
}

pub fn build_request(tag: &PipelineTag, input: &UserInput) -> InferenceResult<PreparedRequest> {
    match tag {
        PipelineTag::ObjectDetection | PipelineTag::ImageSegmentation => {
            let path = require_file(input)?;
            if is_video_path(path) {
                if *tag != PipelineTag::ObjectDetection {
                    return Err(InferenceError::validation(
                        "Video input is only supported for object detection.",
                    ));
                }
                return Ok(PreparedRequest::LiveVideo {
                    video_path: path.to_path_buf(),
                });
            }
            Ok(single(RequestPayload::Image {
                image_path: path_string(path),
            }))
        }
        PipelineTag::ZeroShotObjectDetection => {
            let path = require_file(input)?;
            if is_video_path(path) {
                return Err(InferenceError::validation(
                    "Video input is only supported for object detection.",
                ));
            }
            let candidate_labels = split_labels(&input.text);
            if candidate_labels.is_empty() {
                return Err(InferenceError::validation(
                    "Please enter the labels to detect, separated by commas.",
                ));
            }
            Ok(single(RequestPayload::ZeroShotImage {
                image_path: path_string(path),
                candidate_labels,
            }))
        }
        PipelineTag::TextClassification
        | PipelineTag::ZeroShotClassification
        | PipelineTag::FeatureExtraction
        | PipelineTag::TextGeneration
        | PipelineTag::TextToSpeech => {
            require_text(input)?;
            Ok(single(RequestPayload::Text(input.text.clone())))
        }
        PipelineTag::Translation => {
            let layout = LineLayout::from_text(&input.text);
            let lines = layout.translatable();
            if lines.is_empty() {
                return Err(InferenceError::validation("Please enter text to translate."));
            }
            Ok(PreparedRequest::SingleShot {
                payload: RequestPayload::Lines(lines),
                layout: Some(layout),
            })
        }
        PipelineTag::Other(_) => {
            require_text(input)?;
            Ok(single(RequestPayload::Text(input.text.clone())))
        }
    }
}

/// Comma-separated labels, trimmed, empties dropped, order kept.
pub fn split_labels(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn single(payload: RequestPayload) -> PreparedRequest {
    PreparedRequest::SingleShot { payload, layout: None }
}

fn require_file(input: &UserInput) -> InferenceResult<&Path> {
    input
        .selected_file()
        .ok_or_else(|| InferenceError::validation("Please select a file first."))
}

fn require_text(input: &UserInput) -> InferenceResult<()> {
    if is_blank(&input.text) {
        return Err(InferenceError::validation("Please enter some text first."));
    }
    Ok(())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_line_layout_keeps_blank_positions() {
        let layout = LineLayout::from_text("Hello\n\nWorld");
        assert_eq!(layout.lines(), ["Hello", "", "World"]);
        assert_eq!(layout.translatable(), ["Hello", "World"]);
    }

    #[test]
    fn test_line_layout_normalizes_line_endings() {
        let layout = LineLayout::from_text("a\r\nb\rc\n");
        assert_eq!(layout.lines(), ["a", "b", "c", ""]);
    }

    #[test]
    fn test_translation_payload() {
        let request = build_request(&PipelineTag::Translation, &UserInput::text("Hello\r\n\r\nWorld")).unwrap();
        let PreparedRequest::SingleShot { payload, layout } = request else {
            panic!("translation is single-shot");
        };
        assert_eq!(payload.to_value(), json!(["Hello", "World"]));
        assert_eq!(layout.unwrap().lines().len(), 3);
    }

    #[test]
    fn test_translation_of_only_blank_lines_is_invalid() {
        let err = build_request(&PipelineTag::Translation, &UserInput::text("\n  \n")).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_zero_shot_labels_are_trimmed_in_order() {
        let input = UserInput::file("/tmp/a.jpg").with_text("cat, dog , bird");
        let request = build_request(&PipelineTag::ZeroShotObjectDetection, &input).unwrap();

        let PreparedRequest::SingleShot { payload, .. } = request else {
            panic!("zero-shot is single-shot");
        };
        assert_eq!(
            payload,
            RequestPayload::ZeroShotImage {
                image_path: "/tmp/a.jpg".to_string(),
                candidate_labels: vec!["cat".into(), "dog".into(), "bird".into()],
            }
        );
        assert_eq!(
            payload.to_value(),
            json!({ "image_path": "/tmp/a.jpg", "candidate_labels": ["cat", "dog", "bird"] })
        );
    }

    #[test]
    fn test_zero_shot_requires_labels() {
        let input = UserInput::file("/tmp/a.jpg").with_text(" , ");
        let err = build_request(&PipelineTag::ZeroShotObjectDetection, &input).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_object_detection_requires_file() {
        for input in [UserInput::default(), UserInput::file("")] {
            let err = build_request(&PipelineTag::ObjectDetection, &input).unwrap_err();
            assert_eq!(err, InferenceError::validation("Please select a file first."));
        }
    }

    #[test]
    fn test_object_detection_video_goes_live() {
        let request = build_request(&PipelineTag::ObjectDetection, &UserInput::file("/videos/street.MP4")).unwrap();
        assert_eq!(
            request,
            PreparedRequest::LiveVideo {
                video_path: PathBuf::from("/videos/street.MP4")
            }
        );

        let err = build_request(&PipelineTag::ImageSegmentation, &UserInput::file("/videos/street.mp4")).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_image_payload_shape() {
        let request = build_request(&PipelineTag::ImageSegmentation, &UserInput::file("/tmp/cat.png")).unwrap();
        let PreparedRequest::SingleShot { payload, layout } = request else {
            panic!("image is single-shot");
        };
        assert!(layout.is_none());
        assert_eq!(payload.image_path(), Some("/tmp/cat.png"));
        assert_eq!(payload.to_value(), json!({ "image_path": "/tmp/cat.png" }));
    }

    #[test]
    fn test_text_tasks_send_text_verbatim() {
        let text = "  Keep   my spacing \n please";
        for tag in ["text-classification", "text-generation", "text-to-speech", "feature-extraction"] {
            let request = build_request(&PipelineTag::parse(tag), &UserInput::text(text)).unwrap();
            let PreparedRequest::SingleShot { payload, .. } = request else {
                panic!("text is single-shot");
            };
            assert_eq!(payload.to_value(), json!(text));
        }
    }

    #[test]
    fn test_blank_text_is_invalid() {
        let err = build_request(&PipelineTag::TextGeneration, &UserInput::text("   ")).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
