//! Turns the backend's `data` value into something the view can show.

use serde_json::Value;
use std::path::PathBuf;

use studio_data::{InferenceError, InferenceResult, PipelineTag};

use crate::audio::AudioLocator;
use crate::payload::{is_blank, LineLayout};

pub const NO_TRANSLATION: &str = "No translation available.";

/// Exactly one of these is produced per inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationModel {
    PlainText(String),
    MultilineText(String),
    AudioReference(PathBuf),
    RawStructured(String),
}

impl PresentationModel {
    /// The text a plain terminal or label would show.
    pub fn display_text(&self) -> String {
        match self {
            Self::PlainText(text) | Self::MultilineText(text) | Self::RawStructured(text) => text.clone(),
            Self::AudioReference(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub presentation: PresentationModel,
    /// Raw JSON shown underneath the main result
    pub secondary_text: Option<String>,
    pub audio_available: bool,
}

impl Interpretation {
    fn primary(presentation: PresentationModel) -> Self {
        Self {
            presentation,
            secondary_text: None,
            audio_available: false,
        }
    }
}

pub struct ResponseInterpreter {
    audio: AudioLocator,
}

impl ResponseInterpreter {
    pub fn new(audio: AudioLocator) -> Self {
        Self { audio }
    }

    /// `layout` is the translation input captured when the request was built.
    pub fn interpret(
        &self,
        tag: &PipelineTag,
        data: &Value,
        layout: Option<&LineLayout>,
    ) -> InferenceResult<Interpretation> {
        match tag {
            PipelineTag::TextGeneration => {
                let text = match data {
                    Value::String(text) => text.clone(),
                    other => pretty(other),
                };
                Ok(Interpretation::primary(PresentationModel::PlainText(text)))
            }
            PipelineTag::Translation => Ok(Interpretation::primary(interpret_translation(data, layout))),
            PipelineTag::TextToSpeech => self.interpret_speech(data),
            PipelineTag::ObjectDetection
            | PipelineTag::ImageSegmentation
            | PipelineTag::ZeroShotObjectDetection
            | PipelineTag::TextClassification
            | PipelineTag::ZeroShotClassification
            | PipelineTag::FeatureExtraction
            | PipelineTag::Other(_) => Ok(Interpretation::primary(format_default(data))),
        }
    }

    fn interpret_speech(&self, data: &Value) -> InferenceResult<Interpretation> {
        let audio_path = data
            .get("audio_path")
            .and_then(Value::as_str)
            .ok_or_else(|| InferenceError::format("text-to-speech response has no audio_path"))?;

        let path = self.audio.resolve(audio_path).ok_or_else(|| {
            InferenceError::resource(format!("audio file '{}' was not found locally", audio_path))
        })?;

        Ok(Interpretation {
            presentation: PresentationModel::AudioReference(path),
            secondary_text: Some(pretty(data)),
            audio_available: true,
        })
    }
}

/// Pretty-printed dump; the fallback for every task without a formatter.
pub fn format_default(data: &Value) -> PresentationModel {
    PresentationModel::RawStructured(pretty(data))
}

fn pretty(data: &Value) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

fn interpret_translation(data: &Value, layout: Option<&LineLayout>) -> PresentationModel {
    let Some(items) = data.as_array() else {
        log::warn!("translation response is not a list: {}", data);
        return PresentationModel::PlainText(NO_TRANSLATION.to_string());
    };

    let translated: Vec<&str> = items
        .iter()
        .filter_map(|item| item.get("translation_text").and_then(Value::as_str))
        .collect();

    let Some(layout) = layout else {
        return PresentationModel::MultilineText(translated.join("\n"));
    };

    PresentationModel::MultilineText(reassemble(layout, &translated).join("\n"))
}

/// One output line per original line: blanks stay blank, the rest take the
/// next translation in order. Once the translations run out, the remaining
/// non-blank lines produce no output at all.
pub fn reassemble<'a>(layout: &LineLayout, translated: &[&'a str]) -> Vec<&'a str> {
    let mut next = translated.iter();
    let mut out = Vec::with_capacity(layout.lines().len());
    for line in layout.lines() {
        if is_blank(line) {
            out.push("");
        } else if let Some(t) = next.next() {
            out.push(*t);
        }
    }
    out
}
