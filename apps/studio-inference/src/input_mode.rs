//! Which input controls the inference view shows for a pipeline tag.

use studio_data::PipelineTag;

/// The control the user fills in to start an inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    File,
    Text,
    Chat,
}

/// How the result area renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Text,
    Audio,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputDescriptor {
    /// `None` for tags without specialised input
    pub primary: Option<InputMode>,
    pub file_picker: bool,
    pub text_editor: bool,
    pub chat: bool,
    pub image_preview_button: bool,
    pub output: OutputKind,
}

impl InputDescriptor {
    const UNSUPPORTED: Self = Self {
        primary: None,
        file_picker: false,
        text_editor: false,
        chat: false,
        image_preview_button: false,
        output: OutputKind::Raw,
    };

    const fn text(output: OutputKind) -> Self {
        Self {
            primary: Some(InputMode::Text),
            file_picker: false,
            text_editor: true,
            chat: false,
            image_preview_button: false,
            output,
        }
    }

    const fn image(with_labels: bool) -> Self {
        Self {
            primary: Some(InputMode::File),
            file_picker: true,
            text_editor: with_labels,
            chat: false,
            image_preview_button: true,
            output: OutputKind::Raw,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.primary.is_some()
    }
}

/// Pure and total: every tag maps to exactly one descriptor.
pub fn select_input_mode(tag: &PipelineTag) -> InputDescriptor {
    match tag {
        PipelineTag::ObjectDetection | PipelineTag::ImageSegmentation => InputDescriptor::image(false),
        PipelineTag::ZeroShotObjectDetection => InputDescriptor::image(true),
        PipelineTag::TextClassification
        | PipelineTag::ZeroShotClassification
        | PipelineTag::FeatureExtraction => InputDescriptor::text(OutputKind::Raw),
        PipelineTag::Translation => InputDescriptor::text(OutputKind::Text),
        PipelineTag::TextToSpeech => InputDescriptor::text(OutputKind::Audio),
        PipelineTag::TextGeneration => InputDescriptor {
            primary: Some(InputMode::Chat),
            file_picker: false,
            text_editor: false,
            chat: true,
            image_preview_button: false,
            output: OutputKind::Text,
        },
        PipelineTag::Other(_) => InputDescriptor::UNSUPPORTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPORTED: [&str; 9] = [
        "object-detection",
        "image-segmentation",
        "zero-shot-object-detection",
        "text-classification",
        "zero-shot-classification",
        "feature-extraction",
        "text-generation",
        "text-to-speech",
        "translation",
    ];

    #[test]
    fn test_exactly_one_primary_surface_per_supported_tag() {
        for tag in SUPPORTED {
            let d = select_input_mode(&PipelineTag::parse(tag));
            assert!(d.is_supported(), "{} should be supported", tag);

            let primary_surface = match d.primary.unwrap() {
                InputMode::File => d.file_picker,
                InputMode::Text => d.text_editor,
                InputMode::Chat => d.chat,
            };
            assert!(primary_surface, "{}: primary control must be visible", tag);
            assert!(!(d.file_picker && d.chat), "{}: file and chat together", tag);
            assert!(!(d.text_editor && d.chat), "{}: editor and chat together", tag);
        }
    }

    #[test]
    fn test_selection_is_case_insensitive_and_stable() {
        let lower = select_input_mode(&PipelineTag::parse("text-to-speech"));
        let upper = select_input_mode(&PipelineTag::parse("Text-To-Speech"));
        assert_eq!(lower, upper);
        assert_eq!(lower, select_input_mode(&PipelineTag::parse("text-to-speech")));
        assert_eq!(lower.output, OutputKind::Audio);
    }

    #[test]
    fn test_zero_shot_vision_shows_label_editor() {
        let d = select_input_mode(&PipelineTag::ZeroShotObjectDetection);
        assert_eq!(d.primary, Some(InputMode::File));
        assert!(d.file_picker && d.text_editor && d.image_preview_button);
    }

    #[test]
    fn test_unknown_and_missing_tags_fall_back() {
        for tag in ["depth-estimation", ""] {
            let d = select_input_mode(&PipelineTag::parse(tag));
            assert_eq!(d.primary, None);
            assert!(!d.file_picker && !d.text_editor && !d.chat);
            assert_eq!(d.output, OutputKind::Raw);
        }
    }
}
