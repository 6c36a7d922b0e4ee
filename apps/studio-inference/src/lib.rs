//! Adapts one inference view to a model's pipeline tag: which input to show,
//! what to send, how to read the answer back.

pub mod audio;
pub mod input_mode;
pub mod interpret;
pub mod payload;
pub mod session;
pub mod video;

pub use audio::AudioLocator;
pub use input_mode::{select_input_mode, InputDescriptor, InputMode, OutputKind};
pub use interpret::{format_default, Interpretation, PresentationModel, ResponseInterpreter, NO_TRANSLATION};
pub use payload::{build_request, split_labels, LineLayout, PreparedRequest, RequestPayload, UserInput};
pub use session::{ChatRole, ChatTurn, InferenceOutcome, InferenceSession, SessionEvent, SessionPhase, VideoOpener};
pub use video::{run_live_stream, FfmpegFrameSource, FrameSource, StreamEnd, StreamSummary};
