//! The inference orchestrator behind one inference view.
//!
//! Work runs on background threads; results come back over an mpsc channel
//! and are only applied when the owner calls [`InferenceSession::poll`] from
//! its UI loop, so all view state is touched from a single thread.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use uuid::Uuid;

use studio_data::{InferenceBackend, InferenceError, InferenceResult, Model, PipelineTag};

use crate::input_mode::{select_input_mode, InputDescriptor};
use crate::interpret::{format_default, PresentationModel, ResponseInterpreter};
use crate::payload::{build_request, LineLayout, PreparedRequest, UserInput};
use crate::video::{run_live_stream, FfmpegFrameSource, FrameSource, StreamSummary};

/// Opens the frame source for a video file.
pub type VideoOpener = Arc<dyn Fn(&Path) -> InferenceResult<Box<dyn FrameSource>> + Send + Sync>;

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    ValidatingInput,
    Dispatching,
    AwaitingResponse,
    Streaming,
    Interpreting,
    Presenting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceOutcome {
    pub run_id: Uuid,
    pub presentation: PresentationModel,
    pub secondary_text: Option<String>,
    pub audio_available: bool,
    /// Set for single-shot vision runs when the backend rendered the result
    pub annotated_image_url: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

/// What changed during a [`InferenceSession::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Presented(InferenceOutcome),
    Prediction { frame_index: usize, prediction: Value },
    StreamEnded(StreamSummary),
    Failed(InferenceError),
}

enum SessionUpdate {
    Response {
        run_id: Uuid,
        result: InferenceResult<Value>,
        annotated_image_url: Option<String>,
    },
    Prediction {
        run_id: Uuid,
        frame_index: usize,
        prediction: Value,
    },
    StreamFinished {
        run_id: Uuid,
        result: InferenceResult<StreamSummary>,
    },
}

struct PendingRun {
    run_id: Uuid,
    layout: Option<LineLayout>,
    prompt: String,
    last_prediction: Option<Value>,
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct InferenceSession {
    model: Model,
    descriptor: InputDescriptor,
    backend: Arc<dyn InferenceBackend>,
    interpreter: ResponseInterpreter,
    open_video: VideoOpener,

    phase: SessionPhase,
    pending: Option<PendingRun>,
    update_rx: Option<Receiver<SessionUpdate>>,
    // Shared with the live streaming thread
    cancel: Option<Arc<AtomicBool>>,

    outcome: Option<InferenceOutcome>,
    last_error: Option<InferenceError>,
    chat: Vec<ChatTurn>,
}

impl InferenceSession {
    pub fn new(model: Model, backend: Arc<dyn InferenceBackend>, interpreter: ResponseInterpreter) -> Self {
        let descriptor = select_input_mode(&model.pipeline_tag);
        Self {
            model,
            descriptor,
            backend,
            interpreter,
            open_video: Arc::new(|path: &Path| {
                FfmpegFrameSource::open(path).map(|s| Box::new(s) as Box<dyn FrameSource>)
            }),
            phase: SessionPhase::Idle,
            pending: None,
            update_rx: None,
            cancel: None,
            outcome: None,
            last_error: None,
            chat: Vec::new(),
        }
    }

    pub fn with_video_opener(mut self, opener: VideoOpener) -> Self {
        self.open_video = opener;
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn descriptor(&self) -> &InputDescriptor {
        &self.descriptor
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != SessionPhase::Idle
    }

    pub fn outcome(&self) -> Option<&InferenceOutcome> {
        self.outcome.as_ref()
    }

    pub fn last_error(&self) -> Option<&InferenceError> {
        self.last_error.as_ref()
    }

    pub fn chat(&self) -> &[ChatTurn] {
        &self.chat
    }

    pub fn audio_available(&self) -> bool {
        self.outcome.as_ref().map(|o| o.audio_available).unwrap_or(false)
    }

    /// Start one inference. Validation failures return immediately and
    /// leave the session idle with the error recorded.
    ///
    /// The previous outcome is cleared, so a failed run never shows the
    /// result of the one before it.
    pub fn submit(&mut self, input: UserInput) -> InferenceResult<Uuid> {
        if self.is_busy() {
            return Err(InferenceError::Busy);
        }

        self.outcome = None;
        self.last_error = None;
        self.transition(SessionPhase::ValidatingInput);
        let request = match build_request(&self.model.pipeline_tag, &input) {
            Ok(request) => request,
            Err(e) => {
                log::info!("{}: invalid input: {}", self.model.model_id, e);
                self.last_error = Some(e.clone());
                self.transition(SessionPhase::Idle);
                return Err(e);
            }
        };

        let run_id = Uuid::now_v7();
        self.transition(SessionPhase::Dispatching);

        let (tx, rx) = mpsc::channel();
        self.update_rx = Some(rx);

        let layout = match request {
            PreparedRequest::SingleShot { payload, layout } => {
                log::info!("{}: dispatching run {}", self.model.model_id, run_id);
                let backend = self.backend.clone();
                let model_id = self.model.model_id.clone();
                let task = self.model.pipeline_tag.clone();
                let data = payload.to_value();
                let image_path = payload.image_path().map(str::to_string);

                std::thread::spawn(move || {
                    let result = backend.infer(&model_id, &data);
                    let annotated_image_url = match (&result, image_path) {
                        (Ok(output), Some(path)) => fetch_annotation(backend.as_ref(), &path, output, &task),
                        _ => None,
                    };
                    let _ = tx.send(SessionUpdate::Response {
                        run_id,
                        result,
                        annotated_image_url,
                    });
                });
                self.transition(SessionPhase::AwaitingResponse);
                layout
            }
            PreparedRequest::LiveVideo { video_path } => {
                log::info!("{}: streaming {:?} (run {})", self.model.model_id, video_path, run_id);
                let cancel = Arc::new(AtomicBool::new(false));
                self.cancel = Some(cancel.clone());

                let backend = self.backend.clone();
                let opener = self.open_video.clone();
                let model_id = self.model.model_id.clone();

                std::thread::spawn(move || {
                    let result = run_live_pass(backend.as_ref(), &opener, &model_id, &video_path, &cancel, run_id, &tx);
                    let _ = tx.send(SessionUpdate::StreamFinished { run_id, result });
                });
                self.transition(SessionPhase::Streaming);
                None
            }
        };

        self.pending = Some(PendingRun {
            run_id,
            layout,
            prompt: input.text,
            last_prediction: None,
        });
        Ok(run_id)
    }

    /// Ask a running video pass to stop after the current frame.
    /// Single-shot calls cannot be cancelled.
    pub fn cancel(&self) -> bool {
        match &self.cancel {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Apply everything the background thread has delivered so far.
    /// Call once per UI frame.
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        loop {
            let Some(rx) = &self.update_rx else { break };
            match rx.try_recv() {
                Ok(update) => self.apply(update, &mut events),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.is_busy() {
                        self.fail(InferenceError::network("worker stopped unexpectedly"), &mut events);
                    }
                    self.update_rx = None;
                    break;
                }
            }
        }
        events
    }

    fn apply(&mut self, update: SessionUpdate, events: &mut Vec<SessionEvent>) {
        let current = self.pending.as_ref().map(|p| p.run_id);
        match update {
            SessionUpdate::Response {
                run_id,
                result,
                annotated_image_url,
            } if Some(run_id) == current => match result {
                Ok(data) => self.present(data, annotated_image_url, events),
                Err(e) => self.fail(e, events),
            },
            SessionUpdate::Prediction {
                run_id,
                frame_index,
                prediction,
            } if Some(run_id) == current => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.last_prediction = Some(prediction.clone());
                }
                events.push(SessionEvent::Prediction {
                    frame_index,
                    prediction,
                });
            }
            SessionUpdate::StreamFinished { run_id, result } if Some(run_id) == current => match result {
                Ok(summary) => self.finish_stream(summary, events),
                Err(e) => self.fail(e, events),
            },
            _ => log::debug!("dropping update for a stale run"),
        }
    }

    fn present(&mut self, data: Value, annotated_image_url: Option<String>, events: &mut Vec<SessionEvent>) {
        self.transition(SessionPhase::Interpreting);
        let Some(pending) = self.pending.take() else { return };

        let interpretation = match self
            .interpreter
            .interpret(&self.model.pipeline_tag, &data, pending.layout.as_ref())
        {
            Ok(interpretation) => interpretation,
            Err(e) => {
                self.fail(e, events);
                return;
            }
        };

        self.transition(SessionPhase::Presenting);
        if self.model.pipeline_tag == PipelineTag::TextGeneration {
            self.chat.push(ChatTurn {
                role: ChatRole::User,
                text: pending.prompt,
            });
            self.chat.push(ChatTurn {
                role: ChatRole::Assistant,
                text: interpretation.presentation.display_text(),
            });
        }

        let outcome = InferenceOutcome {
            run_id: pending.run_id,
            presentation: interpretation.presentation,
            secondary_text: interpretation.secondary_text,
            audio_available: interpretation.audio_available,
            annotated_image_url,
            finished_at: Utc::now(),
        };
        self.outcome = Some(outcome.clone());
        events.push(SessionEvent::Presented(outcome));
        self.finish();
    }

    fn finish_stream(&mut self, summary: StreamSummary, events: &mut Vec<SessionEvent>) {
        self.transition(SessionPhase::Interpreting);
        let Some(pending) = self.pending.take() else { return };
        log::info!(
            "{}: stream ended ({:?}) after {} frames, {} sent",
            self.model.model_id,
            summary.end,
            summary.frames_read,
            summary.frames_sent
        );

        self.transition(SessionPhase::Presenting);
        let presentation = match &pending.last_prediction {
            Some(prediction) => format_default(prediction),
            None => PresentationModel::PlainText("No frames were processed.".to_string()),
        };
        let outcome = InferenceOutcome {
            run_id: pending.run_id,
            presentation,
            secondary_text: None,
            audio_available: false,
            annotated_image_url: None,
            finished_at: Utc::now(),
        };
        self.outcome = Some(outcome.clone());
        events.push(SessionEvent::StreamEnded(summary));
        events.push(SessionEvent::Presented(outcome));
        self.finish();
    }

    fn fail(&mut self, error: InferenceError, events: &mut Vec<SessionEvent>) {
        log::warn!("{}: inference failed ({}): {}", self.model.model_id, error.kind(), error);
        self.pending = None;
        self.last_error = Some(error.clone());
        events.push(SessionEvent::Failed(error));
        self.finish();
    }

    fn finish(&mut self) {
        self.update_rx = None;
        self.cancel = None;
        self.transition(SessionPhase::Idle);
    }

    fn transition(&mut self, next: SessionPhase) {
        log::trace!("{}: {:?} -> {:?}", self.model.model_id, self.phase, next);
        self.phase = next;
    }
}

// ── Background work ──────────────────────────────────────────────────────────

/// Ask the backend to render the vision result. Failures only cost the preview.
fn fetch_annotation(backend: &dyn InferenceBackend, image_path: &str, output: &Value, task: &PipelineTag) -> Option<String> {
    match backend.process_image(image_path, output, task.as_str()) {
        Ok(reply) => reply.get("image_url").and_then(Value::as_str).map(str::to_string),
        Err(e) => {
            log::warn!("process-image for {} failed: {}", image_path, e);
            None
        }
    }
}

fn run_live_pass(
    backend: &dyn InferenceBackend,
    opener: &VideoOpener,
    model_id: &str,
    video_path: &Path,
    cancel: &AtomicBool,
    run_id: Uuid,
    tx: &Sender<SessionUpdate>,
) -> InferenceResult<StreamSummary> {
    let mut source = opener(video_path)?;
    let mut channel = backend.open_live(model_id)?;

    run_live_stream(source.as_mut(), channel.as_mut(), cancel, |frame_index, reply| {
        let prediction = serde_json::from_str(&reply).unwrap_or(Value::String(reply));
        let _ = tx.send(SessionUpdate::Prediction {
            run_id,
            frame_index,
            prediction,
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioLocator;
    use crate::video::tests::{ChannelLog, StubChannel, StubSource};
    use crate::video::StreamEnd;
    use image::RgbImage;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use studio_data::FrameChannel;

    struct MockBackend {
        calls: AtomicUsize,
        reply: InferenceResult<Value>,
        delay: Duration,
        channel_log: Arc<Mutex<ChannelLog>>,
    }

    impl MockBackend {
        fn replying(reply: InferenceResult<Value>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply,
                delay: Duration::ZERO,
                channel_log: Arc::new(Mutex::new(ChannelLog::default())),
            })
        }
    }

    impl InferenceBackend for MockBackend {
        fn infer(&self, _model_id: &str, _data: &Value) -> InferenceResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.reply.clone()
        }

        fn process_image(&self, image_path: &str, _output: &Value, task: &str) -> InferenceResult<Value> {
            Ok(json!({ "image_url": format!("/static/{}/{}", task, image_path.trim_start_matches('/')) }))
        }

        fn open_live(&self, _model_id: &str) -> InferenceResult<Box<dyn FrameChannel>> {
            Ok(Box::new(StubChannel::new(self.channel_log.clone())))
        }
    }

    /// Endless source that hands out a frame only once `released` allows it.
    struct GatedSource {
        released: Arc<AtomicUsize>,
        read: usize,
    }

    impl FrameSource for GatedSource {
        fn next_frame(&mut self) -> InferenceResult<Option<RgbImage>> {
            while self.read >= self.released.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            self.read += 1;
            Ok(Some(RgbImage::from_pixel(8, 6, image::Rgb([10, 10, 10]))))
        }
    }

    fn session(tag: &str, backend: Arc<MockBackend>) -> InferenceSession {
        InferenceSession::new(Model::new("m", tag), backend, ResponseInterpreter::new(AudioLocator::default()))
    }

    fn wait_idle(session: &mut InferenceSession) -> Vec<SessionEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while session.is_busy() {
            assert!(Instant::now() < deadline, "session did not finish");
            events.extend(session.poll());
            std::thread::sleep(Duration::from_millis(5));
        }
        events
    }

    #[test]
    fn test_missing_file_never_reaches_backend() {
        let backend = MockBackend::replying(Ok(json!([])));
        let mut session = session("object-detection", backend.clone());

        let err = session.submit(UserInput::file("")).unwrap_err();

        assert_eq!(err.kind(), "validation");
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.last_error(), Some(&err));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_translation_end_to_end() {
        let backend = MockBackend::replying(Ok(json!([
            { "translation_text": "Bonjour" },
            { "translation_text": "Monde" }
        ])));
        let mut session = session("translation", backend.clone());

        session.submit(UserInput::text("Hello\n\nWorld")).unwrap();
        let events = wait_idle(&mut session);

        assert_eq!(events.len(), 1);
        let outcome = session.outcome().unwrap();
        assert_eq!(outcome.presentation, PresentationModel::MultilineText("Bonjour\n\nMonde".into()));
        assert!(session.last_error().is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_network_error_returns_to_idle() {
        let backend = MockBackend::replying(Err(InferenceError::network("connection refused")));
        let mut session = session("text-classification", backend);

        session.submit(UserInput::text("great movie")).unwrap();
        let events = wait_idle(&mut session);

        assert_eq!(events, vec![SessionEvent::Failed(InferenceError::network("connection refused"))]);
        assert!(session.outcome().is_none());
        assert_eq!(session.last_error().unwrap().kind(), "network");
    }

    #[test]
    fn test_second_submit_while_running_is_busy() {
        let backend = Arc::new(MockBackend {
            calls: AtomicUsize::new(0),
            reply: Ok(json!("hi")),
            delay: Duration::from_millis(200),
            channel_log: Arc::new(Mutex::new(ChannelLog::default())),
        });
        let mut session = session("text-generation", backend.clone());

        session.submit(UserInput::text("hello")).unwrap();
        assert_eq!(session.submit(UserInput::text("again")), Err(InferenceError::Busy));
        wait_idle(&mut session);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_text_generation_keeps_transcript() {
        let backend = MockBackend::replying(Ok(json!("General Kenobi")));
        let mut session = session("text-generation", backend);

        session.submit(UserInput::text("Hello there")).unwrap();
        wait_idle(&mut session);

        assert_eq!(
            session.chat(),
            [
                ChatTurn { role: ChatRole::User, text: "Hello there".into() },
                ChatTurn { role: ChatRole::Assistant, text: "General Kenobi".into() },
            ]
        );
    }

    #[test]
    fn test_vision_result_is_annotated() {
        let backend = MockBackend::replying(Ok(json!([{ "label": "cat", "score": 0.9 }])));
        let mut session = session("object-detection", backend);

        session.submit(UserInput::file("/tmp/a.jpg")).unwrap();
        wait_idle(&mut session);

        let outcome = session.outcome().unwrap();
        assert_eq!(outcome.annotated_image_url.as_deref(), Some("/static/object-detection/tmp/a.jpg"));
        assert!(matches!(outcome.presentation, PresentationModel::RawStructured(_)));
    }

    #[test]
    fn test_speech_without_local_file_fails_with_resource_error() {
        let root = tempfile::tempdir().unwrap();
        let backend = MockBackend::replying(Ok(json!({ "audio_path": "out.wav" })));
        let mut session = InferenceSession::new(
            Model::new("tts", "text-to-speech"),
            backend,
            ResponseInterpreter::new(AudioLocator::new(vec![root.path().to_path_buf()])),
        );

        session.submit(UserInput::text("Say hi")).unwrap();
        wait_idle(&mut session);

        assert_eq!(session.last_error().unwrap().kind(), "resource");
        assert!(!session.audio_available());
    }

    #[test]
    fn test_live_video_streams_predictions() {
        let backend = MockBackend::replying(Ok(Value::Null));
        let channel_log = backend.channel_log.clone();
        let opener: VideoOpener = Arc::new(|_: &Path| Ok(Box::new(StubSource { remaining: 4 }) as Box<dyn FrameSource>));
        let mut session = session("object-detection", backend.clone()).with_video_opener(opener);

        session.submit(UserInput::file("/videos/street.mp4")).unwrap();
        assert_eq!(session.phase(), SessionPhase::Streaming);
        let events = wait_idle(&mut session);

        let frames: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Prediction { frame_index, .. } => Some(*frame_index),
                _ => None,
            })
            .collect();
        assert_eq!(frames, [0, 2]);
        assert_eq!(
            session.outcome().unwrap().presentation,
            format_default(&json!({ "frame": 2 }))
        );
        assert!(channel_log.lock().unwrap().closed);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_speech_run_clears_previous_audio() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("out.wav"), b"RIFF").unwrap();
        let backend = MockBackend::replying(Ok(json!({ "audio_path": "out.wav" })));
        let mut session = InferenceSession::new(
            Model::new("tts", "text-to-speech"),
            backend,
            ResponseInterpreter::new(AudioLocator::new(vec![root.path().to_path_buf()])),
        );

        session.submit(UserInput::text("first")).unwrap();
        wait_idle(&mut session);
        assert!(session.audio_available());

        std::fs::remove_file(root.path().join("out.wav")).unwrap();
        session.submit(UserInput::text("second")).unwrap();
        wait_idle(&mut session);

        assert_eq!(session.last_error().unwrap().kind(), "resource");
        assert!(!session.audio_available());
        assert!(session.outcome().is_none());
    }

    #[test]
    fn test_invalid_input_clears_previous_outcome() {
        let backend = MockBackend::replying(Ok(json!("ok")));
        let mut session = session("text-generation", backend);

        session.submit(UserInput::text("hi")).unwrap();
        wait_idle(&mut session);
        assert!(session.outcome().is_some());

        assert!(session.submit(UserInput::text("  ")).is_err());
        assert!(session.outcome().is_none());
    }

    #[test]
    fn test_cancel_mid_stream_keeps_sent_frames_and_closes_channel() {
        let backend = MockBackend::replying(Ok(Value::Null));
        let channel_log = backend.channel_log.clone();
        let released = Arc::new(AtomicUsize::new(1));
        let gate = released.clone();
        let opener: VideoOpener = Arc::new(move |_: &Path| {
            Ok(Box::new(GatedSource {
                released: gate.clone(),
                read: 0,
            }) as Box<dyn FrameSource>)
        });
        let mut session = session("object-detection", backend).with_video_opener(opener);

        session.submit(UserInput::file("/videos/street.mp4")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while !events.iter().any(|e| matches!(e, SessionEvent::Prediction { .. })) {
            assert!(Instant::now() < deadline, "no prediction arrived");
            events.extend(session.poll());
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(session.cancel());
        released.store(usize::MAX, Ordering::SeqCst);
        events.extend(wait_idle(&mut session));

        let summary = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::StreamEnded(summary) => Some(*summary),
                _ => None,
            })
            .unwrap();
        assert_eq!(summary.end, StreamEnd::Cancelled);
        assert_eq!(summary.frames_sent, 1);
        assert!(summary.frames_read <= 2);

        assert_eq!(session.outcome().unwrap().presentation, format_default(&json!({ "frame": 1 })));
        assert!(session.last_error().is_none());

        let log = channel_log.lock().unwrap();
        assert_eq!(log.frames.len(), 1);
        assert!(log.closed);
    }

    #[test]
    fn test_cancel_without_stream_is_noop() {
        let backend = MockBackend::replying(Ok(json!("x")));
        let session = session("text-generation", backend);
        assert!(!session.cancel());
    }
}
