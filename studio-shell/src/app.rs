//! Terminal front-end for one inference session.
//!
//! Mirrors what a widget does each frame: poll the session, render whatever
//! changed, and keep going until it is idle again.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use studio_data::{InferenceBackend, Model, Store};
use studio_inference::{
    AudioLocator, InferenceOutcome, InferenceSession, PresentationModel, ResponseInterpreter, SessionEvent, UserInput,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
/// 128 + SIGINT
const EXIT_INTERRUPTED: i32 = 130;

pub fn run(store: &Store, model: Model, input: UserInput) -> Result<()> {
    let audio = AudioLocator::platform_default().with_extra_roots(store.preferences.extra_audio_roots.clone());
    let backend: Arc<dyn InferenceBackend> = Arc::new(store.backend.clone());
    let mut session = InferenceSession::new(model, backend, ResponseInterpreter::new(audio));

    if !session.descriptor().is_supported() {
        log::warn!(
            "{} has no dedicated input for '{}'; sending text as is",
            session.model().model_id,
            session.model().pipeline_tag
        );
    }

    let interrupted = watch_interrupt();
    session.submit(input)?;

    let mut stop_requested = false;
    while session.is_busy() {
        if !stop_requested && interrupted.load(Ordering::SeqCst) {
            stop_requested = true;
            if !session.cancel() {
                return Err(anyhow!("interrupted"));
            }
            eprintln!("Stopping after the current frame...");
        }

        for event in session.poll() {
            render(&event);
        }
        std::thread::sleep(FRAME_INTERVAL);
    }

    match session.last_error() {
        Some(e) => Err(anyhow!(e.clone())),
        None => Ok(()),
    }
}

fn render(event: &SessionEvent) {
    match event {
        SessionEvent::Prediction {
            frame_index,
            prediction,
        } => println!("[frame {}] {}", frame_index, prediction),
        SessionEvent::StreamEnded(summary) => eprintln!(
            "Stream ended ({:?}): {} frames read, {} sent",
            summary.end, summary.frames_read, summary.frames_sent
        ),
        SessionEvent::Presented(outcome) => render_outcome(outcome),
        SessionEvent::Failed(e) => eprintln!("Error: {}", e),
    }
}

fn render_outcome(outcome: &InferenceOutcome) {
    match &outcome.presentation {
        PresentationModel::AudioReference(path) => println!("Audio written to {}", path.display()),
        other => println!("{}", other.display_text()),
    }
    if let Some(secondary) = &outcome.secondary_text {
        println!("{}", secondary);
    }
    if let Some(url) = &outcome.annotated_image_url {
        println!("Annotated image: {}", url);
    }
    log::debug!("run {} finished at {}", outcome.run_id, outcome.finished_at);
}

/// Flag raised on the first Ctrl-C. A second one exits immediately.
fn watch_interrupt() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let signal = flag.clone();

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("Failed to start signal runtime: {}", e);
                return;
            }
        };
        if runtime.block_on(await_interrupts(tokio::signal::ctrl_c, &signal)) {
            eprintln!("Interrupted again, exiting.");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
    flag
}

/// Raises `flag` on the first signal. Returns true once a second one arrives.
async fn await_interrupts<F, Fut>(mut next_signal: F, flag: &AtomicBool) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        log::error!("Failed to listen for interrupt: {}", e);
        return false;
    }
    flag.store(true, Ordering::SeqCst);
    next_signal().await.is_ok()
}
