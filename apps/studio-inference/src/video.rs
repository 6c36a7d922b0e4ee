//! Live object detection over a video file.
//!
//! Frames come out of an ffmpeg subprocess as raw RGB, every second frame is
//! halved in size, JPEG-encoded and sent over the live channel, and the loop
//! waits for one prediction per frame before reading on.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use serde::Deserialize;
use std::io::{Cursor, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use studio_data::{FrameChannel, InferenceError, InferenceResult};

/// Only every n-th decoded frame is sent.
pub const FRAME_STRIDE: usize = 2;
/// Scale applied to both dimensions before encoding.
pub const FRAME_SCALE: f32 = 0.5;

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "avi", "mov", "mkv", "webm", "m4v"];

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

// ─── Frame source ────────────────────────────────────────────────────────────

pub trait FrameSource: Send {
    /// `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> InferenceResult<Option<RgbImage>>;
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
}

/// Decodes a video file through `ffmpeg`, one raw RGB frame at a time.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path) -> InferenceResult<Self> {
        if !path.is_file() {
            return Err(InferenceError::stream(format!("video file {:?} does not exist", path)));
        }

        let (width, height) = probe_dimensions(path)?;
        log::debug!("[FFmpeg] Opened video {:?}: {}x{}", path, width, height);

        let mut child = Command::new("ffmpeg")
            .args(["-v", "quiet", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| InferenceError::stream(format!("ffmpeg execution failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InferenceError::stream("ffmpeg produced no output pipe"))?;

        Ok(Self {
            child,
            stdout,
            width,
            height,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> InferenceResult<Option<RgbImage>> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => Ok(RgbImage::from_raw(self.width, self.height, buf)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(InferenceError::stream(format!("reading frame failed: {}", e))),
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn probe_dimensions(path: &Path) -> InferenceResult<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| InferenceError::stream(format!("ffprobe execution failed: {}", e)))?;

    if !output.status.success() {
        return Err(InferenceError::stream(format!("ffprobe could not read {:?}", path)));
    }

    let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| InferenceError::stream(format!("failed to parse ffprobe JSON: {}", e)))?;

    probe
        .streams
        .first()
        .filter(|s| s.width > 0 && s.height > 0)
        .map(|s| (s.width, s.height))
        .ok_or_else(|| InferenceError::stream(format!("no video stream in {:?}", path)))
}

// ─── Frame loop ──────────────────────────────────────────────────────────────

/// Halve the frame and encode it as JPEG.
pub fn encode_frame(frame: &RgbImage) -> InferenceResult<Vec<u8>> {
    let width = ((frame.width() as f32 * FRAME_SCALE).round() as u32).max(1);
    let height = ((frame.height() as f32 * FRAME_SCALE).round() as u32).max(1);
    let small = image::imageops::resize(frame, width, height, FilterType::Triangle);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(small)
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| InferenceError::stream(format!("JPEG encoding failed: {}", e)))?;
    Ok(out.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Cancelled,
    EndOfStream,
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames_read: usize,
    pub frames_sent: usize,
    pub end: StreamEnd,
}

/// Drive one video pass. The channel is closed on every exit path.
///
/// `on_prediction` receives the source frame index and the raw reply.
pub fn run_live_stream<F>(
    source: &mut dyn FrameSource,
    channel: &mut dyn FrameChannel,
    cancel: &AtomicBool,
    on_prediction: F,
) -> InferenceResult<StreamSummary>
where
    F: FnMut(usize, String),
{
    let result = stream_frames(source, channel, cancel, on_prediction);
    channel.close();
    result
}

fn stream_frames<F>(
    source: &mut dyn FrameSource,
    channel: &mut dyn FrameChannel,
    cancel: &AtomicBool,
    mut on_prediction: F,
) -> InferenceResult<StreamSummary>
where
    F: FnMut(usize, String),
{
    let mut summary = StreamSummary {
        frames_read: 0,
        frames_sent: 0,
        end: StreamEnd::EndOfStream,
    };

    loop {
        if cancel.load(Ordering::SeqCst) {
            summary.end = StreamEnd::Cancelled;
            return Ok(summary);
        }

        let Some(frame) = source.next_frame()? else {
            summary.end = StreamEnd::EndOfStream;
            return Ok(summary);
        };
        let index = summary.frames_read;
        summary.frames_read += 1;

        if index % FRAME_STRIDE != 0 {
            continue;
        }

        let jpeg = encode_frame(&frame)?;
        match channel.exchange(jpeg)? {
            Some(reply) => {
                summary.frames_sent += 1;
                on_prediction(index, reply);
            }
            None => {
                summary.end = StreamEnd::ChannelClosed;
                return Ok(summary);
            }
        }
    }
}
