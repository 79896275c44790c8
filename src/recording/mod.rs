//! Video recording backends.
//!
//! Two interchangeable ways to turn a session's "record" into an MP4:
//! - [`pipeline`]: session frames are queued, paced and piped to an encoder
//! - [`direct`]: ffmpeg captures camera and microphone on its own

pub mod direct;
pub mod pipeline;
pub mod sink;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use direct::{audio_test, AudioTestReport, DirectRecorder, DirectSettings};
pub use pipeline::{FramePump, RecordingStats};
pub use sink::{FfmpegSink, VideoSink};

use crate::camera::{CameraError, Frame, Resolution};
use crate::ffmpeg::EncoderError;

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("No audio was recorded to '{}'. Check the microphone and its permissions", .0.display())]
    EmptyOutput(PathBuf),
}

/// A recording in progress.
pub trait Recorder: Send {
    /// Offer the latest camera frame. Backends that capture on their own
    /// ignore it.
    fn push_frame(&mut self, frame: &Frame);
    /// False once the backend gave up on its own.
    fn is_active(&self) -> bool;
    /// Finalize the output file.
    fn stop(self: Box<Self>) -> Result<RecordingStats, EncoderError>;
}

/// Starts recordings for the capture session.
pub trait RecorderFactory: Send {
    fn start(&mut self, request: &RecordRequest) -> Result<Box<dyn Recorder>, RecordingError>;
}

/// Everything a backend needs to start one recording.
#[derive(Debug, Clone)]
pub struct RecordRequest {
    pub output: PathBuf,
    pub device_index: u32,
    /// Sanitized camera frame rate.
    pub fps: f64,
    pub rotate: bool,
    pub volume: u8,
}

/// Which recording backend the session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Frames from the session camera, video only.
    #[default]
    Pipeline,
    /// ffmpeg captures video and audio directly.
    Direct,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pipeline" => Ok(Backend::Pipeline),
            "direct" => Ok(Backend::Direct),
            other => Err(format!("unknown backend '{}' (expected pipeline or direct)", other)),
        }
    }
}

/// Pipeline backend: ffmpeg encodes resized session frames from stdin.
#[derive(Debug, Clone)]
pub struct PipelineFactory {
    pub output_size: Resolution,
}

impl RecorderFactory for PipelineFactory {
    fn start(&mut self, request: &RecordRequest) -> Result<Box<dyn Recorder>, RecordingError> {
        let sink = FfmpegSink::spawn(&request.output, self.output_size, request.fps)?;
        log::info!("Recording started: {}", request.output.display());
        Ok(Box::new(FramePump::start(Box::new(sink), request.fps, self.output_size)))
    }
}

/// Direct backend: fixed capture settings plus the per-request device,
/// rotation and volume.
#[derive(Debug, Clone)]
pub struct DirectFactory {
    pub base: DirectSettings,
}

impl RecorderFactory for DirectFactory {
    fn start(&mut self, request: &RecordRequest) -> Result<Box<dyn Recorder>, RecordingError> {
        let settings = DirectSettings {
            device_index: request.device_index,
            rotate: request.rotate,
            volume: request.volume,
            ..self.base.clone()
        };
        let args = direct::direct_args(&settings, &request.output)?;
        Ok(Box::new(DirectRecorder::start(args, &request.output)?))
    }
}

/// Factory for the configured backend.
pub fn factory(backend: Backend, output_size: Resolution, direct: DirectSettings) -> Box<dyn RecorderFactory> {
    match backend {
        Backend::Pipeline => Box::new(PipelineFactory { output_size }),
        Backend::Direct => Box::new(DirectFactory { base: direct }),
    }
}

/// Output path of a student's video.
pub fn video_path(dir: &Path, exam_id: &str, name: &str) -> PathBuf {
    dir.join(crate::matcher::build_media_name(exam_id, name, "mp4"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("pipeline".parse::<Backend>(), Ok(Backend::Pipeline));
        assert_eq!("Direct".parse::<Backend>(), Ok(Backend::Direct));
        assert!("tk".parse::<Backend>().is_err());
    }

    #[test]
    fn test_video_path() {
        assert_eq!(
            video_path(Path::new("/out"), "1001", "Alice"),
            PathBuf::from("/out/1001_Alice.mp4")
        );
    }
}
