//! Encoders that consume pipeline frames.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ChildStdin;

use crate::camera::{Frame, Resolution};
use crate::ffmpeg::{tail, EncoderError, FfmpegProcess, Pipes};

/// Destination of recorded frames.
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), EncoderError>;
    /// Flush and finalize the output.
    fn finish(&mut self) -> Result<(), EncoderError>;
    /// OS process id, if the sink is an external process that may need
    /// killing from another thread.
    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Arguments for an ffmpeg process encoding rgb24 from stdin to H.264.
pub fn sink_args(output: &Path, resolution: Resolution, fps: f64) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-nostats".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        resolution.to_string(),
        "-r".into(),
        format!("{}", fps),
        "-i".into(),
        "-".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-y".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// H.264 MP4 writer backed by an ffmpeg child process.
pub struct FfmpegSink {
    process: FfmpegProcess,
    stdin: Option<ChildStdin>,
    output: PathBuf,
    frame_len: usize,
}

impl FfmpegSink {
    pub fn spawn(output: &Path, resolution: Resolution, fps: f64) -> Result<Self, EncoderError> {
        let mut process = FfmpegProcess::spawn(&sink_args(output, resolution, fps), Pipes::Stdin)?;
        let stdin = process.take_stdin();
        log::debug!("Encoder pid {} writing {}", process.pid(), output.display());
        Ok(Self {
            process,
            stdin,
            output: output.to_path_buf(),
            frame_len: resolution.frame_len(),
        })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl VideoSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), EncoderError> {
        if frame.data.len() != self.frame_len {
            log::warn!(
                "Skipping frame of {} bytes, encoder expects {}",
                frame.data.len(),
                self.frame_len
            );
            return Ok(());
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            EncoderError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "encoder stdin closed"))
        })?;
        stdin.write_all(&frame.data)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EncoderError> {
        // EOF on stdin makes ffmpeg flush and write the moov atom.
        drop(self.stdin.take());
        let status = self.process.wait()?;
        let stderr = self.process.take_stderr_output();
        if status.success() {
            Ok(())
        } else {
            Err(EncoderError::ProcessFailed {
                exit_code: status.code(),
                stderr: tail(&stderr, 20),
            })
        }
    }

    fn pid(&self) -> Option<u32> {
        Some(self.process.pid())
    }
}
