//! Camera capture handle backed by an ffmpeg process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::capture_loop::run_capture_loop;
use super::device::{input_format, video_input};
use super::types::{sanitize_fps, CameraError, CameraSettings, Frame, Resolution};
use super::FrameSource;
use crate::ffmpeg::{tail, FfmpegProcess, Pipes};

/// How long ffmpeg gets to report the stream format after spawning.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(8);

/// Stream geometry and rate parsed from ffmpeg's stderr.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub resolution: Resolution,
    pub fps: Option<f64>,
}

/// Find the first `Video:` stream line and read its size and fps.
///
/// `Stream #0:0: Video: rawvideo (YUY2 / 0x32595559), yuyv422, 640x480, 30 fps, 30 tbr`
pub fn parse_stream_info(lines: &[String]) -> Option<StreamInfo> {
    let line = lines.iter().find(|l| l.contains("Stream #") && l.contains("Video:"))?;
    let details = &line[line.find("Video:")? + 6..];

    let mut resolution = None;
    let mut fps = None;
    for part in details.split(',') {
        let part = part.trim();
        if resolution.is_none() {
            // "640x480 [SAR 1:1 DAR 4:3]"
            let token = part.split_whitespace().next().unwrap_or("");
            if !token.starts_with('0') {
                resolution = Resolution::parse(token);
            }
        }
        if let Some(rate) = part.strip_suffix(" fps") {
            fps = rate.trim().parse::<f64>().ok();
        }
    }

    Some(StreamInfo {
        resolution: resolution?,
        fps,
    })
}

/// FFmpeg arguments that stream `settings`' device as rgb24 on stdout.
pub fn capture_args(settings: &CameraSettings) -> Result<Vec<String>, CameraError> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostats".into(), "-f".into(), input_format().into()];
    args.extend([
        "-framerate".into(),
        settings.fps.to_string(),
        "-video_size".into(),
        settings.resolution.to_string(),
        "-i".into(),
        video_input(settings.device_index)?,
        "-an".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-".into(),
    ]);
    Ok(args)
}

/// A camera whose frames are decoded by an ffmpeg child process.
///
/// A reader thread keeps the latest frame in a shared slot; the session
/// polls it with [`FrameSource::latest_frame`].
pub struct FfmpegCamera {
    index: u32,
    resolution: Resolution,
    fps: f64,
    frame_buffer: Arc<Mutex<Option<Frame>>>,
    stop_signal: Arc<AtomicBool>,
    reader: Option<JoinHandle<u64>>,
    process: Option<FfmpegProcess>,
}

impl std::fmt::Debug for FfmpegCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegCamera")
            .field("index", &self.index)
            .field("resolution", &self.resolution)
            .field("fps", &self.fps)
            .finish_non_exhaustive()
    }
}

impl FfmpegCamera {
    /// Open the device and start streaming.
    ///
    /// Blocks until ffmpeg reports the stream format, the process dies, or
    /// the startup timeout passes.
    pub fn open(settings: &CameraSettings) -> Result<Self, CameraError> {
        let index = settings.device_index;
        let mut process = FfmpegProcess::spawn(&capture_args(settings)?, Pipes::Stdout)?;

        let start = Instant::now();
        let info = loop {
            if let Some(info) = parse_stream_info(&process.stderr_snapshot()) {
                break info;
            }
            if !process.is_running() {
                let stderr = process.take_stderr_output();
                return Err(open_error(index, &stderr));
            }
            if start.elapsed() > STARTUP_TIMEOUT {
                let _ = process.kill();
                return Err(CameraError::Timeout(index));
            }
            thread::sleep(Duration::from_millis(20));
        };

        let fps = sanitize_fps(info.fps);
        log::info!("Opened camera {} at {} @ {:.1}fps", index, info.resolution, fps);

        let stdout = process.take_stdout().ok_or_else(|| CameraError::OpenFailed {
            index,
            message: "ffmpeg stdout unavailable".into(),
        })?;
        let frame_buffer = Arc::new(Mutex::new(None));
        let stop_signal = Arc::new(AtomicBool::new(false));
        let reader = {
            let buffer = Arc::clone(&frame_buffer);
            let stop = Arc::clone(&stop_signal);
            let resolution = info.resolution;
            thread::spawn(move || run_capture_loop(stdout, resolution, buffer, stop))
        };

        Ok(Self {
            index,
            resolution: info.resolution,
            fps,
            frame_buffer,
            stop_signal,
            reader: Some(reader),
            process: Some(process),
        })
    }

    /// Poll until the first frame arrives or `timeout` passes.
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<Frame> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Some(frame) = self.latest_frame() {
                return Some(frame);
            }
            if self.reader.as_ref().map_or(true, |h| h.is_finished()) {
                return None;
            }
            thread::sleep(Duration::from_millis(20));
        }
        None
    }

    /// Stop the ffmpeg process and join the reader thread.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(mut process) = self.process.take() {
            // Killing closes stdout, which unblocks the reader.
            let _ = process.kill();
        }
        if let Some(handle) = self.reader.take() {
            if let Ok(frames) = handle.join() {
                log::debug!("Camera {} closed after {} frames", self.index, frames);
            }
        }
    }
}

fn open_error(index: u32, stderr: &[String]) -> CameraError {
    let text = tail(stderr, 5);
    let lower = text.to_lowercase();
    if lower.contains("permission") || lower.contains("not authorized") {
        CameraError::PermissionDenied
    } else if lower.contains("no such file") || lower.contains("no such device") {
        CameraError::DeviceNotFound(index)
    } else {
        CameraError::OpenFailed { index, message: text }
    }
}

impl FrameSource for FfmpegCamera {
    fn latest_frame(&self) -> Option<Frame> {
        let buffer = self.frame_buffer.lock().ok()?;
        buffer.clone()
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn close(&mut self) {
        self.stop();
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    #[test]
    fn test_parse_v4l2_stream_info() {
        let stderr = lines(
            "Input #0, video4linux2,v4l2, from '/dev/video0':\n\
             \x20 Stream #0:0: Video: rawvideo (YUY2 / 0x32595559), yuyv422, 640x480, 147456 kb/s, 30 fps, 30 tbr, 1000k tbn",
        );
        let info = parse_stream_info(&stderr).unwrap();
        assert_eq!(info.resolution, Resolution::new(640, 480));
        assert_eq!(info.fps, Some(30.0));
    }

    #[test]
    fn test_parse_stream_info_with_sar_and_fractional_fps() {
        let stderr = lines("  Stream #0:0: Video: mjpeg, yuvj422p(pc), 1280x720 [SAR 1:1 DAR 16:9], 29.97 fps, 29.97 tbr");
        let info = parse_stream_info(&stderr).unwrap();
        assert_eq!(info.resolution, Resolution::HD);
        assert_eq!(info.fps, Some(29.97));
    }

    #[test]
    fn test_parse_stream_info_without_fps() {
        let stderr = lines("  Stream #0:0: Video: rawvideo, uyvy422, 1920x1080, 1000k tbn");
        let info = parse_stream_info(&stderr).unwrap();
        assert_eq!(info.fps, None);
        assert_eq!(sanitize_fps(info.fps), crate::camera::DEFAULT_FPS);
    }

    #[test]
    fn test_parse_stream_info_missing() {
        assert!(parse_stream_info(&lines("ffmpeg version 6.0")).is_none());
    }

    #[test]
    fn test_open_error_classification() {
        let err = open_error(3, &lines("/dev/video3: No such file or directory"));
        assert!(matches!(err, CameraError::DeviceNotFound(3)));
        let err = open_error(0, &lines("Failed to open: Permission denied"));
        assert!(matches!(err, CameraError::PermissionDenied));
    }
}
