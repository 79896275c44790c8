//! Direct backend: ffmpeg captures camera and microphone itself.
//!
//! No frames pass through the session. A monitor thread restarts the
//! encoder if it dies mid-recording, up to [`MAX_RESTARTS`] times. Each
//! restart writes a new `_partN` segment next to the original output.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::pipeline::RecordingStats;
use super::{Recorder, RecordingError};
use crate::camera::{self, Frame, Resolution};
use crate::ffmpeg::{self, EncoderError, FfmpegProcess, Pipes};

pub const MAX_RESTARTS: u32 = 3;

/// How long ffmpeg gets to finish the file after `q`.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Voice-band cleanup applied to every recording.
pub const AUDIO_FILTER: &str = "highpass=f=80,lowpass=f=10000,afftdn=nf=-20";

pub const AUDIO_TEST_FILE: &str = "audio_test.aac";
pub const AUDIO_TEST_SECONDS: u32 = 5;

const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Capture parameters for the direct backend.
#[derive(Debug, Clone)]
pub struct DirectSettings {
    pub device_index: u32,
    /// Backend audio device; empty for the platform default.
    pub audio_device: String,
    /// 0-100.
    pub volume: u8,
    pub rotate: bool,
    pub resolution: Resolution,
    pub fps: u32,
}

impl Default for DirectSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            audio_device: String::new(),
            volume: 50,
            rotate: false,
            resolution: Resolution::HD,
            fps: 30,
        }
    }
}

/// Audio filter chain with the gain for `volume` (0-100).
pub fn audio_filter(volume: u8) -> String {
    format!("{},volume={}", AUDIO_FILTER, volume.min(100) as f64 / 100.0)
}

/// Full ffmpeg argument list for one direct recording.
pub fn direct_args(settings: &DirectSettings, output: &Path) -> Result<Vec<String>, RecordingError> {
    let video_opts = [
        "-framerate".to_string(),
        settings.fps.to_string(),
        "-video_size".to_string(),
        settings.resolution.to_string(),
    ];
    let mut args = vec!["-hide_banner".to_string(), "-nostats".to_string()];
    args.extend(camera::av_input_args(settings.device_index, &settings.audio_device, &video_opts)?);
    args.extend(encoder_args(settings));
    args.push(output.to_string_lossy().into_owned());
    Ok(args)
}

fn encoder_args(settings: &DirectSettings) -> Vec<String> {
    let mut args: Vec<String> = [
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-c:a",
        "aac",
        "-b:a",
        "256k",
        "-ar",
        "48000",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.extend(["-af".to_string(), audio_filter(settings.volume)]);
    args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    if settings.rotate {
        args.extend(["-vf".to_string(), "transpose=2,transpose=2".to_string()]);
    }
    args.push("-y".to_string());
    args
}

/// Output path for restart segment `part`: `1_A.mp4` → `1_A_part2.mp4`.
pub fn segment_path(output: &Path, part: u32) -> PathBuf {
    let stem = output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let mut name = format!("{}_part{}", stem, part);
    if let Some(ext) = output.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    output.with_file_name(name)
}

/// `args` with the trailing output path swapped for `segment`.
fn segment_args(args: &[String], output: &Path, segment: &Path) -> Vec<String> {
    let mut args = args.to_vec();
    if let Some(last) = args.last_mut() {
        if Path::new(last.as_str()) == output {
            *last = segment.to_string_lossy().into_owned();
        }
    }
    args
}

/// How the last encoder run ended when the monitor gave up.
struct Failure {
    exit_code: Option<i32>,
    stderr: String,
}

struct Shared {
    process: Mutex<Option<FfmpegProcess>>,
    recording: AtomicBool,
    restarts: AtomicU32,
    failure: Mutex<Option<Failure>>,
}

/// A running direct recording.
pub struct DirectRecorder {
    shared: Arc<Shared>,
    monitor: Option<JoinHandle<()>>,
    output: PathBuf,
}

impl std::fmt::Debug for DirectRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectRecorder")
            .field("output", &self.output)
            .field("restarts", &self.restarts())
            .finish_non_exhaustive()
    }
}

impl DirectRecorder {
    /// Spawn the encoder and its monitor thread.
    pub fn start(args: Vec<String>, output: &Path) -> Result<Self, EncoderError> {
        let process = FfmpegProcess::spawn(&args, Pipes::Control)?;
        log::info!("Recording started: {}", output.display());

        let shared = Arc::new(Shared {
            process: Mutex::new(Some(process)),
            recording: AtomicBool::new(true),
            restarts: AtomicU32::new(0),
            failure: Mutex::new(None),
        });
        let monitor = {
            let shared = Arc::clone(&shared);
            let output = output.to_path_buf();
            thread::spawn(move || monitor_encoder(shared, args, output))
        };

        Ok(Self {
            shared,
            monitor: Some(monitor),
            output: output.to_path_buf(),
        })
    }

    pub fn restarts(&self) -> u32 {
        self.shared.restarts.load(Ordering::SeqCst)
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Send `q`, wait up to [`STOP_TIMEOUT`], then terminate.
    ///
    /// If the monitor gave up on the encoder, its last exit code and stderr
    /// are returned as [`EncoderError::ProcessFailed`].
    fn finish(&mut self) -> Result<RecordingStats, EncoderError> {
        self.shared.recording.store(false, Ordering::SeqCst);
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }

        let process = self.shared.process.lock().ok().and_then(|mut p| p.take());
        if let Some(mut process) = process {
            let status = process.finish(STOP_TIMEOUT)?;
            log::debug!("Encoder exited with {}", status);
        }

        let failure = self.shared.failure.lock().ok().and_then(|mut f| f.take());
        if let Some(failure) = failure {
            log::error!("Recording of {} failed", self.output.display());
            return Err(EncoderError::ProcessFailed {
                exit_code: failure.exit_code,
                stderr: failure.stderr,
            });
        }
        log::info!("Recording stopped and saved: {}", self.output.display());

        Ok(RecordingStats {
            restarts: self.restarts(),
            ..Default::default()
        })
    }
}

/// Poll the encoder; restart it if it exits while still recording.
fn monitor_encoder(shared: Arc<Shared>, args: Vec<String>, output: PathBuf) {
    while shared.recording.load(Ordering::SeqCst) {
        let slept = Instant::now();
        while slept.elapsed() < MONITOR_INTERVAL {
            if !shared.recording.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }

        let Ok(mut guard) = shared.process.lock() else {
            return;
        };
        let Some(process) = guard.as_mut() else {
            return;
        };
        let Some(status) = process.try_status() else {
            continue;
        };

        let stderr = ffmpeg::tail(&process.take_stderr_output(), 20);
        log::warn!("Encoder ended unexpectedly with {}", status);
        let give_up = |reason: String| {
            log::error!("{}", reason);
            if let Ok(mut failure) = shared.failure.lock() {
                *failure = Some(Failure {
                    exit_code: status.code(),
                    stderr: if stderr.is_empty() { reason } else { stderr.clone() },
                });
            }
            shared.recording.store(false, Ordering::SeqCst);
        };

        let restarts = shared.restarts.load(Ordering::SeqCst);
        if restarts >= MAX_RESTARTS {
            give_up("Max restart attempts reached, stopping recording".to_string());
            *guard = None;
            return;
        }

        let part = restarts + 2;
        let segment = segment_path(&output, part);
        shared.restarts.store(restarts + 1, Ordering::SeqCst);
        log::info!(
            "Restarting encoder ({}/{}), continuing in {}",
            restarts + 1,
            MAX_RESTARTS,
            segment.display()
        );
        match FfmpegProcess::spawn(&segment_args(&args, &output, &segment), Pipes::Control) {
            Ok(process) => *guard = Some(process),
            Err(e) => {
                give_up(format!("Failed to restart encoder: {}", e));
                *guard = None;
                return;
            }
        }
    }
}

impl Recorder for DirectRecorder {
    fn push_frame(&mut self, _frame: &Frame) {}

    fn is_active(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    fn stop(mut self: Box<Self>) -> Result<RecordingStats, EncoderError> {
        self.finish()
    }
}

impl Drop for DirectRecorder {
    fn drop(&mut self) {
        if self.monitor.is_some() {
            let _ = self.finish();
        }
    }
}

/// Result of a microphone check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTestReport {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Record a short clip through the recording filter chain.
pub fn audio_test_args(audio_device: &str, output: &Path) -> Result<Vec<String>, RecordingError> {
    let mut args = vec!["-hide_banner".to_string(), "-nostats".to_string()];
    args.extend(camera::audio_input_args(audio_device)?);
    args.extend([
        "-t".to_string(),
        AUDIO_TEST_SECONDS.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "256k".to_string(),
        "-af".to_string(),
        AUDIO_FILTER.to_string(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ]);
    Ok(args)
}

/// Record [`AUDIO_TEST_SECONDS`] of audio into `dir` and check the file.
pub fn audio_test(audio_device: &str, dir: &Path) -> Result<AudioTestReport, RecordingError> {
    let path = dir.join(AUDIO_TEST_FILE);
    FfmpegProcess::run(&audio_test_args(audio_device, &path)?)?;

    let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    if bytes == 0 {
        return Err(RecordingError::EmptyOutput(path));
    }
    log::info!("Audio test wrote {} bytes to {}", bytes, path.display());
    Ok(AudioTestReport { path, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder_line(settings: &DirectSettings) -> String {
        encoder_args(settings).join(" ")
    }

    #[test]
    fn test_audio_filter_volume() {
        assert_eq!(
            audio_filter(50),
            "highpass=f=80,lowpass=f=10000,afftdn=nf=-20,volume=0.5"
        );
        assert!(audio_filter(100).ends_with("volume=1"));
        assert!(audio_filter(0).ends_with("volume=0"));
        assert!(audio_filter(250).ends_with("volume=1"));
    }

    #[test]
    fn test_encoder_args_template() {
        let line = encoder_line(&DirectSettings::default());
        assert!(line.starts_with("-c:v libx264 -preset ultrafast -c:a aac -b:a 256k -ar 48000 -af "));
        assert!(line.contains("-movflags +faststart"));
        assert!(!line.contains("transpose"));
        assert!(line.ends_with("-y"));
    }

    #[test]
    fn test_rotation_adds_double_transpose() {
        let settings = DirectSettings {
            rotate: true,
            ..Default::default()
        };
        assert!(encoder_line(&settings).contains("-vf transpose=2,transpose=2 -y"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_direct_args_linux() {
        let args = direct_args(&DirectSettings::default(), Path::new("1_A.mp4")).unwrap();
        let line = args.join(" ");
        assert!(line.contains("-f v4l2 -framerate 30 -video_size 1280x720 -i /dev/video0 -f alsa -i default"));
        assert_eq!(args.last().unwrap(), "1_A.mp4");
    }

    #[test]
    fn test_restarts_capped_when_encoder_keeps_failing() {
        if !crate::ffmpeg::is_available() {
            println!("SKIP: ffmpeg not installed");
            return;
        }
        // An invalid option makes every run exit immediately.
        let args = vec!["-invalid_nonexistent_flag_xyz".to_string()];
        let recorder = DirectRecorder::start(args, Path::new("unused.mp4")).unwrap();
        let start = Instant::now();
        while recorder.is_active() && start.elapsed() < Duration::from_secs(15) {
            thread::sleep(Duration::from_millis(100));
        }
        assert!(!recorder.is_active());
        assert_eq!(recorder.restarts(), MAX_RESTARTS);

        // The exhausted budget surfaces the encoder's exit code and stderr.
        match Box::new(recorder).stop() {
            Err(EncoderError::ProcessFailed { exit_code, stderr }) => {
                assert_ne!(exit_code, Some(0));
                assert!(stderr.contains("invalid_nonexistent_flag_xyz"), "stderr: {}", stderr);
            }
            other => panic!("Expected ProcessFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_segment_path() {
        assert_eq!(
            segment_path(Path::new("out/202510001_Alice.mp4"), 2),
            PathBuf::from("out/202510001_Alice_part2.mp4")
        );
        assert_eq!(segment_path(Path::new("clip"), 3), PathBuf::from("clip_part3"));
    }

    #[test]
    fn test_segment_args_replace_only_output() {
        let output = Path::new("out/1_A.mp4");
        let args: Vec<String> = ["-i", "/dev/video0", "-y", "out/1_A.mp4"].iter().map(|s| s.to_string()).collect();
        let restarted = segment_args(&args, output, &segment_path(output, 2));
        assert_eq!(restarted.last().unwrap(), "out/1_A_part2.mp4");
        assert_eq!(restarted[..3], args[..3]);

        let flags = vec!["-version".to_string()];
        assert_eq!(segment_args(&flags, output, &segment_path(output, 2)), flags);
    }
}
