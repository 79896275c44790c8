//! Capture device discovery.
//!
//! Device names come from FFmpeg's `-list_devices` output (AVFoundation on
//! macOS, DirectShow on Windows) or from `/dev/video*` on Linux.

use std::process::{Command, Stdio};
use std::time::Duration;

use super::capture::FfmpegCamera;
use super::FrameSource;
use super::types::{CameraError, CameraInfo, CameraSettings, ProbedCamera};

/// How many indices `probe_cameras` tries.
pub const PROBE_LIMIT: u32 = 10;

/// How long a probed device gets to deliver its first frame.
const PROBE_FRAME_TIMEOUT: Duration = Duration::from_secs(3);

/// FFmpeg input format of the platform's capture API.
pub fn input_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(windows) {
        "dshow"
    } else {
        "v4l2"
    }
}

/// A single entry from a device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub index: usize,
    pub name: String,
}

/// Video and audio devices known to the backend.
#[derive(Debug, Default)]
pub struct DeviceList {
    pub video_devices: Vec<Device>,
    pub audio_devices: Vec<Device>,
}

/// Run ffmpeg's device listing for `format` and parse it.
fn ffmpeg_device_list(format: &str) -> Result<DeviceList, CameraError> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-f", format, "-list_devices", "true", "-i", "dummy"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CameraError::Encoder(crate::ffmpeg::EncoderError::NotFound)
            } else {
                CameraError::QueryFailed(e.to_string())
            }
        })?;

    // FFmpeg prints the listing on stderr and exits non-zero.
    Ok(parse_device_list(&String::from_utf8_lossy(&output.stderr)))
}

/// Parse FFmpeg's AVFoundation or DirectShow device listing.
///
/// Handles both section headers (`... video devices:`) and the newer
/// DirectShow style with a trailing `(video)` / `(audio)` tag.
pub fn parse_device_list(stderr: &str) -> DeviceList {
    #[derive(Clone, Copy, PartialEq)]
    enum Section {
        None,
        Video,
        Audio,
    }

    let mut list = DeviceList::default();
    let mut section = Section::None;

    for line in stderr.lines() {
        if line.contains("video devices") {
            section = Section::Video;
            continue;
        }
        if line.contains("audio devices") {
            section = Section::Audio;
            continue;
        }
        if line.contains("Alternative name") {
            continue;
        }

        // [AVFoundation indev @ 0x...] [0] FaceTime HD Camera
        if let Some(device) = parse_device_line(line) {
            match section {
                Section::Video => list.video_devices.push(device),
                Section::Audio => list.audio_devices.push(device),
                Section::None => {}
            }
            continue;
        }

        // [dshow @ 0x...] "Integrated Camera" (video)
        if let Some(name) = quoted_name(line) {
            let tagged = if line.trim_end().ends_with("(video)") {
                Section::Video
            } else if line.trim_end().ends_with("(audio)") {
                Section::Audio
            } else {
                Section::None
            };
            let target = if tagged != Section::None { tagged } else { section };
            match target {
                Section::Video => list.video_devices.push(Device {
                    index: list.video_devices.len(),
                    name,
                }),
                Section::Audio => list.audio_devices.push(Device {
                    index: list.audio_devices.len(),
                    name,
                }),
                Section::None => {}
            }
        }
    }

    list
}

fn quoted_name(line: &str) -> Option<String> {
    let start = line.find('"')?;
    let rest = &line[start + 1..];
    let end = rest.find('"')?;
    let name = rest[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Parse a `[prefix] [index] name` device line.
pub fn parse_device_line(line: &str) -> Option<Device> {
    let bracket_idx = line.find("] [")?;
    let after_bracket = &line[bracket_idx + 3..];

    let close_bracket = after_bracket.find(']')?;
    let index: usize = after_bracket[..close_bracket].parse().ok()?;

    let name = after_bracket.get(close_bracket + 2..)?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    Some(Device { index, name })
}

/// Named video devices of the current platform.
pub fn list_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let format = input_format();
    if format == "v4l2" {
        return list_v4l2_devices();
    }
    let list = ffmpeg_device_list(format)?;
    Ok(list
        .video_devices
        .into_iter()
        .map(|d| CameraInfo {
            index: d.index as u32,
            description: format.to_string(),
            name: d.name,
        })
        .collect())
}

/// Named audio devices of the current platform.
pub fn list_audio_devices() -> Result<Vec<Device>, CameraError> {
    match input_format() {
        "v4l2" => Ok(Vec::new()),
        format => Ok(ffmpeg_device_list(format)?.audio_devices),
    }
}

fn list_v4l2_devices() -> Result<Vec<CameraInfo>, CameraError> {
    let entries = match std::fs::read_dir("/dev") {
        Ok(entries) => entries,
        Err(e) => return Err(CameraError::QueryFailed(e.to_string())),
    };
    let mut devices: Vec<CameraInfo> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let file_name = e.file_name().to_string_lossy().to_string();
            let index: u32 = file_name.strip_prefix("video")?.parse().ok()?;
            let sys_name = format!("/sys/class/video4linux/{}/name", file_name);
            let name = std::fs::read_to_string(sys_name)
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| file_name.clone());
            Some(CameraInfo {
                index,
                name,
                description: format!("/dev/{}", file_name),
            })
        })
        .collect();
    devices.sort_by_key(|d| d.index);
    Ok(devices)
}

/// FFmpeg `-i` value for a video device index.
pub fn video_input(index: u32) -> Result<String, CameraError> {
    match input_format() {
        "avfoundation" => Ok(format!("{}:none", index)),
        "dshow" => {
            let devices = list_devices()?;
            let device = devices
                .iter()
                .find(|d| d.index == index)
                .ok_or(CameraError::DeviceNotFound(index))?;
            Ok(format!("video={}", device.name))
        }
        _ => Ok(format!("/dev/video{}", index)),
    }
}

/// FFmpeg input arguments for video plus audio capture.
///
/// `video_opts` (frame rate, size) are placed before the video `-i`.
/// `audio` is a backend device name or index; empty picks the default.
pub fn av_input_args(index: u32, audio: &str, video_opts: &[String]) -> Result<Vec<String>, CameraError> {
    let format = input_format();
    let mut args = vec!["-f".to_string(), format.to_string()];
    args.extend(video_opts.iter().cloned());
    args.push("-i".into());

    match format {
        "avfoundation" => {
            let audio = if audio.is_empty() { "0" } else { audio };
            args.push(format!("{}:{}", index, audio));
        }
        "dshow" => {
            let video = video_input(index)?;
            args.push(format!("{}:audio={}", video, default_dshow_audio(audio)?));
        }
        _ => {
            let audio = if audio.is_empty() { "default" } else { audio };
            args.push(format!("/dev/video{}", index));
            args.extend(["-f".into(), "alsa".into(), "-i".into(), audio.to_string()]);
        }
    }
    Ok(args)
}

fn default_dshow_audio(audio: &str) -> Result<String, CameraError> {
    if !audio.is_empty() {
        return Ok(audio.to_string());
    }
    list_audio_devices()?
        .into_iter()
        .next()
        .map(|d| d.name)
        .ok_or_else(|| CameraError::QueryFailed("no audio capture device".into()))
}

/// FFmpeg input arguments for audio-only capture.
pub fn audio_input_args(audio: &str) -> Result<Vec<String>, CameraError> {
    let args = match input_format() {
        "avfoundation" => {
            let audio = if audio.is_empty() { "0" } else { audio };
            vec!["-f".into(), "avfoundation".into(), "-i".into(), format!("none:{}", audio)]
        }
        "dshow" => vec![
            "-f".into(),
            "dshow".into(),
            "-i".into(),
            format!("audio={}", default_dshow_audio(audio)?),
        ],
        _ => {
            let audio = if audio.is_empty() { "default" } else { audio };
            vec!["-f".into(), "alsa".into(), "-i".into(), audio.to_string()]
        }
    };
    Ok(args)
}

/// Try device indices `0..limit`, keeping those that deliver a frame.
///
/// Gives up early once index 3 is passed without finding anything.
pub fn probe_cameras(limit: u32, base: &CameraSettings) -> Vec<ProbedCamera> {
    let mut found = Vec::new();

    for index in 0..limit {
        let settings = CameraSettings {
            device_index: index,
            ..base.clone()
        };
        match FfmpegCamera::open(&settings) {
            Ok(mut camera) => {
                if let Some(frame) = camera.wait_for_frame(PROBE_FRAME_TIMEOUT) {
                    let probed = ProbedCamera {
                        index,
                        resolution: frame.resolution(),
                        fps: camera.fps(),
                    };
                    log::info!("Camera {}", probed);
                    found.push(probed);
                } else {
                    log::debug!("Camera {} opened but delivered no frame", index);
                }
                camera.stop();
            }
            Err(e) => {
                log::debug!("Camera {} unavailable: {}", index, e);
                if index > 2 && found.is_empty() {
                    break;
                }
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_line_valid() {
        let line = "[AVFoundation indev @ 0x12345678] [0] FaceTime HD Camera";
        let device = parse_device_line(line).unwrap();
        assert_eq!(device.index, 0);
        assert_eq!(device.name, "FaceTime HD Camera");
    }

    #[test]
    fn test_parse_device_line_invalid() {
        assert!(parse_device_line("Some random line without device info").is_none());
        assert!(parse_device_line("[x] [1]").is_none());
    }

    #[test]
    fn test_parse_avfoundation_list() {
        let stderr = r#"
[AVFoundation indev @ 0x123] AVFoundation video devices:
[AVFoundation indev @ 0x123] [0] FaceTime HD Camera
[AVFoundation indev @ 0x123] [1] Capture screen 0
[AVFoundation indev @ 0x123] AVFoundation audio devices:
[AVFoundation indev @ 0x123] [0] MacBook Pro Microphone
"#;
        let devices = parse_device_list(stderr);
        assert_eq!(devices.video_devices.len(), 2);
        assert_eq!(devices.audio_devices.len(), 1);
        assert_eq!(devices.video_devices[1].name, "Capture screen 0");
        assert_eq!(devices.audio_devices[0].name, "MacBook Pro Microphone");
    }

    #[test]
    fn test_parse_dshow_list() {
        let stderr = r#"
[dshow @ 000001] "Integrated Camera" (video)
[dshow @ 000001]   Alternative name "@device_pnp_\\?\usb#vid"
[dshow @ 000001] "USB Camera" (video)
[dshow @ 000001] "Microphone (Realtek Audio)" (audio)
"#;
        let devices = parse_device_list(stderr);
        assert_eq!(
            devices.video_devices,
            vec![
                Device {
                    index: 0,
                    name: "Integrated Camera".into()
                },
                Device {
                    index: 1,
                    name: "USB Camera".into()
                },
            ]
        );
        assert_eq!(devices.audio_devices[0].name, "Microphone (Realtek Audio)");
    }

    #[test]
    fn test_parse_legacy_dshow_sections() {
        let stderr = r#"
[dshow @ 01] DirectShow video devices (some may be both video and audio devices)
[dshow @ 01]  "Webcam"
[dshow @ 01] DirectShow audio devices
[dshow @ 01]  "Mic"
"#;
        let devices = parse_device_list(stderr);
        assert_eq!(devices.video_devices[0].name, "Webcam");
        assert_eq!(devices.audio_devices[0].name, "Mic");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_av_input_args() {
        let opts = vec!["-framerate".to_string(), "30".to_string()];
        assert_eq!(
            av_input_args(2, "", &opts).unwrap(),
            vec!["-f", "v4l2", "-framerate", "30", "-i", "/dev/video2", "-f", "alsa", "-i", "default"]
        );
        assert_eq!(audio_input_args("hw:1").unwrap(), vec!["-f", "alsa", "-i", "hw:1"]);
    }
}
