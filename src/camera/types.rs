//! Camera types and data structures.

use std::fmt;
use std::time::Instant;

use thiserror::Error;

use crate::ffmpeg::EncoderError;

/// Frame rate assumed when a device reports nothing usable.
pub const DEFAULT_FPS: f64 = 30.0;

/// Reported rates above this are treated as bogus.
pub const MAX_PLAUSIBLE_FPS: f64 = 120.0;

/// Replace an implausible reported frame rate with [`DEFAULT_FPS`].
pub fn sanitize_fps(reported: Option<f64>) -> f64 {
    match reported {
        Some(fps) if fps > 0.0 && fps <= MAX_PLAUSIBLE_FPS => fps,
        Some(fps) => {
            log::warn!("Camera reported {} fps, using {}", fps, DEFAULT_FPS);
            DEFAULT_FPS
        }
        None => DEFAULT_FPS,
    }
}

/// A named capture device as listed by the platform backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Backend-specific path or id
    pub description: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.description)
    }
}

/// A device index that delivered a frame during probing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbedCamera {
    pub index: u32,
    pub resolution: Resolution,
    pub fps: f64,
}

impl fmt::Display for ProbedCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} @ {:.1}fps", self.index, self.resolution, self.fps)
    }
}

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    /// Output size of pipeline recordings.
    pub const FULL_HD: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one rgb24 frame of this size.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Parse `WIDTHxHEIGHT`.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once('x')?;
        let width: u32 = w.parse().ok()?;
        let height: u32 = h.parse().ok()?;
        (width > 0 && height > 0).then_some(Self { width, height })
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::HD
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A captured camera frame, always rgb24.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Settings for opening a camera.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device_index: u32,
    /// Requested capture size; the device may pick another.
    pub resolution: Resolution,
    /// Requested frame rate.
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            resolution: Resolution::default(),
            fps: 30,
        }
    }
}

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Failed to query cameras: {0}")]
    QueryFailed(String),
    #[error("Failed to open camera {index}: {message}")]
    OpenFailed { index: u32, message: String },
    #[error("Camera permission denied. On macOS, grant access in System Settings > Privacy & Security > Camera")]
    PermissionDenied,
    #[error("Camera device {0} not found. Run 'rollcam cameras' to see available devices")]
    DeviceNotFound(u32),
    #[error("Camera {0} did not deliver a frame in time")]
    Timeout(u32),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_info_display() {
        let info = CameraInfo {
            index: 0,
            name: "Test Camera".to_string(),
            description: "/dev/video0".to_string(),
        };
        assert_eq!(format!("{}", info), "[0] Test Camera (/dev/video0)");
    }

    #[test]
    fn test_sanitize_fps() {
        assert_eq!(sanitize_fps(Some(25.0)), 25.0);
        assert_eq!(sanitize_fps(Some(120.0)), 120.0);
        assert_eq!(sanitize_fps(Some(0.0)), DEFAULT_FPS);
        assert_eq!(sanitize_fps(Some(-1.0)), DEFAULT_FPS);
        assert_eq!(sanitize_fps(Some(1000.0)), DEFAULT_FPS);
        assert_eq!(sanitize_fps(None), DEFAULT_FPS);
    }

    #[test]
    fn test_resolution_parse() {
        assert_eq!(Resolution::parse("1920x1080"), Some(Resolution::FULL_HD));
        assert_eq!(Resolution::parse("0x10"), None);
        assert_eq!(Resolution::parse("abc"), None);
        assert_eq!(Resolution::HD.frame_len(), 1280 * 720 * 3);
    }

    #[test]
    fn test_probed_camera_display() {
        let cam = ProbedCamera {
            index: 1,
            resolution: Resolution::new(640, 480),
            fps: 30.0,
        };
        assert_eq!(cam.to_string(), "1: 640x480 @ 30.0fps");
    }

    #[test]
    fn test_camera_error_display() {
        assert!(CameraError::PermissionDenied.to_string().contains("permission denied"));
        assert!(CameraError::DeviceNotFound(5).to_string().contains('5'));
        let err = CameraError::OpenFailed {
            index: 2,
            message: "busy".into(),
        };
        assert_eq!(err.to_string(), "Failed to open camera 2: busy");
    }
}
