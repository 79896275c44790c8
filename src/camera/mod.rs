//! Camera capture module.
//!
//! - Device enumeration via [`list_devices`] and [`probe_cameras`]
//! - Live capture via [`FfmpegCamera`], behind the [`FrameSource`] trait
//! - Frame helpers in [`frame_utils`]

mod capture;
mod capture_loop;
mod device;
pub mod frame_utils;
mod types;

pub use capture::{capture_args, parse_stream_info, FfmpegCamera, StreamInfo};
pub use device::{
    audio_input_args, av_input_args, input_format, list_audio_devices, list_devices, parse_device_list,
    probe_cameras, Device, DeviceList, PROBE_LIMIT,
};
pub use types::{
    sanitize_fps, CameraError, CameraInfo, CameraSettings, Frame, ProbedCamera, Resolution, DEFAULT_FPS,
    MAX_PLAUSIBLE_FPS,
};

/// Anything that yields camera frames.
///
/// The capture session owns exactly one source at a time and closes it
/// before opening another.
pub trait FrameSource: Send {
    /// Most recent frame, if any has arrived yet.
    fn latest_frame(&self) -> Option<Frame>;
    /// Frame rate reported by the device, already sanitized.
    fn fps(&self) -> f64;
    fn resolution(&self) -> Resolution;
    /// Device index the source was opened with.
    fn index(&self) -> u32;
    /// Release the device.
    fn close(&mut self);
}

/// Opens a camera by device index.
pub type CameraOpener = Box<dyn FnMut(u32) -> Result<Box<dyn FrameSource>, CameraError> + Send>;

/// The production opener: ffmpeg capture with `base` settings.
pub fn ffmpeg_opener(base: CameraSettings) -> CameraOpener {
    Box::new(move |index| {
        let settings = CameraSettings {
            device_index: index,
            ..base.clone()
        };
        Ok(Box::new(FfmpegCamera::open(&settings)?) as Box<dyn FrameSource>)
    })
}
