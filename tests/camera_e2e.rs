//! End-to-end tests for ffmpeg-backed camera capture and recording.
//!
//! Each test skips when ffmpeg or a camera is unavailable.

use std::path::PathBuf;
use std::time::Duration;

use rollcam::camera::{self, CameraSettings, FfmpegCamera, FrameSource, Resolution};
use rollcam::ffmpeg;
use rollcam::recording::{PipelineFactory, RecordRequest, RecorderFactory};

fn camera_available() -> bool {
    if !ffmpeg::is_available() {
        println!("SKIP: ffmpeg not installed");
        return false;
    }
    match camera::list_devices() {
        Ok(devices) if !devices.is_empty() => true,
        Ok(_) => {
            println!("SKIP: No cameras available for this test");
            false
        }
        Err(e) => {
            println!("SKIP: Can't list cameras: {}", e);
            false
        }
    }
}

#[test]
fn test_list_devices_succeeds() {
    if !ffmpeg::is_available() {
        println!("SKIP: ffmpeg not installed");
        return;
    }
    match camera::list_devices() {
        Ok(devices) => {
            println!("Found {} camera device(s)", devices.len());
            for device in &devices {
                println!("  {}", device);
            }
        }
        // Headless machines may lack the capture backend entirely.
        Err(e) => println!("SKIP: {}", e),
    }
}

#[test]
fn test_camera_delivers_frames() {
    if !camera_available() {
        return;
    }

    let settings = CameraSettings {
        resolution: Resolution::new(640, 480),
        ..Default::default()
    };
    let mut camera = match FfmpegCamera::open(&settings) {
        Ok(camera) => camera,
        Err(e) => {
            println!("SKIP: Camera did not open: {}", e);
            return;
        }
    };

    let frame = camera.wait_for_frame(Duration::from_secs(5));
    assert!(frame.is_some(), "an open camera should deliver a frame");
    let frame = frame.unwrap();
    assert_eq!(frame.data.len(), frame.resolution().frame_len());
    assert!(camera.fps() > 0.0 && camera.fps() <= camera::MAX_PLAUSIBLE_FPS);
    camera.close();
}

#[test]
fn test_open_missing_camera_fails_cleanly() {
    if !ffmpeg::is_available() {
        println!("SKIP: ffmpeg not installed");
        return;
    }
    let settings = CameraSettings {
        device_index: 97,
        ..Default::default()
    };
    assert!(FfmpegCamera::open(&settings).is_err());
}

#[test]
fn test_pipeline_records_camera_frames() {
    if !camera_available() {
        return;
    }
    let mut camera = match FfmpegCamera::open(&CameraSettings::default()) {
        Ok(camera) => camera,
        Err(e) => {
            println!("SKIP: Camera did not open: {}", e);
            return;
        }
    };

    let dir = tempfile::tempdir().unwrap();
    let output: PathBuf = dir.path().join("202510001_Alice.mp4");
    let mut factory = PipelineFactory {
        output_size: Resolution::new(320, 240),
    };
    let request = RecordRequest {
        output: output.clone(),
        device_index: 0,
        fps: camera.fps(),
        rotate: false,
        volume: 50,
    };
    let mut recorder = factory.start(&request).unwrap();

    let interval = Duration::from_secs_f64(1.0 / camera.fps());
    for _ in 0..30 {
        if let Some(frame) = camera.latest_frame() {
            recorder.push_frame(&frame);
        }
        std::thread::sleep(interval);
    }
    camera.close();

    match recorder.stop() {
        Ok(stats) => {
            println!("Wrote {} frames, dropped {}", stats.frames_written, stats.frames_dropped);
            assert!(std::fs::metadata(&output).map(|m| m.len() > 0).unwrap_or(false));
        }
        Err(e) => println!("SKIP: encoder failed (missing libx264?): {}", e),
    }
}
