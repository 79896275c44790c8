//! Background reader thread: rgb24 frames from ffmpeg's stdout.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::types::{Frame, Resolution};

/// Read fixed-size rgb24 frames until EOF or `stop`, keeping only the
/// latest one in `buffer`.
pub fn run_capture_loop<R: Read>(
    mut source: R,
    resolution: Resolution,
    buffer: Arc<Mutex<Option<Frame>>>,
    stop: Arc<AtomicBool>,
) -> u64 {
    let frame_len = resolution.frame_len();
    let mut frames = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let mut data = vec![0u8; frame_len];
        if let Err(e) = source.read_exact(&mut data) {
            if !stop.load(Ordering::Relaxed) {
                log::debug!("Camera stream ended: {}", e);
            }
            break;
        }
        frames += 1;
        if let Ok(mut buf) = buffer.lock() {
            *buf = Some(Frame::new(data, resolution.width, resolution.height));
        }
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_keeps_latest_complete_frame() {
        let res = Resolution::new(2, 1);
        // Two full frames and a truncated third.
        let bytes: Vec<u8> = vec![1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 3, 3];
        let buffer = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));

        let frames = run_capture_loop(Cursor::new(bytes), res, Arc::clone(&buffer), stop);
        assert_eq!(frames, 2);
        let frame = buffer.lock().unwrap().clone().unwrap();
        assert_eq!(frame.data, vec![2; 6]);
    }

    #[test]
    fn test_stop_flag_prevents_reads() {
        let buffer = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(true));
        let frames = run_capture_loop(Cursor::new(vec![0u8; 30]), Resolution::new(1, 1), Arc::clone(&buffer), stop);
        assert_eq!(frames, 0);
        assert!(buffer.lock().unwrap().is_none());
    }
}
