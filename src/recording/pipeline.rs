//! Bounded frame pipeline between the session loop and an encoder thread.
//!
//! The session pushes the latest camera frame on every tick; a writer thread
//! paces frames onto the sink at the target rate. When the queue is full the
//! newest frame is dropped rather than blocking the session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::sink::VideoSink;
use super::Recorder;
use crate::camera::{frame_utils, Frame, Resolution};
use crate::ffmpeg::{kill_pid, EncoderError};

pub const QUEUE_CAPACITY: usize = 100;

/// Upper bound on waiting for the writer to finish the file.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest single sleep while holding a frame, so stop stays responsive.
const PACING_SLICE: Duration = Duration::from_millis(10);

/// What a finished recording looked like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub frames_written: u64,
    pub frames_dropped: u64,
    /// The writer missed the join timeout and the encoder was killed.
    pub terminated: bool,
    /// Encoder restarts (direct backend only).
    pub restarts: u32,
}

/// Producer side of a running recording.
pub struct FramePump {
    tx: Option<SyncSender<Frame>>,
    stop: Arc<AtomicBool>,
    written: Arc<AtomicU64>,
    writer: Option<JoinHandle<Result<(), EncoderError>>>,
    sink_pid: Option<u32>,
    output_size: Resolution,
    dropped: u64,
}

impl std::fmt::Debug for FramePump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePump")
            .field("output_size", &self.output_size)
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

impl FramePump {
    /// Start the writer thread feeding `sink` at `fps`.
    pub fn start(sink: Box<dyn VideoSink>, fps: f64, output_size: Resolution) -> Self {
        Self::with_capacity(sink, fps, output_size, QUEUE_CAPACITY)
    }

    pub fn with_capacity(sink: Box<dyn VideoSink>, fps: f64, output_size: Resolution, capacity: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let written = Arc::new(AtomicU64::new(0));
        let sink_pid = sink.pid();

        let writer = {
            let stop = Arc::clone(&stop);
            let written = Arc::clone(&written);
            thread::spawn(move || run_writer(rx, sink, fps, stop, written))
        };

        Self {
            tx: Some(tx),
            stop,
            written,
            writer: Some(writer),
            sink_pid,
            output_size,
            dropped: 0,
        }
    }

    /// Queue one frame, resized to the output size. Never blocks.
    ///
    /// Returns false if the frame was dropped.
    pub fn tick(&mut self, frame: &Frame) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        let Some(frame) = frame_utils::resize(frame, self.output_size) else {
            log::debug!("Dropping malformed frame");
            self.dropped += 1;
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("Frame queue full, dropping frame");
                self.dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// True while the writer thread is alive.
    pub fn is_running(&self) -> bool {
        self.writer.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn frames_dropped(&self) -> u64 {
        self.dropped
    }

    /// Stop the writer and finalize the file.
    ///
    /// Queued frames not yet written are discarded. If the writer doesn't
    /// finish within [`JOIN_TIMEOUT`] the encoder process is killed.
    pub fn stop(mut self) -> Result<RecordingStats, EncoderError> {
        self.stop.store(true, Ordering::SeqCst);
        drop(self.tx.take());

        let mut stats = RecordingStats {
            frames_dropped: self.dropped,
            ..Default::default()
        };

        let Some(handle) = self.writer.take() else {
            return Ok(stats);
        };

        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < JOIN_TIMEOUT {
            thread::sleep(Duration::from_millis(20));
        }

        if handle.is_finished() {
            let result = handle.join().unwrap_or_else(|_| {
                Err(EncoderError::Io(std::io::Error::other("writer thread panicked")))
            });
            stats.frames_written = self.written.load(Ordering::SeqCst);
            result.map(|()| stats)
        } else {
            log::warn!("Writer did not finish within {:?}, terminating encoder", JOIN_TIMEOUT);
            if let Some(pid) = self.sink_pid {
                kill_pid(pid);
            }
            stats.frames_written = self.written.load(Ordering::SeqCst);
            stats.terminated = true;
            Ok(stats)
        }
    }
}

impl Recorder for FramePump {
    fn push_frame(&mut self, frame: &Frame) {
        self.tick(frame);
    }

    fn is_active(&self) -> bool {
        self.is_running()
    }

    fn stop(self: Box<Self>) -> Result<RecordingStats, EncoderError> {
        FramePump::stop(*self)
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Consumer loop: pace frames onto the sink at `fps`.
///
/// Frame `n` is written no earlier than `start + n / fps`. An early frame is
/// held and the thread sleeps until its slot.
fn run_writer(
    rx: Receiver<Frame>,
    mut sink: Box<dyn VideoSink>,
    fps: f64,
    stop: Arc<AtomicBool>,
    written: Arc<AtomicU64>,
) -> Result<(), EncoderError> {
    let frame_duration = Duration::from_secs_f64(1.0 / fps.max(1.0));
    let start = Instant::now();
    let mut index = 0u64;

    'frames: while !stop.load(Ordering::SeqCst) {
        let frame = match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let scheduled = start + frame_duration.mul_f64(index as f64);
        loop {
            let now = Instant::now();
            if now >= scheduled {
                break;
            }
            if stop.load(Ordering::SeqCst) {
                break 'frames;
            }
            thread::sleep((scheduled - now).min(PACING_SLICE));
        }

        if let Err(e) = sink.write_frame(&frame) {
            log::error!("Encoder write failed: {}", e);
            let _ = sink.finish();
            return Err(e);
        }
        index += 1;
        written.store(index, Ordering::SeqCst);
    }

    log::debug!("Writer stopping after {} frames", index);
    sink.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        frames: Vec<(Instant, u8)>,
        finished: bool,
    }

    struct MemorySink {
        recorded: Arc<Mutex<Recorded>>,
        delay: Duration,
    }

    impl VideoSink for MemorySink {
        fn write_frame(&mut self, frame: &Frame) -> Result<(), EncoderError> {
            thread::sleep(self.delay);
            self.recorded.lock().unwrap().frames.push((Instant::now(), frame.data[0]));
            Ok(())
        }

        fn finish(&mut self) -> Result<(), EncoderError> {
            self.recorded.lock().unwrap().finished = true;
            Ok(())
        }
    }

    fn sink(delay: Duration) -> (Box<dyn VideoSink>, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        (
            Box::new(MemorySink {
                recorded: Arc::clone(&recorded),
                delay,
            }),
            recorded,
        )
    }

    fn frame(value: u8) -> Frame {
        Frame::new(vec![value; 4 * 2 * 3], 4, 2)
    }

    #[test]
    fn test_frames_written_in_order_and_finished() {
        let (sink, recorded) = sink(Duration::ZERO);
        let mut pump = FramePump::start(sink, 100.0, Resolution::new(4, 2));
        for v in 0..5 {
            assert!(pump.tick(&frame(v)));
        }
        thread::sleep(Duration::from_millis(300));
        let stats = pump.stop().unwrap();

        let recorded = recorded.lock().unwrap();
        assert!(recorded.finished);
        let values: Vec<u8> = recorded.frames.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.frames_written, 5);
        assert_eq!(stats.frames_dropped, 0);
        assert!(!stats.terminated);
    }

    #[test]
    fn test_writes_are_paced() {
        let (sink, recorded) = sink(Duration::ZERO);
        let mut pump = FramePump::start(sink, 20.0, Resolution::new(4, 2));
        for v in 0..4 {
            pump.tick(&frame(v));
        }
        thread::sleep(Duration::from_millis(400));
        pump.stop().unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.frames.len(), 4);
        let span = recorded.frames[3].0 - recorded.frames[0].0;
        // Three intervals of 50ms each, minus scheduling slack.
        assert!(span >= Duration::from_millis(140), "span was {:?}", span);
    }

    #[test]
    fn test_full_queue_drops_frames() {
        let (sink, _recorded) = sink(Duration::from_millis(200));
        let mut pump = FramePump::with_capacity(sink, 100.0, Resolution::new(4, 2), 2);
        let accepted = (0..10).filter(|v| pump.tick(&frame(*v))).count();
        assert!(accepted < 10);
        assert_eq!(pump.frames_dropped(), 10 - accepted as u64);
        let stats = pump.stop().unwrap();
        assert_eq!(stats.frames_dropped, 10 - accepted as u64);
    }

    #[test]
    fn test_frames_are_resized_to_output() {
        struct SizeSink(Arc<Mutex<Vec<(u32, u32)>>>);
        impl VideoSink for SizeSink {
            fn write_frame(&mut self, frame: &Frame) -> Result<(), EncoderError> {
                self.0.lock().unwrap().push((frame.width, frame.height));
                Ok(())
            }
            fn finish(&mut self) -> Result<(), EncoderError> {
                Ok(())
            }
        }

        let sizes = Arc::new(Mutex::new(Vec::new()));
        let mut pump = FramePump::start(Box::new(SizeSink(Arc::clone(&sizes))), 100.0, Resolution::new(8, 6));
        pump.tick(&frame(1));
        thread::sleep(Duration::from_millis(200));
        pump.stop().unwrap();
        assert_eq!(*sizes.lock().unwrap(), vec![(8, 6)]);
    }

    #[test]
    fn test_write_error_surfaces_on_stop() {
        struct BrokenSink;
        impl VideoSink for BrokenSink {
            fn write_frame(&mut self, _: &Frame) -> Result<(), EncoderError> {
                Err(EncoderError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")))
            }
            fn finish(&mut self) -> Result<(), EncoderError> {
                Ok(())
            }
        }

        let mut pump = FramePump::start(Box::new(BrokenSink), 100.0, Resolution::new(4, 2));
        pump.tick(&frame(0));
        thread::sleep(Duration::from_millis(200));
        assert!(pump.stop().is_err());
    }
}
