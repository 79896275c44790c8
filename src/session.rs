//! Capture/record session: one camera, one roster cursor, at most one
//! recording.
//!
//! The session is driven from a single loop. Every operation is a method
//! that validates the current [`SessionState`] and performs the transition
//! explicitly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::camera::{frame_utils, CameraError, CameraOpener, FrameSource};
use crate::ffmpeg::EncoderError;
use crate::matcher::build_media_name;
use crate::recording::{self, RecordRequest, Recorder, RecorderFactory, RecordingError, RecordingStats};
use crate::roster::Student;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Camera open; the action key starts a recording.
    Idle,
    /// Camera open; the action key takes a snapshot and advances.
    PreviewOnly,
    /// A recording job is active.
    Recording,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "ready (record mode)"),
            SessionState::PreviewOnly => write!(f, "ready (photo mode)"),
            SessionState::Recording => write!(f, "recording"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No student selected; load a roster first")]
    NoStudent,
    #[error("No camera is open")]
    NoCamera,
    #[error("The camera has not delivered a frame yet")]
    NoFrame,
    #[error("Already recording")]
    AlreadyRecording,
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error("Failed to save snapshot '{}': {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-session options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub output_dir: PathBuf,
    /// Start in photo mode instead of record mode.
    pub photo_mode: bool,
    pub rotate: bool,
    /// Microphone gain 0-100 for backends that record audio.
    pub volume: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            photo_mode: false,
            rotate: false,
            volume: 50,
        }
    }
}

/// A recording that has been stopped and finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedRecording {
    pub student: Student,
    pub path: PathBuf,
    pub stats: RecordingStats,
    pub duration: Duration,
}

/// What the action key did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Started(PathBuf),
    Stopped(FinishedRecording),
    Snapshot(PathBuf),
}

/// Something that happened on its own during [`Session::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend gave up; the recording was finalized as far as possible.
    RecordingAborted(FinishedRecording),
}

struct ActiveRecording {
    recorder: Box<dyn Recorder>,
    student: Student,
    path: PathBuf,
    started: Instant,
}

pub struct Session {
    state: SessionState,
    students: Vec<Student>,
    cursor: usize,
    camera: Option<Box<dyn FrameSource>>,
    opener: CameraOpener,
    recorders: Box<dyn RecorderFactory>,
    recording: Option<ActiveRecording>,
    config: SessionConfig,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("students", &self.students.len())
            .field("cursor", &self.cursor)
            .field("camera", &self.camera.as_ref().map(|c| c.index()))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open camera `camera_index` and create an empty-roster session.
    pub fn open(
        mut opener: CameraOpener,
        camera_index: u32,
        recorders: Box<dyn RecorderFactory>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let camera = opener(camera_index)?;
        Ok(Self::with_camera(camera, opener, recorders, config))
    }

    /// Create a session around an already open camera.
    pub fn with_camera(
        camera: Box<dyn FrameSource>,
        opener: CameraOpener,
        recorders: Box<dyn RecorderFactory>,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: if config.photo_mode {
                SessionState::PreviewOnly
            } else {
                SessionState::Idle
            },
            students: Vec::new(),
            cursor: 0,
            camera: Some(camera),
            opener,
            recorders,
            recording: None,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_student(&self) -> Option<&Student> {
        self.students.get(self.cursor)
    }

    pub fn rotate(&self) -> bool {
        self.config.rotate
    }

    pub fn volume(&self) -> u8 {
        self.config.volume
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub fn camera_index(&self) -> Option<u32> {
        self.camera.as_ref().map(|c| c.index())
    }

    /// Sanitized frame rate of the current camera.
    pub fn fps(&self) -> f64 {
        self.camera.as_ref().map_or(crate::camera::DEFAULT_FPS, |c| c.fps())
    }

    /// How often the loop should call [`Session::tick`].
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps())
    }

    /// Replace the roster; stops any recording and resets the cursor.
    ///
    /// The roster is replaced even if finalizing the recording fails; that
    /// error is returned afterwards.
    pub fn set_roster(&mut self, students: Vec<Student>) -> Result<Option<FinishedRecording>, SessionError> {
        let finished = self.stop_recording();
        log::info!("Roster set: {} students", students.len());
        self.students = students;
        self.cursor = 0;
        finished
    }

    /// Idle/PreviewOnly → Recording for the current student.
    pub fn start_recording(&mut self) -> Result<PathBuf, SessionError> {
        if self.state == SessionState::Recording {
            return Err(SessionError::AlreadyRecording);
        }
        let student = self.current_student().cloned().ok_or(SessionError::NoStudent)?;
        let device_index = self.camera_index().ok_or(SessionError::NoCamera)?;
        self.ensure_output_dir()?;

        let path = recording::video_path(&self.config.output_dir, &student.exam_id, &student.name);
        let request = RecordRequest {
            output: path.clone(),
            device_index,
            fps: self.fps(),
            rotate: self.config.rotate,
            volume: self.config.volume,
        };
        let recorder = self.recorders.start(&request)?;

        self.recording = Some(ActiveRecording {
            recorder,
            student,
            path: path.clone(),
            started: Instant::now(),
        });
        self.state = SessionState::Recording;
        Ok(path)
    }

    /// Recording → Idle. `Ok(None)` when nothing was recording.
    ///
    /// The session is Idle afterwards even when finalizing fails.
    pub fn stop_recording(&mut self) -> Result<Option<FinishedRecording>, SessionError> {
        let Some(active) = self.recording.take() else {
            return Ok(None);
        };
        self.state = SessionState::Idle;
        Ok(Some(finalize(active)?))
    }

    /// The record-mode action: stop and advance, or start.
    pub fn toggle_recording(&mut self) -> Result<ActionOutcome, SessionError> {
        if self.state == SessionState::Recording {
            let finished = self.stop_recording();
            self.advance(1);
            match finished? {
                Some(finished) => Ok(ActionOutcome::Stopped(finished)),
                None => Err(SessionError::NoStudent),
            }
        } else {
            Ok(ActionOutcome::Started(self.start_recording()?))
        }
    }

    /// The action key: depends on the current state.
    pub fn action(&mut self) -> Result<ActionOutcome, SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Recording => self.toggle_recording(),
            SessionState::PreviewOnly => {
                let path = self.snapshot()?;
                self.advance(1);
                Ok(ActionOutcome::Snapshot(path))
            }
        }
    }

    /// Move to the next student, stopping a recording first. Clamped.
    pub fn next_student(&mut self) -> Result<Option<FinishedRecording>, SessionError> {
        let finished = self.stop_recording();
        self.advance(1);
        finished
    }

    /// Move to the previous student, stopping a recording first. Clamped.
    pub fn previous_student(&mut self) -> Result<Option<FinishedRecording>, SessionError> {
        let finished = self.stop_recording();
        self.advance(-1);
        finished
    }

    fn advance(&mut self, delta: isize) {
        if self.students.is_empty() {
            self.cursor = 0;
            return;
        }
        let last = self.students.len() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    /// Idle ↔ PreviewOnly. A running recording is stopped first.
    pub fn toggle_mode(&mut self) -> Result<Option<FinishedRecording>, SessionError> {
        let was = self.state;
        let finished = self.stop_recording();
        self.state = match was {
            SessionState::PreviewOnly => SessionState::Idle,
            SessionState::Idle | SessionState::Recording => SessionState::PreviewOnly,
        };
        finished
    }

    pub fn toggle_rotation(&mut self) -> bool {
        self.config.rotate = !self.config.rotate;
        self.config.rotate
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.config.volume = volume.min(100);
    }

    /// Save the latest frame as `<exam_id>_<name>.png`. Any state.
    pub fn snapshot(&mut self) -> Result<PathBuf, SessionError> {
        let student = self.current_student().cloned().ok_or(SessionError::NoStudent)?;
        let camera = self.camera.as_ref().ok_or(SessionError::NoCamera)?;
        let mut frame = camera.latest_frame().ok_or(SessionError::NoFrame)?;
        if self.config.rotate {
            frame_utils::rotate180(&mut frame);
        }

        self.ensure_output_dir()?;
        let path = self
            .config
            .output_dir
            .join(build_media_name(&student.exam_id, &student.name, "png"));
        frame_utils::save_png(&frame, &path).map_err(|source| SessionError::Snapshot {
            path: path.clone(),
            source,
        })?;
        log::info!("Snapshot saved: {}", path.display());
        Ok(path)
    }

    /// Close the current camera and open `index` instead.
    ///
    /// The old handle is released before the new one is opened. If opening
    /// fails the session is left without a camera. A failed finalize of the
    /// running recording does not prevent the switch.
    pub fn switch_camera(&mut self, index: u32) -> Result<Option<FinishedRecording>, SessionError> {
        let finished = self.stop_recording();
        if let Some(mut camera) = self.camera.take() {
            camera.close();
        }
        let camera = match (self.opener)(index) {
            Ok(camera) => camera,
            Err(e) => {
                if let Err(stop) = &finished {
                    log::error!("{}", stop);
                }
                return Err(e.into());
            }
        };
        log::info!("Switched to camera {} ({:.1} fps)", index, camera.fps());
        self.camera = Some(camera);
        finished
    }

    /// One loop iteration: feed the recorder and notice backend failures.
    pub fn tick(&mut self) -> Result<Option<SessionEvent>, SessionError> {
        let Some(active) = self.recording.as_mut() else {
            return Ok(None);
        };

        if !active.recorder.is_active() {
            log::error!("Recording of {} stopped unexpectedly", active.student);
            let Some(active) = self.recording.take() else {
                return Ok(None);
            };
            self.state = SessionState::Idle;
            return Ok(Some(SessionEvent::RecordingAborted(finalize(active)?)));
        }

        if let Some(mut frame) = self.camera.as_ref().and_then(|c| c.latest_frame()) {
            if self.config.rotate {
                frame_utils::rotate180(&mut frame);
            }
            active.recorder.push_frame(&frame);
        }
        Ok(None)
    }

    /// Stop any recording and release the camera.
    pub fn shutdown(&mut self) -> Result<Option<FinishedRecording>, SessionError> {
        let finished = self.stop_recording();
        if let Some(mut camera) = self.camera.take() {
            camera.close();
        }
        finished
    }

    fn ensure_output_dir(&self) -> Result<(), SessionError> {
        let dir = &self.config.output_dir;
        std::fs::create_dir_all(dir).map_err(|source| SessionError::Io {
            path: dir.clone(),
            source,
        })
    }
}

fn finalize(active: ActiveRecording) -> Result<FinishedRecording, SessionError> {
    let duration = active.started.elapsed();
    let stats = active.recorder.stop()?;
    if stats.frames_dropped > 0 {
        log::warn!("{} frame(s) dropped while recording", stats.frames_dropped);
    }
    log::info!("Recording saved: {} ({:.1}s)", active.path.display(), duration.as_secs_f64());
    Ok(FinishedRecording {
        student: active.student,
        path: active.path,
        stats,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Frame, Resolution};
    use std::sync::{Arc, Mutex};

    struct FakeCamera {
        index: u32,
        fps: f64,
        frame: Option<Frame>,
        closed: Arc<Mutex<Vec<u32>>>,
    }

    impl FrameSource for FakeCamera {
        fn latest_frame(&self) -> Option<Frame> {
            self.frame.clone()
        }
        fn fps(&self) -> f64 {
            self.fps
        }
        fn resolution(&self) -> Resolution {
            Resolution::new(2, 1)
        }
        fn index(&self) -> u32 {
            self.index
        }
        fn close(&mut self) {
            self.closed.lock().unwrap().push(self.index);
        }
    }

    #[derive(Default)]
    struct Log {
        started: Vec<RecordRequest>,
        frames: usize,
        stopped: usize,
        fail_stop: bool,
    }

    struct FakeRecorder {
        log: Arc<Mutex<Log>>,
        active: Arc<Mutex<bool>>,
    }

    impl Recorder for FakeRecorder {
        fn push_frame(&mut self, _frame: &Frame) {
            self.log.lock().unwrap().frames += 1;
        }
        fn is_active(&self) -> bool {
            *self.active.lock().unwrap()
        }
        fn stop(self: Box<Self>) -> Result<RecordingStats, EncoderError> {
            let mut log = self.log.lock().unwrap();
            log.stopped += 1;
            if log.fail_stop {
                return Err(EncoderError::ProcessFailed {
                    exit_code: Some(1),
                    stderr: "moov atom not found".to_string(),
                });
            }
            Ok(RecordingStats::default())
        }
    }

    struct FakeFactory {
        log: Arc<Mutex<Log>>,
        active: Arc<Mutex<bool>>,
    }

    impl RecorderFactory for FakeFactory {
        fn start(&mut self, request: &RecordRequest) -> Result<Box<dyn Recorder>, RecordingError> {
            self.log.lock().unwrap().started.push(request.clone());
            *self.active.lock().unwrap() = true;
            Ok(Box::new(FakeRecorder {
                log: Arc::clone(&self.log),
                active: Arc::clone(&self.active),
            }))
        }
    }

    struct Harness {
        session: Session,
        log: Arc<Mutex<Log>>,
        active: Arc<Mutex<bool>>,
        closed: Arc<Mutex<Vec<u32>>>,
        _dir: tempfile::TempDir,
    }

    fn fake_camera(index: u32, fps: f64, closed: &Arc<Mutex<Vec<u32>>>) -> Box<dyn FrameSource> {
        Box::new(FakeCamera {
            index,
            fps,
            frame: Some(Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1)),
            closed: Arc::clone(closed),
        })
    }

    fn harness(students: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let active = Arc::new(Mutex::new(false));
        let closed = Arc::new(Mutex::new(Vec::new()));

        let opener_closed = Arc::clone(&closed);
        let opener: CameraOpener = Box::new(move |index| {
            if index == 9 {
                return Err(CameraError::DeviceNotFound(9));
            }
            Ok(fake_camera(index, 15.0, &opener_closed))
        });
        let factory = Box::new(FakeFactory {
            log: Arc::clone(&log),
            active: Arc::clone(&active),
        });
        let config = SessionConfig {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut session = Session::with_camera(fake_camera(0, 30.0, &closed), opener, factory, config);
        let roster = (0..students)
            .map(|i| Student::new(format!("100{}", i), format!("S{}", i)))
            .collect();
        session.set_roster(roster).unwrap();

        Harness {
            session,
            log,
            active,
            closed,
            _dir: dir,
        }
    }

    #[test]
    fn test_start_and_stop_recording() {
        let mut h = harness(3);
        assert_eq!(h.session.state(), SessionState::Idle);

        let path = h.session.start_recording().unwrap();
        assert!(path.ends_with("1000_S0.mp4"));
        assert_eq!(h.session.state(), SessionState::Recording);
        assert!(matches!(h.session.start_recording(), Err(SessionError::AlreadyRecording)));

        let finished = h.session.stop_recording().unwrap().unwrap();
        assert_eq!(finished.student, Student::new("1000", "S0"));
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.log.lock().unwrap().stopped, 1);
        assert!(h.session.stop_recording().unwrap().is_none());
    }

    #[test]
    fn test_empty_roster_cannot_record() {
        let mut h = harness(0);
        assert!(matches!(h.session.start_recording(), Err(SessionError::NoStudent)));
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.session.next_student().unwrap().is_none());
        assert_eq!(h.session.cursor(), 0);
    }

    #[test]
    fn test_toggle_recording_stops_and_advances() {
        let mut h = harness(2);
        assert!(matches!(h.session.toggle_recording().unwrap(), ActionOutcome::Started(_)));
        assert!(matches!(h.session.toggle_recording().unwrap(), ActionOutcome::Stopped(_)));
        assert_eq!(h.session.cursor(), 1);
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[test]
    fn test_navigation_clamps_without_wraparound() {
        let mut h = harness(2);
        h.session.previous_student().unwrap();
        assert_eq!(h.session.cursor(), 0);
        h.session.next_student().unwrap();
        h.session.next_student().unwrap();
        assert_eq!(h.session.cursor(), 1);
    }

    #[test]
    fn test_navigation_stops_recording_first() {
        let mut h = harness(3);
        h.session.start_recording().unwrap();
        let finished = h.session.next_student().unwrap();
        assert_eq!(finished.unwrap().student.exam_id, "1000");
        assert_eq!(h.session.state(), SessionState::Idle);
        assert_eq!(h.session.cursor(), 1);
    }

    #[test]
    fn test_toggle_mode_and_photo_action() {
        let mut h = harness(2);
        h.session.start_recording().unwrap();
        assert!(h.session.toggle_mode().unwrap().is_some());
        assert_eq!(h.session.state(), SessionState::PreviewOnly);

        let outcome = h.session.action().unwrap();
        let ActionOutcome::Snapshot(path) = outcome else {
            panic!("expected snapshot");
        };
        assert!(path.ends_with("1000_S0.png"));
        assert!(path.exists());
        assert_eq!(h.session.cursor(), 1);

        h.session.toggle_mode().unwrap();
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[test]
    fn test_snapshot_rotation() {
        let mut h = harness(1);
        h.session.toggle_rotation();
        let path = h.session.snapshot().unwrap();
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [4, 5, 6]);
        assert_eq!(img.get_pixel(1, 0).0, [1, 2, 3]);
    }

    #[test]
    fn test_set_roster_resets_cursor_and_stops() {
        let mut h = harness(3);
        h.session.next_student().unwrap();
        h.session.start_recording().unwrap();
        let finished = h.session.set_roster(vec![Student::new("9", "X")]).unwrap();
        assert!(finished.is_some());
        assert_eq!(h.session.cursor(), 0);
        assert_eq!(h.session.current_student().unwrap().name, "X");
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[test]
    fn test_switch_camera_closes_old_and_rereads_fps() {
        let mut h = harness(1);
        assert_eq!(h.session.fps(), 30.0);
        h.session.start_recording().unwrap();
        h.session.switch_camera(2).unwrap();
        assert_eq!(*h.closed.lock().unwrap(), vec![0]);
        assert_eq!(h.session.camera_index(), Some(2));
        assert_eq!(h.session.fps(), 15.0);
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[test]
    fn test_failed_switch_leaves_no_camera() {
        let mut h = harness(1);
        assert!(h.session.switch_camera(9).is_err());
        assert_eq!(h.session.camera_index(), None);
        assert!(matches!(h.session.snapshot(), Err(SessionError::NoCamera)));
        assert!(matches!(h.session.start_recording(), Err(SessionError::NoCamera)));
    }

    #[test]
    fn test_tick_feeds_frames_and_reports_abort() {
        let mut h = harness(1);
        assert!(h.session.tick().unwrap().is_none());
        h.session.start_recording().unwrap();
        h.session.tick().unwrap();
        h.session.tick().unwrap();
        assert_eq!(h.log.lock().unwrap().frames, 2);

        *h.active.lock().unwrap() = false;
        let event = h.session.tick().unwrap();
        assert!(matches!(event, Some(SessionEvent::RecordingAborted(_))));
        assert_eq!(h.session.state(), SessionState::Idle);
    }

    #[test]
    fn test_record_request_carries_settings() {
        let mut h = harness(1);
        h.session.toggle_rotation();
        h.session.set_volume(180);
        h.session.start_recording().unwrap();
        let log = h.log.lock().unwrap();
        let request = &log.started[0];
        assert!(request.rotate);
        assert_eq!(request.volume, 100);
        assert_eq!(request.fps, 30.0);
        assert_eq!(request.device_index, 0);
    }

    #[test]
    fn test_failed_finalize_still_applies_transitions() {
        let mut h = harness(3);
        h.log.lock().unwrap().fail_stop = true;

        h.session.start_recording().unwrap();
        let err = h.session.next_student().unwrap_err();
        assert!(matches!(err, SessionError::Encoder(EncoderError::ProcessFailed { .. })));
        assert_eq!(h.session.cursor(), 1);
        assert_eq!(h.session.state(), SessionState::Idle);

        h.session.start_recording().unwrap();
        assert!(h.session.previous_student().is_err());
        assert_eq!(h.session.cursor(), 0);

        h.session.start_recording().unwrap();
        assert!(h.session.switch_camera(2).is_err());
        assert_eq!(h.session.camera_index(), Some(2));

        h.session.start_recording().unwrap();
        assert!(h.session.toggle_mode().is_err());
        assert_eq!(h.session.state(), SessionState::PreviewOnly);

        h.session.start_recording().unwrap();
        assert!(h.session.set_roster(vec![Student::new("9", "X")]).is_err());
        assert_eq!(h.session.students().len(), 1);
        assert_eq!(h.session.cursor(), 0);

        // Nothing is left recording after the failures.
        assert!(h.session.stop_recording().unwrap().is_none());
        assert_eq!(h.log.lock().unwrap().stopped, 5);
    }
}
