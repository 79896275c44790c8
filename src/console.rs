//! Line-oriented control surface for a capture session.
//!
//! A reader thread turns input lines into commands; the session loop polls
//! them between ticks together with background roster loads and Ctrl+C.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use crate::ffmpeg::ctrlc_received;
use crate::roster::{self, LoadedSheet, RosterError, SheetSelector};
use crate::session::{ActionOutcome, FinishedRecording, Session, SessionError, SessionEvent};

pub const HELP: &str = "\
Commands:
  r          record / stop (photo mode: snapshot and advance)
  s          snapshot
  n, p       next / previous student
  m          toggle record / photo mode
  o          toggle 180° rotation
  c <index>  switch camera
  l <sheet>  load roster sheet by index or name
  v <0-100>  microphone volume
  i          status
  h          this help
  q          quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Action,
    Snapshot,
    Next,
    Previous,
    ToggleMode,
    ToggleRotation,
    Camera(u32),
    LoadSheet(SheetSelector),
    Volume(u8),
    Status,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let command = match head {
        "" => return Ok(None),
        "r" => Command::Action,
        "s" => Command::Snapshot,
        "n" => Command::Next,
        "p" => Command::Previous,
        "m" => Command::ToggleMode,
        "o" => Command::ToggleRotation,
        "i" => Command::Status,
        "h" | "?" => Command::Help,
        "q" => Command::Quit,
        "c" => Command::Camera(
            rest.parse()
                .map_err(|_| format!("'{}' is not a camera index", rest))?,
        ),
        "l" => {
            if rest.is_empty() {
                return Err("Usage: l <sheet index or name>".to_string());
            }
            Command::LoadSheet(SheetSelector::parse(rest))
        }
        "v" => {
            let volume: u8 = rest
                .parse()
                .map_err(|_| format!("'{}' is not a valid volume", rest))?;
            if volume > 100 {
                return Err(format!("Volume must be between 0 and 100, got {}", volume));
            }
            Command::Volume(volume)
        }
        other => return Err(format!("Unknown command '{}' (h for help)", other)),
    };
    Ok(Some(command))
}

/// Forward lines from `input` on a channel. The channel disconnects at EOF.
pub fn spawn_line_reader<R: BufRead + Send + 'static>(input: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Loads roster sheets off the session thread.
#[derive(Debug)]
pub struct RosterLoader {
    path: PathBuf,
    tx: Sender<Result<LoadedSheet, RosterError>>,
    rx: Receiver<Result<LoadedSheet, RosterError>>,
}

impl RosterLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            path: path.into(),
            tx,
            rx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start loading `selector` in the background.
    pub fn request(&self, selector: SheetSelector) {
        let path = self.path.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let _ = tx.send(roster::load_sheet(&path, &selector));
        });
    }

    /// A finished load, if any.
    pub fn poll(&self) -> Option<Result<LoadedSheet, RosterError>> {
        self.rx.try_recv().ok()
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Drive `session` from `input` until `q`, EOF or Ctrl+C.
///
/// Command errors are printed and the session keeps running.
pub fn run<R: BufRead + Send + 'static>(
    session: &mut Session,
    input: R,
    loader: Option<&RosterLoader>,
) -> Result<(), SessionError> {
    let lines = spawn_line_reader(input);
    print_status(session);
    println!("Type h for help.");

    'session: loop {
        if ctrlc_received() {
            println!("\nShutting down...");
            break;
        }

        loop {
            match lines.try_recv() {
                Ok(line) => match parse_command(&line) {
                    Ok(Some(command)) => match execute(session, command, loader) {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => break 'session,
                        Err(e) => println!("Error: {}", e),
                    },
                    Ok(None) => {}
                    Err(message) => println!("{}", message),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'session,
            }
        }

        if let Some(result) = loader.and_then(RosterLoader::poll) {
            match result {
                Ok(loaded) => apply_roster(session, loaded),
                Err(e) => println!("Error: {}", e),
            }
        }

        match session.tick() {
            Ok(Some(SessionEvent::RecordingAborted(finished))) => {
                println!("Recording stopped unexpectedly, partial file kept:");
                print_finished(&finished);
            }
            Ok(None) => {}
            Err(e) => println!("Error: {}", e),
        }

        thread::sleep(session.frame_interval());
    }

    if let Some(finished) = session.shutdown()? {
        print_finished(&finished);
    }
    Ok(())
}

fn execute(session: &mut Session, command: Command, loader: Option<&RosterLoader>) -> Result<Flow, SessionError> {
    match command {
        Command::Action => match session.action()? {
            ActionOutcome::Started(path) => println!("● Recording {}", path.display()),
            ActionOutcome::Stopped(finished) => {
                print_finished(&finished);
                print_current(session);
            }
            ActionOutcome::Snapshot(path) => {
                println!("Saved {}", path.display());
                print_current(session);
            }
        },
        Command::Snapshot => println!("Saved {}", session.snapshot()?.display()),
        Command::Next => {
            report(session.next_student()?);
            print_current(session);
        }
        Command::Previous => {
            report(session.previous_student()?);
            print_current(session);
        }
        Command::ToggleMode => {
            report(session.toggle_mode()?);
            println!("Mode: {}", session.state());
        }
        Command::ToggleRotation => {
            let on = session.toggle_rotation();
            println!("Rotation 180°: {}", if on { "on" } else { "off" });
        }
        Command::Camera(index) => {
            println!("Switching to camera {}...", index);
            report(session.switch_camera(index)?);
            println!("Camera {} ready ({:.1} fps)", index, session.fps());
        }
        Command::LoadSheet(selector) => match loader {
            Some(loader) => {
                println!("Loading {}...", loader.path().display());
                loader.request(selector);
            }
            None => println!("No roster file configured (use --roster)"),
        },
        Command::Volume(volume) => {
            session.set_volume(volume);
            println!("Volume: {}", session.volume());
        }
        Command::Status => print_status(session),
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn apply_roster(session: &mut Session, loaded: LoadedSheet) {
    if loaded.fell_back {
        println!("Sheet not found, using '{}' instead", loaded.roster.class_label);
    }
    let count = loaded.roster.students.len();
    match session.set_roster(loaded.roster.students) {
        Ok(finished) => report(finished),
        Err(e) => println!("Error: {}", e),
    }
    println!("Loaded {}: {} students", loaded.roster.class_label, count);
    print_current(session);
}

fn report(finished: Option<FinishedRecording>) {
    if let Some(finished) = finished {
        print_finished(&finished);
    }
}

fn print_finished(finished: &FinishedRecording) {
    println!(
        "■ Saved {} ({:.1}s)",
        finished.path.display(),
        finished.duration.as_secs_f64()
    );
    if finished.stats.frames_dropped > 0 {
        println!("  {} frame(s) dropped", finished.stats.frames_dropped);
    }
    if finished.stats.restarts > 0 {
        println!(
            "  Encoder restarted {} time(s); later footage is in _partN files",
            finished.stats.restarts
        );
    }
    if finished.stats.terminated {
        println!("  Encoder had to be terminated; the file may be incomplete");
    }
}

fn print_current(session: &Session) {
    match session.current_student() {
        Some(student) => println!(
            "[{}/{}] {}",
            session.cursor() + 1,
            session.students().len(),
            student
        ),
        None => println!("No students loaded"),
    }
}

fn print_status(session: &Session) {
    println!("State:    {}", session.state());
    match session.camera_index() {
        Some(index) => println!("Camera:   {} ({:.1} fps)", index, session.fps()),
        None => println!("Camera:   none"),
    }
    println!("Rotation: {}", if session.rotate() { "180°" } else { "off" });
    println!("Volume:   {}", session.volume());
    println!("Output:   {}", session.output_dir().display());
    print_current(session);
}
