//! FFmpeg process management for rollcam.
//!
//! Every camera read, video encode and audio test goes through an `ffmpeg`
//! child process. This module handles spawning, stderr collection and
//! graceful termination of those processes.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

/// How long a graceful shutdown may take before the process is killed.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that can occur while driving an external encoder process.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("FFmpeg not found. Please install it and make sure `ffmpeg` is on PATH")]
    NotFound,
    #[error("Failed to spawn FFmpeg: {0}")]
    SpawnFailed(#[source] std::io::Error),
    #[error("FFmpeg exited with code {exit_code:?}\n{stderr}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("FFmpeg I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which standard streams of the child are piped back to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipes {
    /// Nothing but stderr; the process writes its own output file.
    None,
    /// Raw data is written to the process on stdin.
    Stdin,
    /// Raw data is read from the process on stdout.
    Stdout,
    /// Stdin is kept open for control keys (`q` to finish).
    Control,
}

/// A running `ffmpeg` process.
pub struct FfmpegProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr_lines: Arc<Mutex<Vec<String>>>,
    stderr_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FfmpegProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegProcess")
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

impl FfmpegProcess {
    /// Spawn `ffmpeg` with the given arguments (excluding the program name).
    pub fn spawn<S: AsRef<str>>(args: &[S], pipes: Pipes) -> Result<Self, EncoderError> {
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        log::debug!("ffmpeg {}", args.join(" "));

        let mut cmd = Command::new("ffmpeg");
        cmd.args(&args)
            .stdin(match pipes {
                Pipes::Stdin | Pipes::Control => Stdio::piped(),
                _ => Stdio::null(),
            })
            .stdout(match pipes {
                Pipes::Stdout => Stdio::piped(),
                _ => Stdio::null(),
            })
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EncoderError::NotFound
            } else {
                EncoderError::SpawnFailed(e)
            }
        })?;

        let stderr_lines = Arc::new(Mutex::new(Vec::new()));
        let stderr_thread = child.stderr.take().map(|stderr| {
            let lines = Arc::clone(&stderr_lines);
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            log::debug!("[ffmpeg] {}", l);
                            if let Ok(mut lines) = lines.lock() {
                                lines.push(l);
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
        });

        Ok(Self {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            child,
            stderr_lines,
            stderr_thread,
        })
    }

    /// Run `ffmpeg` to completion, returning its collected stderr.
    ///
    /// A non-zero exit is reported as [`EncoderError::ProcessFailed`].
    pub fn run<S: AsRef<str>>(args: &[S]) -> Result<Vec<String>, EncoderError> {
        let mut process = Self::spawn(args, Pipes::None)?;
        let status = process.wait()?;
        let stderr = process.take_stderr_output();
        if status.success() {
            Ok(stderr)
        } else {
            Err(EncoderError::ProcessFailed {
                exit_code: status.code(),
                stderr: tail(&stderr, 20),
            })
        }
    }

    /// Take the stdin pipe for writing raw data.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Take the stdout pipe for reading raw data.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Check whether the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Exit status if the process has already finished.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Wait for the process to complete.
    pub fn wait(&mut self) -> Result<ExitStatus, EncoderError> {
        // Closing stdin lets rawvideo readers see EOF.
        drop(self.stdin.take());
        Ok(self.child.wait()?)
    }

    /// Wait up to `timeout` for the process to exit on its own.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>, EncoderError> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if start.elapsed() > timeout {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    /// Ask ffmpeg to finish the file by sending `q` on its control stdin.
    ///
    /// Falls back to [`FfmpegProcess::shutdown`] if the key can't be sent or
    /// the process doesn't exit within `timeout`.
    pub fn finish(&mut self, timeout: Duration) -> Result<ExitStatus, EncoderError> {
        let sent = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(b"q").and_then(|_| stdin.flush()).is_ok(),
            None => false,
        };
        if sent {
            if let Some(status) = self.wait_timeout(timeout)? {
                return Ok(status);
            }
            log::warn!("ffmpeg did not exit after 'q', terminating");
        }
        self.shutdown()
    }

    /// Request a graceful shutdown.
    ///
    /// Sends SIGINT (so the container gets finalized) and waits up to
    /// [`SHUTDOWN_TIMEOUT`] before killing the process.
    pub fn shutdown(&mut self) -> Result<ExitStatus, EncoderError> {
        drop(self.stdin.take());

        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        #[cfg(unix)]
        {
            // SAFETY: the pid belongs to a child we spawned and haven't reaped.
            unsafe {
                libc::kill(self.child.id() as i32, libc::SIGINT);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        match self.wait_timeout(SHUTDOWN_TIMEOUT)? {
            Some(status) => Ok(status),
            None => self.kill(),
        }
    }

    /// Kill the process immediately.
    pub fn kill(&mut self) -> Result<ExitStatus, EncoderError> {
        let _ = self.child.kill();
        Ok(self.child.wait()?)
    }

    /// Stderr lines received so far, while the process keeps running.
    pub fn stderr_snapshot(&self) -> Vec<String> {
        self.stderr_lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Collected stderr output; joins the reader thread.
    pub fn take_stderr_output(&mut self) -> Vec<String> {
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
        self.stderr_lines
            .lock()
            .map(|mut l| std::mem::take(&mut *l))
            .unwrap_or_default()
    }

    /// Process ID of the child.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.shutdown();
        }
    }
}

/// Check that an `ffmpeg` binary can be executed.
pub fn is_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Forcefully terminate a process by id.
///
/// Used when the owning thread is stuck and the handle can't be reached.
pub fn kill_pid(pid: u32) {
    #[cfg(unix)]
    {
        // SAFETY: sending a signal has no memory-safety requirements.
        unsafe {
            libc::kill(pid as i32, libc::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Last `n` lines joined, for error messages.
pub fn tail(lines: &[String], n: usize) -> String {
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Global flag for handling Ctrl+C across the application.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Check if Ctrl+C has been received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler. Call once at startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}
