//! Child-tool plumbing. Every external program (ffmpeg, ffprobe, yt-dlp)
//! goes through here: one-shot runs with captured output, and long-lived
//! spawns with a line-oriented stderr callback and graceful termination.

use crate::error::{Result, StationError};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Captured output of a completed tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run a short-lived tool to completion, capturing both streams.
/// Non-zero exit becomes a `Process` error carrying the stderr tail.
pub fn run_tool(program: &str, args: &[String], cwd: Option<&Path>) -> Result<ToolOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd.output().map_err(|e| StationError::Process {
        program: program.to_string(),
        args: args.to_vec(),
        exit_code: None,
        stderr: format!("failed to launch: {}", e),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if output.status.success() {
        Ok(ToolOutput { stdout, stderr })
    } else {
        Err(StationError::Process {
            program: program.to_string(),
            args: args.to_vec(),
            exit_code: output.status.code(),
            stderr: stderr_tail(&stderr),
        })
    }
}

/// Keep error messages bounded: the last few lines are where ffmpeg puts
/// the reason.
fn stderr_tail(stderr: &str) -> String {
    const TAIL_LINES: usize = 6;
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join("\n")
}

/// A spawned tool with piped stdio. The stderr stream is drained on a
/// dedicated thread so the child never blocks on a full pipe.
pub struct ToolChild {
    child: Child,
    program: String,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    last_stderr: Arc<Mutex<Option<String>>>,
    stderr_thread: Option<JoinHandle<()>>,
}

/// Spawn a tool with stdin/stdout piped and stderr routed line by line to
/// `on_stderr_line`.
pub fn spawn_tool<F>(program: &str, args: &[String], on_stderr_line: F) -> Result<ToolChild>
where
    F: Fn(&str) + Send + 'static,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StationError::Process {
            program: program.to_string(),
            args: args.to_vec(),
            exit_code: None,
            stderr: format!("failed to launch: {}", e),
        })?;

    let last_stderr = Arc::new(Mutex::new(None));
    let stderr_thread = child.stderr.take().map(|stderr| {
        let last = Arc::clone(&last_stderr);
        std::thread::Builder::new()
            .name(format!("{}-stderr", program))
            .spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) => {
                            on_stderr_line(&line);
                            *last.lock().unwrap() = Some(line);
                        }
                        Err(_) => break,
                    }
                }
            })
            .expect("failed to spawn stderr reader thread")
    });

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();

    Ok(ToolChild {
        child,
        program: program.to_string(),
        stdin,
        stdout,
        last_stderr,
        stderr_thread,
    })
}

impl ToolChild {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Take ownership of the child's stdout stream (once).
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take ownership of the child's stdin stream (once).
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// The most recent stderr line seen, if any.
    pub fn last_stderr_line(&self) -> Option<String> {
        self.last_stderr.lock().unwrap().clone()
    }

    /// Block until the child exits. Returns the exit code when the child
    /// exited normally.
    pub fn wait(&mut self) -> Result<Option<i32>> {
        // Drop our stdin handle so the child sees EOF.
        self.stdin.take();
        let status = self.child.wait().map_err(StationError::Io)?;
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
        Ok(status.code())
    }

    /// Has the child exited yet? Non-blocking.
    pub fn try_wait(&mut self) -> Option<i32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.code().unwrap_or(-1)),
            _ => None,
        }
    }

    /// Graceful stop: SIGTERM, then SIGKILL after `grace` if the child is
    /// still running. Returns the exit code when one is available.
    pub fn terminate(&mut self, grace: Duration) -> Option<i32> {
        let pid = self.child.id() as libc::pid_t;
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(handle) = self.stderr_thread.take() {
                        let _ = handle.join();
                    }
                    return status.code();
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = self.child.kill();
                        let code = self.child.wait().ok().and_then(|s| s.code());
                        if let Some(handle) = self.stderr_thread.take() {
                            let _ = handle.join();
                        }
                        return code;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    tracing::warn!("try_wait on {} failed: {}", self.program, e);
                    return None;
                }
            }
        }
    }
}

impl Drop for ToolChild {
    fn drop(&mut self) {
        // Never leak a child past the handle that owns it.
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
