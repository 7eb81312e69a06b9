//! RTMP output. Owns the named pipe, the long-lived ffmpeg ingest process
//! that reads PCM from it, and the per-clip transcode children that write
//! into it. One transcode at a time; the pipe stays open between clips.

use crate::error::{Result, StationError};
use crate::process::{spawn_tool, ToolChild};
use crate::renderer::SAMPLE_RATE;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Grace given to a transcode child between SIGTERM and SIGKILL.
const ABORT_GRACE: Duration = Duration::from_secs(2);
/// Grace given to the ingest process after the pipe closes.
const INGEST_GRACE: Duration = Duration::from_secs(3);
/// How long to wait for the ingest to open the pipe's read side.
const FIFO_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Events the sink emits. The engine and runtime state consume these; the
/// sink holds no reference back to either.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Started { rtmp_url: String },
    IngestLine(String),
    IngestExited(Option<i32>),
    Stopped,
}

pub type SinkEventFn = Arc<dyn Fn(SinkEvent) + Send + Sync>;

/// Where a sink clip is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipState {
    Idle,
    Transcoding,
    Aborted,
    Done,
}

/// The one-clip-at-a-time slot. State transitions are explicit so the
/// at-most-one-transcode rule is enforced in one place.
struct ClipSlot {
    state: ClipState,
    child: Option<ToolChild>,
    aborted: bool,
}

impl ClipSlot {
    fn new() -> Self {
        ClipSlot {
            state: ClipState::Idle,
            child: None,
            aborted: false,
        }
    }

    /// Idle/Aborted/Done → Transcoding. Fails while a clip is in flight.
    fn begin(&mut self, child: ToolChild) -> Result<()> {
        if self.state == ClipState::Transcoding {
            return Err(StationError::Render(
                "a transcode is already in flight".to_string(),
            ));
        }
        self.state = ClipState::Transcoding;
        self.aborted = false;
        self.child = Some(child);
        Ok(())
    }

    /// Transcoding → Aborted. Returns false when nothing is in flight.
    fn abort(&mut self) -> bool {
        if self.state != ClipState::Transcoding {
            return false;
        }
        self.aborted = true;
        self.state = ClipState::Aborted;
        if let Some(child) = self.child.as_mut() {
            child.terminate(ABORT_GRACE);
        }
        true
    }

    /// Settle the slot once the child has been reaped.
    fn finish(&mut self, exit_code: Option<i32>) -> ClipState {
        self.child = None;
        if self.aborted {
            self.state = ClipState::Aborted;
        } else if exit_code == Some(0) {
            self.state = ClipState::Done;
        } else {
            self.state = ClipState::Idle;
        }
        self.state
    }
}

/// The output seam the playout engine drives. The RTMP sink is the real
/// implementation; the headless suite substitutes a recorder.
pub trait Output: Send + Sync {
    fn start(&self) -> Result<()>;
    /// Transcode one file into the stream. Blocks until the clip has been
    /// fully handed to the pipe; fails when the transcode exits non-zero
    /// or was aborted.
    fn push_file(&self, path: &Path) -> Result<()>;
    /// Terminate the in-flight transcode, if any.
    fn abort_current(&self) -> bool;
    fn stop(&self);
    fn is_running(&self) -> bool;
}

pub struct RtmpSink {
    fifo_path: PathBuf,
    rtmp_url: String,
    ffmpeg: String,
    on_event: SinkEventFn,
    running: Arc<AtomicBool>,
    ingest: Arc<Mutex<Option<ToolChild>>>,
    writer: Mutex<Option<File>>,
    clip: Arc<Mutex<ClipSlot>>,
}

impl RtmpSink {
    pub fn new(
        fifo_path: PathBuf,
        rtmp_url: String,
        ffmpeg: String,
        on_event: SinkEventFn,
    ) -> Self {
        RtmpSink {
            fifo_path,
            rtmp_url,
            ffmpeg,
            on_event,
            running: Arc::new(AtomicBool::new(false)),
            ingest: Arc::new(Mutex::new(None)),
            writer: Mutex::new(None),
            clip: Arc::new(Mutex::new(ClipSlot::new())),
        }
    }
}

/// Ingest invocation: raw PCM from the pipe, AAC into an FLV push, paced
/// at input rate.
pub fn ingest_args(fifo: &Path, rtmp_url: &str) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-re".into(),
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-ac".into(),
        "2".into(),
        "-i".into(),
        fifo.to_string_lossy().to_string(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-f".into(),
        "flv".into(),
        rtmp_url.to_string(),
    ]
}

/// Per-clip transcode invocation: any input file to raw PCM on stdout.
pub fn transcode_args(input: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
        "-f".into(),
        "s16le".into(),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-ac".into(),
        "2".into(),
        "pipe:1".into(),
    ]
}

/// Replace whatever is at `path` with a fresh FIFO node.
fn make_fifo(path: &Path) -> Result<()> {
    let _ = std::fs::remove_file(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| StationError::Io(std::io::Error::other("fifo path contains NUL")))?;
    let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o644) };
    if rc != 0 {
        return Err(StationError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Open the FIFO's write side. Retries until the reader (the ingest) shows
/// up, then switches the descriptor back to blocking writes so the pipe
/// provides natural backpressure.
fn open_fifo_writer(path: &Path, timeout: Duration) -> Result<File> {
    let deadline = Instant::now() + timeout;
    loop {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(file) => {
                let fd = file.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK);
                }
                return Ok(file);
            }
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                if Instant::now() >= deadline {
                    return Err(StationError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "no reader opened the stream pipe",
                    )));
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(StationError::Io(e)),
        }
    }
}

impl Output for RtmpSink {
    fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        make_fifo(&self.fifo_path)?;

        let on_event = Arc::clone(&self.on_event);
        let line_events = Arc::clone(&self.on_event);
        let child = spawn_tool(&self.ffmpeg, &ingest_args(&self.fifo_path, &self.rtmp_url), {
            move |line| line_events(SinkEvent::IngestLine(line.to_string()))
        })
        .inspect_err(|_| self.running.store(false, Ordering::SeqCst))?;

        *self.ingest.lock().unwrap() = Some(child);

        // Watch for the ingest dying underneath us.
        {
            let ingest = Arc::clone(&self.ingest);
            let running = Arc::clone(&self.running);
            let on_exit = Arc::clone(&self.on_event);
            std::thread::Builder::new()
                .name("rtmp-ingest-watch".into())
                .spawn(move || loop {
                    {
                        let mut guard = ingest.lock().unwrap();
                        match guard.as_mut() {
                            Some(child) => {
                                if let Some(code) = child.try_wait() {
                                    guard.take();
                                    drop(guard);
                                    if running.swap(false, Ordering::SeqCst) {
                                        tracing::error!("ffmpeg ingest exited: {:?}", code);
                                        on_exit(SinkEvent::IngestExited(Some(code)));
                                    }
                                    return;
                                }
                            }
                            None => return,
                        }
                    }
                    std::thread::sleep(Duration::from_millis(200));
                })
                .expect("failed to spawn ingest watch thread");
        }

        let writer = match open_fifo_writer(&self.fifo_path, FIFO_OPEN_TIMEOUT) {
            Ok(writer) => writer,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                if let Some(mut child) = self.ingest.lock().unwrap().take() {
                    child.terminate(INGEST_GRACE);
                }
                return Err(e);
            }
        };
        *self.writer.lock().unwrap() = Some(writer);

        on_event(SinkEvent::Started {
            rtmp_url: self.rtmp_url.clone(),
        });
        Ok(())
    }

    fn push_file(&self, path: &Path) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(StationError::Render("sink is not running".to_string()));
        }

        let mut child = spawn_tool(&self.ffmpeg, &transcode_args(path), |line| {
            tracing::debug!("transcode: {}", line);
        })?;
        let mut stdout = child
            .take_stdout()
            .ok_or_else(|| StationError::Render("transcode has no stdout".to_string()))?;

        self.clip.lock().unwrap().begin(child)?;

        // Pump PCM into the pipe. The pipe write blocks at the ingest's
        // real-time pace, which is the whole backpressure story.
        let mut buf = [0u8; 32 * 1024];
        let pump_result: std::io::Result<()> = loop {
            match stdout.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    let mut writer = self.writer.lock().unwrap();
                    match writer.as_mut() {
                        Some(w) => {
                            if let Err(e) = w.write_all(&buf[..n]) {
                                break Err(e);
                            }
                        }
                        None => {
                            break Err(std::io::Error::other("stream pipe closed"));
                        }
                    }
                }
                Err(e) => break Err(e),
            }
        };

        // Reap and settle the slot.
        let mut slot = self.clip.lock().unwrap();
        let exit_code = match slot.child.as_mut() {
            Some(child) => child.wait()?,
            None => None,
        };
        let state = slot.finish(exit_code);
        drop(slot);

        match state {
            ClipState::Done => {
                pump_result.map_err(StationError::Io)?;
                Ok(())
            }
            ClipState::Aborted => Err(StationError::Process {
                program: self.ffmpeg.clone(),
                args: transcode_args(path),
                exit_code,
                stderr: "transcode aborted".to_string(),
            }),
            _ => Err(StationError::Process {
                program: self.ffmpeg.clone(),
                args: transcode_args(path),
                exit_code,
                stderr: "transcode exited non-zero".to_string(),
            }),
        }
    }

    fn abort_current(&self) -> bool {
        self.clip.lock().unwrap().abort()
    }

    fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.abort_current();

        // Closing the write side is what ends the ingest's input.
        self.writer.lock().unwrap().take();

        if let Some(mut child) = self.ingest.lock().unwrap().take() {
            child.terminate(INGEST_GRACE);
        }
        if was_running {
            (self.on_event)(SinkEvent::Stopped);
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for RtmpSink {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
