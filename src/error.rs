use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the broadcast core.
///
/// The playout loop never crashes on these: builder failures turn into
/// recovery silence, render failures abort one tick, and the last error is
/// always visible in the dashboard snapshot.
#[derive(Error, Debug)]
pub enum StationError {
    /// No usable downloader could be resolved at startup.
    #[error("no downloader available: {0}")]
    DependencyMissing(String),

    /// A child tool exited non-zero.
    #[error("{program} exited with status {exit_code:?}: {stderr}")]
    Process {
        program: String,
        args: Vec<String>,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The timeline renderer (ffmpeg mix) failed.
    #[error("render failed: {0}")]
    Render(String),

    /// The TTS endpoint failed or returned an unusable response.
    #[error("tts failed: {0}")]
    Tts(String),

    /// The TTS endpoint returned JSON with none of the accepted keys.
    #[error("unsupported tts payload, keys seen: {keys_seen:?}")]
    TtsUnsupportedPayload { keys_seen: Vec<String> },

    /// The commentary LLM call failed or returned empty content.
    #[error("commentary failed: {0}")]
    Commentary(String),

    /// The catalog file is missing, malformed, or empty.
    #[error("invalid catalog: {0}")]
    CatalogInvalid(String),

    /// A queue mutation referenced an unknown segment id.
    #[error("no queued segment with id '{0}'")]
    QueueMiss(String),

    /// Rebuilding the timeline snapshot failed.
    #[error("scheduler rebuild failed: {0}")]
    SchedulerRebuild(String),

    /// The RTMP ingest process ended.
    #[error("publisher exited with status {0:?}")]
    PublisherExited(Option<i32>),

    /// A requested file is outside the directories the API may serve.
    #[error("path not allowed: {0}")]
    PathNotAllowed(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, StationError>;

impl StationError {
    /// Short machine-readable tag for the dashboard error ring.
    pub fn tag(&self) -> &'static str {
        match self {
            StationError::DependencyMissing(_) => "dependency_missing",
            StationError::Process { .. } => "process",
            StationError::Render(_) => "render",
            StationError::Tts(_) => "tts",
            StationError::TtsUnsupportedPayload { .. } => "tts_payload",
            StationError::Commentary(_) => "commentary",
            StationError::CatalogInvalid(_) => "catalog",
            StationError::QueueMiss(_) => "queue_miss",
            StationError::SchedulerRebuild(_) => "scheduler",
            StationError::PublisherExited(_) => "publisher",
            StationError::PathNotAllowed(_) => "path",
            StationError::Io(_) => "io",
            StationError::Http(_) => "http",
        }
    }
}
