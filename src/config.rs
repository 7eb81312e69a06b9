//! Station configuration, read once from the environment at startup and
//! threaded through every constructor. There is no global config state.

use std::collections::HashMap;
use std::path::PathBuf;

/// Everything the station needs to run, with the documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// API key for the commentary LLM. Empty = deterministic fallback only.
    pub llm_api_key: String,
    /// Chat-completion endpoint base (OpenAI-compatible).
    pub llm_base_url: String,
    /// Model name for the commentary LLM.
    pub llm_model: String,
    /// Path to the JSON track catalog. Required.
    pub catalog_path: PathBuf,
    /// TTS service base URL; `POST {base}/generate`.
    pub tts_base_url: String,
    /// RTMP target the ingest process pushes to.
    pub rtmp_url: String,
    /// Songs between commentary breaks.
    pub commentary_cadence: u32,
    /// Scratch directory: cache, FIFO, intermediaries.
    pub work_dir: PathBuf,
    /// Directory of pre-recorded emergency liners (optional).
    pub liner_dir: Option<PathBuf>,
    /// On-air station name, used in commentary prompts and fallbacks.
    pub station_name: String,
    /// Station-identification WAV prepended to commentary (optional).
    pub station_id_wav: Option<PathBuf>,
    /// Build-ahead target in seconds of buffered output.
    pub target_buffer_secs: f64,
    /// Below this the engine builds at full tilt.
    pub min_buffer_secs: f64,
    /// Timeline engine v2: chunked two-deck playout instead of per-segment.
    pub timeline_engine_v2: bool,
    /// Audio engine v2: apply the mastering chain to rendered windows.
    pub audio_engine_v2: bool,
    /// Window length for mastered output when audio engine v2 is on.
    pub master_window_secs: f64,
    /// Carry the commentary-bed overlap into the next song's source offset.
    pub commentary_bed_carryover: bool,
    /// External tool binaries, overridable for odd installs.
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub ytdlp_bin: String,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Build a config from an explicit variable map. Unset or unparsable
    /// values fall back to defaults; only `CATALOG_PATH` has no default.
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).map(|s| s.trim().to_string());
        let flag = |key: &str| {
            get(key)
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };

        Config {
            port: get("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000),
            llm_api_key: get("OPENAI_API_KEY").unwrap_or_default(),
            llm_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            llm_model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            catalog_path: PathBuf::from(get("CATALOG_PATH").unwrap_or_default()),
            tts_base_url: get("TTS_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            rtmp_url: get("RTMP_URL")
                .unwrap_or_else(|| "rtmp://localhost:1935/live/radio".to_string()),
            commentary_cadence: get("COMMENTARY_EVERY_N_SONGS")
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(2),
            work_dir: PathBuf::from(get("WORK_DIR").unwrap_or_else(|| "/tmp/rj".to_string())),
            liner_dir: get("LINER_DIR").filter(|s| !s.is_empty()).map(PathBuf::from),
            station_name: get("STATION_NAME").unwrap_or_else(|| "Airwave".to_string()),
            station_id_wav: get("STATION_ID_WAV")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            target_buffer_secs: get("TARGET_BUFFER_SEC")
                .and_then(|v| v.parse().ok())
                .unwrap_or(600.0),
            min_buffer_secs: get("MIN_BUFFER_SEC")
                .and_then(|v| v.parse().ok())
                .unwrap_or(180.0),
            timeline_engine_v2: flag("TIMELINE_ENGINE_V2"),
            audio_engine_v2: flag("AUDIO_ENGINE_V2"),
            master_window_secs: get("MASTER_WINDOW_SEC")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30.0),
            commentary_bed_carryover: flag("COMMENTARY_BED_CARRYOVER"),
            ffmpeg_bin: get("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_bin: get("FFPROBE_BIN").unwrap_or_else(|| "ffprobe".to_string()),
            ytdlp_bin: get("YTDLP_BIN").unwrap_or_else(|| "yt-dlp".to_string()),
        }
    }

    /// The per-track PCM cache directory under the work dir.
    pub fn cache_dir(&self) -> PathBuf {
        self.work_dir.join("yt-cache")
    }

    /// The named pipe the ingest process reads from.
    pub fn fifo_path(&self) -> PathBuf {
        self.work_dir.join("live.pcm")
    }
}
