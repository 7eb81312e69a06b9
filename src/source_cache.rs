//! Track audio cache. Resolves a catalog track to a normalized 60-second
//! 48 kHz stereo WAV on local disk, downloading and re-encoding on miss.

use crate::error::{Result, StationError};
use crate::process::run_tool;
use crate::track::Track;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Longest clip the station plays from one track.
pub const CLIP_SECS: f64 = 60.0;
/// Tolerance when validating a cached file's probed duration.
pub const CLIP_SLACK_SECS: f64 = 0.25;

/// How to invoke the downloader: either the standalone binary or the module
/// through a Python runtime.
#[derive(Debug, Clone)]
pub struct DownloaderCmd {
    pub program: String,
    pub leading_args: Vec<String>,
}

/// Probe for the cache's duration checks. -1.0 means unreadable.
pub type DurationProbe = Arc<dyn Fn(&Path) -> f64 + Send + Sync>;

pub struct SourceCache {
    cache_dir: PathBuf,
    ffmpeg: String,
    downloader: DownloaderCmd,
    probe: DurationProbe,
    /// Per-track-id locks so concurrent callers for the same track share one
    /// fetch instead of racing.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SourceCache {
    /// Resolve the downloader and create the cache directory.
    pub fn new(
        cache_dir: PathBuf,
        ffmpeg: String,
        ytdlp_bin: &str,
        probe: DurationProbe,
    ) -> Result<Self> {
        let downloader = resolve_downloader(ytdlp_bin)?;
        std::fs::create_dir_all(&cache_dir)?;
        Ok(SourceCache {
            cache_dir,
            ffmpeg,
            downloader,
            probe,
            inflight: Mutex::new(HashMap::new()),
        })
    }

    /// Test constructor with an explicit downloader command.
    pub fn with_downloader(
        cache_dir: PathBuf,
        ffmpeg: String,
        downloader: DownloaderCmd,
        probe: DurationProbe,
    ) -> Self {
        SourceCache {
            cache_dir,
            ffmpeg,
            downloader,
            probe,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// The on-disk location for a track's normalized clip.
    pub fn cache_path(&self, track_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}-60s.wav", track_id))
    }

    /// Resolve a track to a normalized WAV, fetching on miss. A cached file
    /// is reused only when its probed duration is in (0, 60.25] seconds;
    /// anything else is regenerated.
    pub fn fetch_track_wav(&self, track: &Track) -> Result<PathBuf> {
        let lock = self.key_lock(&track.id);
        let _guard = lock.lock().unwrap();

        let path = self.cache_path(&track.id);
        if path.exists() {
            let dur = (self.probe)(&path);
            if dur > 0.0 && dur <= CLIP_SECS + CLIP_SLACK_SECS {
                tracing::debug!("cache hit for {} ({:.2}s)", track.id, dur);
                return Ok(path);
            }
            tracing::warn!(
                "cached clip for {} has duration {:.2}s, regenerating",
                track.id,
                dur
            );
        }

        let raw = self.download(track)?;
        self.normalize(&raw, &path)?;
        let _ = std::fs::remove_file(&raw);
        Ok(path)
    }

    fn key_lock(&self, track_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.inflight.lock().unwrap();
        Arc::clone(map.entry(track_id.to_string()).or_default())
    }

    /// Pull the track's audio down as a WAV next to the cache slot.
    fn download(&self, track: &Track) -> Result<PathBuf> {
        let template = self
            .cache_dir
            .join(format!("{}-dl.%(ext)s", track.id))
            .to_string_lossy()
            .to_string();
        let mut args = self.downloader.leading_args.clone();
        args.extend([
            "-x".to_string(),
            "--audio-format".to_string(),
            "wav".to_string(),
            "--no-playlist".to_string(),
            "-o".to_string(),
            template,
            track.url.clone(),
        ]);
        tracing::info!("downloading {} ({})", track.id, track.display());
        run_tool(&self.downloader.program, &args, None)?;
        Ok(self.cache_dir.join(format!("{}-dl.wav", track.id)))
    }

    /// Re-encode to the clip window and format, then atomically replace the
    /// cache slot.
    fn normalize(&self, input: &Path, final_path: &Path) -> Result<()> {
        let tmp = final_path.with_extension("tmp.wav");
        let args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-i".into(),
            input.to_string_lossy().to_string(),
            "-t".into(),
            format!("{:.0}", CLIP_SECS),
            "-ar".into(),
            "48000".into(),
            "-ac".into(),
            "2".into(),
            "-acodec".into(),
            "pcm_s16le".into(),
            tmp.to_string_lossy().to_string(),
        ];
        run_tool(&self.ffmpeg, &args, None)?;
        std::fs::rename(&tmp, final_path)?;
        Ok(())
    }
}

impl crate::builder::TrackAudio for SourceCache {
    fn fetch_track_wav(&self, track: &Track) -> Result<PathBuf> {
        SourceCache::fetch_track_wav(self, track)
    }
}

/// Find a working downloader: the standalone binary first, then the module
/// through python3. Neither resolving is a startup failure.
pub fn resolve_downloader(ytdlp_bin: &str) -> Result<DownloaderCmd> {
    let version = vec!["--version".to_string()];
    if run_tool(ytdlp_bin, &version, None).is_ok() {
        return Ok(DownloaderCmd {
            program: ytdlp_bin.to_string(),
            leading_args: vec![],
        });
    }
    let module = vec!["-m".to_string(), "yt_dlp".to_string(), "--version".to_string()];
    if run_tool("python3", &module, None).is_ok() {
        return Ok(DownloaderCmd {
            program: "python3".to_string(),
            leading_args: vec!["-m".to_string(), "yt_dlp".to_string()],
        });
    }
    Err(StationError::DependencyMissing(format!(
        "neither '{}' nor 'python3 -m yt_dlp' is runnable",
        ytdlp_bin
    )))
}
