//! Station — the single front door to the broadcast core.
//!
//! The HTTP layer and the headless test suite both drive the engine through
//! this facade; neither reaches around it to the internals. It owns the
//! queue, the timeline, the sink, and the playout handle, and it is the
//! only place that wires sink events into the runtime state.

use crate::builder::{SegmentBuilder, SpeechSynth, TrackAudio};
use crate::commentary::CommentaryGenerator;
use crate::config::Config;
use crate::error::{Result, StationError};
use crate::playout::{spawn_playout, EngineMode, PlayoutEngine, PlayoutHandle, StreamClock};
use crate::queue::{QueueItemView, SegmentQueue};
use crate::renderer::{FfmpegEngine, MediaEngine};
use crate::segment::{RenderedSegment, SegmentKind, SegmentSource};
use crate::sink::{Output, RtmpSink, SinkEvent};
use crate::source_cache::SourceCache;
use crate::state::{DashboardSnapshot, StateEvent, StateHandle};
use crate::timeline::{ArbitrationEntry, StationIdent, Timeline, TimelineSnapshot};
use crate::track::{load_catalog, Track};
use crate::tts::TtsClient;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Snapshot lookahead for the timeline view.
const TIMELINE_LOOKAHEAD_SECS: f64 = 120.0;
/// Priority for operator-submitted commentary.
const MANUAL_COMMENTARY_PRIORITY: u8 = 120;
/// Priority for operator-submitted tracks.
const MANUAL_TRACK_PRIORITY: u8 = 110;

/// Outcome of a transport skip request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipOutcome {
    Skipped,
    Unsupported,
    NotRunning,
}

/// Compact `/status` reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub running: bool,
    pub tracks_loaded: usize,
    pub phase: crate::builder::Phase,
    pub buffered_sec: f64,
    pub last_played: Vec<String>,
    pub last_error: Option<String>,
}

pub struct Station {
    cfg: Config,
    state: StateHandle,
    queue: Arc<Mutex<SegmentQueue>>,
    timeline: Arc<Mutex<Timeline>>,
    playout: Mutex<Option<PlayoutHandle>>,
    clock: Mutex<Option<StreamClock>>,
    output: Arc<dyn Output>,
    media: Arc<dyn MediaEngine>,
    audio: Arc<dyn TrackAudio>,
    synth: Arc<dyn SpeechSynth>,
}

impl Station {
    /// Production wiring: ffmpeg media engine, yt-dlp cache, HTTP TTS, and
    /// the RTMP sink, with sink events fanned into the runtime state.
    pub fn new(cfg: Config) -> Result<Self> {
        std::fs::create_dir_all(&cfg.work_dir)?;

        let state = StateHandle::new();
        let media: Arc<dyn MediaEngine> = Arc::new(FfmpegEngine::new(
            cfg.ffmpeg_bin.clone(),
            cfg.ffprobe_bin.clone(),
        ));

        let probe_media = Arc::clone(&media);
        let cache = SourceCache::new(
            cfg.cache_dir(),
            cfg.ffmpeg_bin.clone(),
            &cfg.ytdlp_bin,
            Arc::new(move |path| probe_media.duration_secs(path)),
        )?;

        let sink_state = state.clone();
        let output: Arc<dyn Output> = Arc::new(RtmpSink::new(
            cfg.fifo_path(),
            cfg.rtmp_url.clone(),
            cfg.ffmpeg_bin.clone(),
            Arc::new(move |event| route_sink_event(&sink_state, event)),
        ));

        let synth = TtsClient::new(cfg.tts_base_url.clone());
        Ok(Self::assemble(
            cfg,
            state,
            Arc::new(cache),
            Arc::new(synth),
            media,
            output,
        ))
    }

    /// Wiring with explicit collaborators, used by the headless suite.
    pub fn with_parts(
        cfg: Config,
        audio: Arc<dyn TrackAudio>,
        synth: Arc<dyn SpeechSynth>,
        media: Arc<dyn MediaEngine>,
        output: Arc<dyn Output>,
    ) -> Self {
        Self::assemble(cfg, StateHandle::new(), audio, synth, media, output)
    }

    fn assemble(
        cfg: Config,
        state: StateHandle,
        audio: Arc<dyn TrackAudio>,
        synth: Arc<dyn SpeechSynth>,
        media: Arc<dyn MediaEngine>,
        output: Arc<dyn Output>,
    ) -> Self {
        let ident = cfg.station_id_wav.as_ref().map(|path| StationIdent {
            path: path.clone(),
            duration_secs: media.duration_secs(path),
        });
        Station {
            timeline: Arc::new(Mutex::new(Timeline::new(ident, cfg.commentary_bed_carryover))),
            cfg,
            state,
            queue: Arc::new(Mutex::new(SegmentQueue::new())),
            playout: Mutex::new(None),
            clock: Mutex::new(None),
            output,
            media,
            audio,
            synth,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.playout.lock().unwrap().is_some()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Load the catalog, start the sink, and spawn the playout loop.
    pub fn start(&self) -> Result<()> {
        let mut playout = self.playout.lock().unwrap();
        if playout.is_some() {
            return Ok(());
        }

        let tracks = load_catalog(&self.cfg.catalog_path)?;
        self.state.set_tracks_loaded(tracks.len());

        let commentary = CommentaryGenerator::new(
            self.cfg.llm_api_key.clone(),
            self.cfg.llm_base_url.clone(),
            self.cfg.llm_model.clone(),
            self.cfg.station_name.clone(),
        );
        let builder = SegmentBuilder::new(
            tracks,
            self.cfg.commentary_cadence,
            self.cfg.work_dir.clone(),
            self.cfg.liner_dir.clone(),
            Arc::clone(&self.audio),
            Arc::clone(&self.synth),
            Arc::clone(&self.media),
            commentary,
        );

        self.output.start()?;

        let mode = if self.cfg.timeline_engine_v2 {
            EngineMode::Timeline
        } else {
            EngineMode::PerSegment
        };
        let engine = PlayoutEngine {
            mode,
            builder,
            queue: Arc::clone(&self.queue),
            timeline: Arc::clone(&self.timeline),
            output: Arc::clone(&self.output),
            media: Arc::clone(&self.media),
            state: self.state.clone(),
            work_dir: self.cfg.work_dir.clone(),
            target_buffer_secs: self.cfg.target_buffer_secs,
            min_buffer_secs: self.cfg.min_buffer_secs,
            master_windows: self.cfg.audio_engine_v2,
        };

        *self.clock.lock().unwrap() = Some(StreamClock::start_now());
        *playout = Some(spawn_playout(engine));
        self.state.set_running(true);
        tracing::info!("station started ({:?} mode)", mode);
        Ok(())
    }

    /// Stop the loop, the in-flight transcode, and the ingest. Safe to call
    /// when already stopped.
    pub fn stop(&self) {
        let handle = self.playout.lock().unwrap().take();
        if let Some(mut handle) = handle {
            handle.stop();
        }
        self.output.stop();
        self.clock.lock().unwrap().take();
        self.state.set_running(false);
        tracing::info!("station stopped");
    }

    /// Cut the clip currently feeding the sink.
    pub fn skip(&self) -> SkipOutcome {
        let playout = self.playout.lock().unwrap();
        match playout.as_ref() {
            Some(handle) => {
                if handle.skip() {
                    SkipOutcome::Skipped
                } else {
                    SkipOutcome::Unsupported
                }
            }
            None => SkipOutcome::NotRunning,
        }
    }

    // ── Observation ─────────────────────────────────────────────────────

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state.snapshot()
    }

    pub fn status(&self) -> StatusReport {
        let snap = self.state.snapshot();
        let last_played = snap
            .recent_segments
            .iter()
            .rev()
            .filter(|e| e.segment.kind == SegmentKind::Song)
            .take(5)
            .map(|e| e.segment.note.clone())
            .collect();
        StatusReport {
            running: snap.running,
            tracks_loaded: snap.tracks_loaded,
            phase: snap.phase,
            buffered_sec: snap.buffered_secs,
            last_played,
            last_error: snap.last_error,
        }
    }

    fn now_secs(&self) -> f64 {
        self.clock
            .lock()
            .unwrap()
            .as_ref()
            .map(|c| c.now_secs())
            .unwrap_or(0.0)
    }

    pub fn timeline_snapshot(&self) -> TimelineSnapshot {
        let arbitration: Vec<ArbitrationEntry> = self
            .queue
            .lock()
            .unwrap()
            .items()
            .iter()
            .map(|item| ArbitrationEntry {
                segment_id: item.segment.id.clone(),
                reason: item.reason(),
            })
            .collect();
        self.timeline
            .lock()
            .unwrap()
            .snapshot(self.now_secs(), TIMELINE_LOOKAHEAD_SECS, arbitration)
    }

    /// Recompute the forward-looking timeline view after pruning anything
    /// that already aged out.
    pub fn rebuild_timeline(&self) -> Result<TimelineSnapshot> {
        let now = self.now_secs();
        {
            let mut tl = self
                .timeline
                .lock()
                .map_err(|_| StationError::SchedulerRebuild("timeline lock poisoned".into()))?;
            tl.drop_finished(now);
        }
        Ok(self.timeline_snapshot())
    }

    // ── Queue mutation ──────────────────────────────────────────────────

    pub fn queue_views(&self) -> Vec<QueueItemView> {
        self.queue.lock().unwrap().views()
    }

    pub fn remove_from_queue(&self, id: &str) -> Result<()> {
        let removed = self.queue.lock().unwrap().remove(id);
        if !removed {
            return Err(StationError::QueueMiss(id.to_string()));
        }
        self.state.segment_removed(id);
        self.state.queue_changed(self.queue_views());
        Ok(())
    }

    pub fn update_queue_item(
        &self,
        id: &str,
        priority: Option<i64>,
        pinned: Option<bool>,
    ) -> Result<()> {
        self.queue.lock().unwrap().update(id, priority, pinned)?;
        self.state.queue_changed(self.queue_views());
        Ok(())
    }

    /// Synthesize operator-provided text and pin it near the queue front.
    pub fn enqueue_manual_commentary(&self, text: &str) -> Result<RenderedSegment> {
        if text.trim().is_empty() {
            return Err(StationError::Tts("empty commentary text".to_string()));
        }
        let raw = self
            .cfg
            .work_dir
            .join(format!("talk-manual-raw-{}.wav", uuid::Uuid::new_v4()));
        self.synth.synthesize(text, &raw)?;

        let out = self
            .cfg
            .work_dir
            .join(format!("talk-manual-{}.wav", uuid::Uuid::new_v4()));
        self.media.voice_chain(&raw, &out)?;
        let _ = std::fs::remove_file(&raw);

        let measured = self.media.duration_secs(&out);
        let duration = if measured > 0.0 { measured } else { 8.0 };

        let mut seg = RenderedSegment::new(
            SegmentKind::Commentary,
            out,
            duration,
            "operator break".into(),
        );
        seg.commentary_text = Some(text.to_string());
        seg.source = SegmentSource::Manual;
        seg.priority = MANUAL_COMMENTARY_PRIORITY;
        seg.pinned = true;

        self.state.segment_enqueued(&seg);
        self.queue.lock().unwrap().enqueue(seg.clone());
        self.state.queue_changed(self.queue_views());
        Ok(seg)
    }

    /// Fetch a requested track and pin it near the queue front.
    pub fn enqueue_manual_track(
        &self,
        title: &str,
        artist: Option<&str>,
        youtube_url: &str,
    ) -> Result<RenderedSegment> {
        if youtube_url.trim().is_empty() {
            return Err(StationError::CatalogInvalid("missing youtube_url".to_string()));
        }
        let track = Track {
            id: format!("req-{}", uuid::Uuid::new_v4()),
            title: title.to_string(),
            artist: artist.unwrap_or("listener request").to_string(),
            url: youtube_url.to_string(),
            duration_sec: 60,
            tags: vec!["request".to_string()],
            energy: 0.5,
            mood: "neutral".to_string(),
            language: "en".to_string(),
        };

        let source = self.audio.fetch_track_wav(&track)?;
        let out = self
            .cfg
            .work_dir
            .join(format!("song-faded-{}.wav", uuid::Uuid::new_v4()));
        self.media.edge_fades(&source, &out, 0.4, 0.9)?;

        let measured = self.media.duration_secs(&out);
        let duration = if measured > 0.0 { measured } else { 60.0 };

        let mut seg = RenderedSegment::new(SegmentKind::Song, out, duration, track.display());
        seg.source = SegmentSource::Manual;
        seg.priority = MANUAL_TRACK_PRIORITY;
        seg.pinned = true;

        self.state.segment_enqueued(&seg);
        self.queue.lock().unwrap().enqueue(seg.clone());
        self.state.queue_changed(self.queue_views());
        Ok(seg)
    }

    // ── Media lookup ────────────────────────────────────────────────────

    /// Find the WAV behind a segment id: queued, playing, or recently
    /// finished.
    pub fn media_path(&self, segment_id: &str) -> Option<PathBuf> {
        if let Some(item) = self
            .queue
            .lock()
            .unwrap()
            .items()
            .iter()
            .find(|i| i.segment.id == segment_id)
        {
            return Some(item.segment.path.clone());
        }
        let snap = self.state.snapshot();
        if let Some(np) = &snap.now_playing {
            if np.id == segment_id {
                return Some(np.path.clone());
            }
        }
        snap.recent_segments
            .iter()
            .find(|e| e.segment.id == segment_id)
            .map(|e| e.segment.path.clone())
    }

    /// A path the API may serve: it must resolve inside the work dir or the
    /// liner dir.
    pub fn checked_media_path(&self, raw: &str) -> Result<PathBuf> {
        let path = Path::new(raw)
            .canonicalize()
            .map_err(|_| StationError::PathNotAllowed(PathBuf::from(raw)))?;
        let mut allowed: Vec<PathBuf> = Vec::new();
        if let Ok(work) = self.cfg.work_dir.canonicalize() {
            allowed.push(work);
        }
        if let Some(liners) = &self.cfg.liner_dir {
            if let Ok(liners) = liners.canonicalize() {
                allowed.push(liners);
            }
        }
        if allowed.iter().any(|root| path.starts_with(root)) {
            Ok(path)
        } else {
            Err(StationError::PathNotAllowed(path))
        }
    }

    // ── Events ──────────────────────────────────────────────────────────

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StateEvent> {
        self.state.subscribe()
    }

    pub fn events_since(&self, revision: u64) -> Option<Vec<StateEvent>> {
        self.state.events_since(revision)
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

/// Sink events land in the runtime state; nothing points back at the sink.
fn route_sink_event(state: &StateHandle, event: SinkEvent) {
    match event {
        SinkEvent::Started { rtmp_url } => state.publisher_started(&rtmp_url),
        SinkEvent::IngestLine(line) => state.publisher_line(&line),
        SinkEvent::IngestExited(code) => {
            state.publisher_exited(code);
            state.record_error(
                "publisher",
                format!("ffmpeg ingest exited with status {:?}", code),
            );
        }
        SinkEvent::Stopped => state.publisher_stopped(),
    }
}
