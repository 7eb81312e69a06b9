//! Authoritative in-memory station state. Every mutation bumps a revision,
//! lands in a bounded event ring, and fans out to subscribers as a compact
//! event over a broadcast channel. Snapshots are cheap copies for the API.

use crate::builder::Phase;
use crate::queue::QueueItemView;
use crate::segment::RenderedSegment;
use crate::timeline::Transition;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::broadcast;

const EVENT_RING_MAX: usize = 200;
const SEGMENT_RING_MAX: usize = 50;
const ERROR_RING_MAX: usize = 50;
/// Meter events are suppressed below this total level change.
const METER_MIN_DELTA: f64 = 0.02;
/// Minimum spacing between meter publications.
const METER_MIN_INTERVAL_MS: u64 = 300;

/// One published state change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEvent {
    pub revision: u64,
    pub ts: DateTime<Utc>,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Envelope levels per output lane plus the master sum, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Meters {
    pub music: f64,
    pub voice: f64,
    pub jingle: f64,
    pub ads: f64,
    pub master: f64,
}

impl Meters {
    /// Sum of per-channel changes, the delta gate for publication.
    pub fn l1_delta(&self, other: &Meters) -> f64 {
        (self.music - other.music).abs()
            + (self.voice - other.voice).abs()
            + (self.jingle - other.jingle).abs()
            + (self.ads - other.ads).abs()
    }
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublisherHealth {
    pub connected: bool,
    pub reconnects: u32,
    pub last_exit_code: Option<i32>,
    pub last_line: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub segments_built: u64,
    pub segments_played: u64,
    pub build_failures: u64,
    pub render_failures: u64,
}

/// What a deck is doing right now.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeckState {
    pub segment_id: Option<String>,
    pub note: Option<String>,
    pub until_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoiceLaneState {
    pub active: bool,
    pub segment_id: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CrossfaderState {
    /// -1.0 = fully deck A, 1.0 = fully deck B.
    pub position: f64,
    pub active_transition: Option<Transition>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DuckingState {
    pub active: bool,
    /// Gain applied to the bed while ducked.
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub ts: DateTime<Utc>,
    pub tag: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentHistoryEntry {
    pub finished_at: DateTime<Utc>,
    pub segment: RenderedSegment,
}

/// Full observation of the station, built on demand.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub running: bool,
    pub stream_started_at: Option<DateTime<Utc>>,
    pub phase: Phase,
    pub tracks_loaded: usize,
    pub buffered_secs: f64,
    pub last_error: Option<String>,
    pub now_playing: Option<RenderedSegment>,
    pub queue: Vec<QueueItemView>,
    pub recent_segments: Vec<SegmentHistoryEntry>,
    pub recent_errors: Vec<ErrorEntry>,
    pub publisher: PublisherHealth,
    pub counters: Counters,
    pub playhead_secs: f64,
    pub deck_a: DeckState,
    pub deck_b: DeckState,
    pub voice_over: VoiceLaneState,
    pub crossfader: CrossfaderState,
    pub ducking: DuckingState,
    pub lookahead_secs: f64,
    pub meters: Meters,
    pub revision: u64,
}

struct StateInner {
    running: bool,
    stream_started_at: Option<DateTime<Utc>>,
    phase: Phase,
    tracks_loaded: usize,
    buffered_secs: f64,
    last_error: Option<String>,
    now_playing: Option<RenderedSegment>,
    queue: Vec<QueueItemView>,
    recent_segments: VecDeque<SegmentHistoryEntry>,
    recent_errors: VecDeque<ErrorEntry>,
    events: VecDeque<StateEvent>,
    publisher: PublisherHealth,
    counters: Counters,
    playhead_secs: f64,
    deck_a: DeckState,
    deck_b: DeckState,
    voice_over: VoiceLaneState,
    crossfader: CrossfaderState,
    ducking: DuckingState,
    lookahead_secs: f64,
    meters: Meters,
    last_meter_publish: Option<Instant>,
    revision: u64,
}

/// Cloneable handle to the single authoritative state.
#[derive(Clone)]
pub struct StateHandle {
    inner: Arc<Mutex<StateInner>>,
    tx: broadcast::Sender<StateEvent>,
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHandle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        StateHandle {
            inner: Arc::new(Mutex::new(StateInner {
                running: false,
                stream_started_at: None,
                phase: Phase::Songs,
                tracks_loaded: 0,
                buffered_secs: 0.0,
                last_error: None,
                now_playing: None,
                queue: Vec::new(),
                recent_segments: VecDeque::new(),
                recent_errors: VecDeque::new(),
                events: VecDeque::new(),
                publisher: PublisherHealth::default(),
                counters: Counters::default(),
                playhead_secs: 0.0,
                deck_a: DeckState::default(),
                deck_b: DeckState::default(),
                voice_over: VoiceLaneState::default(),
                crossfader: CrossfaderState::default(),
                ducking: DuckingState::default(),
                lookahead_secs: 0.0,
                meters: Meters::default(),
                last_meter_publish: None,
                revision: 0,
            })),
            tx,
        }
    }

    /// Live event feed. Subscribers receive events by copy.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.tx.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.inner.lock().unwrap().revision
    }

    /// Events newer than `since`, when the ring still holds them. `None`
    /// means the client is too far behind and needs a fresh snapshot.
    pub fn events_since(&self, since: u64) -> Option<Vec<StateEvent>> {
        let inner = self.inner.lock().unwrap();
        if since >= inner.revision {
            return Some(Vec::new());
        }
        let oldest = inner.events.front().map(|e| e.revision)?;
        if since + 1 < oldest {
            return None;
        }
        Some(
            inner
                .events
                .iter()
                .filter(|e| e.revision > since)
                .cloned()
                .collect(),
        )
    }

    fn emit(inner: &mut StateInner, tx: &broadcast::Sender<StateEvent>, event: &str, payload: serde_json::Value) {
        inner.revision += 1;
        let evt = StateEvent {
            revision: inner.revision,
            ts: Utc::now(),
            event: event.to_string(),
            payload,
        };
        inner.events.push_back(evt.clone());
        while inner.events.len() > EVENT_RING_MAX {
            inner.events.pop_front();
        }
        let _ = tx.send(evt);
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    pub fn set_running(&self, running: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.running = running;
        if running {
            inner.stream_started_at = Some(Utc::now());
        }
        Self::emit(
            &mut inner,
            &self.tx,
            "state.updated",
            serde_json::json!({ "running": running }),
        );
    }

    pub fn set_tracks_loaded(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.tracks_loaded = n;
        Self::emit(
            &mut inner,
            &self.tx,
            "state.updated",
            serde_json::json!({ "tracksLoaded": n }),
        );
    }

    pub fn set_phase(&self, phase: Phase) {
        let mut inner = self.inner.lock().unwrap();
        if inner.phase == phase {
            return;
        }
        inner.phase = phase;
        Self::emit(
            &mut inner,
            &self.tx,
            "state.updated",
            serde_json::json!({ "phase": phase }),
        );
    }

    pub fn set_buffered(&self, buffered_secs: f64, playhead_secs: f64, lookahead_secs: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffered_secs = buffered_secs.max(0.0);
        inner.playhead_secs = playhead_secs;
        inner.lookahead_secs = lookahead_secs;
        let buffered_secs = inner.buffered_secs;
        Self::emit(
            &mut inner,
            &self.tx,
            "state.updated",
            serde_json::json!({
                "bufferedSec": buffered_secs,
                "playheadSec": playhead_secs,
            }),
        );
    }

    // ── Errors ──────────────────────────────────────────────────────────

    pub fn record_error(&self, tag: &str, message: String) {
        tracing::error!("[{}] {}", tag, message);
        let mut inner = self.inner.lock().unwrap();
        inner.last_error = Some(message.clone());
        inner.recent_errors.push_back(ErrorEntry {
            ts: Utc::now(),
            tag: tag.to_string(),
            message: message.clone(),
        });
        while inner.recent_errors.len() > ERROR_RING_MAX {
            inner.recent_errors.pop_front();
        }
        Self::emit(
            &mut inner,
            &self.tx,
            "error",
            serde_json::json!({ "tag": tag, "message": message }),
        );
    }

    // ── Segments ────────────────────────────────────────────────────────

    pub fn segment_enqueued(&self, segment: &RenderedSegment) {
        let mut inner = self.inner.lock().unwrap();
        inner.counters.segments_built += 1;
        Self::emit(
            &mut inner,
            &self.tx,
            "segment.enqueued",
            serde_json::json!({ "id": segment.id, "kind": segment.kind, "note": segment.note }),
        );
    }

    pub fn segment_started(&self, segment: &RenderedSegment) {
        let mut inner = self.inner.lock().unwrap();
        inner.now_playing = Some(segment.clone());
        Self::emit(
            &mut inner,
            &self.tx,
            "segment.started",
            serde_json::json!({ "id": segment.id, "kind": segment.kind, "note": segment.note }),
        );
    }

    pub fn segment_finished(&self, segment: &RenderedSegment, buffered_secs: f64) {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .now_playing
            .as_ref()
            .is_some_and(|np| np.id == segment.id)
        {
            inner.now_playing = None;
        }
        inner.counters.segments_played += 1;
        inner.recent_segments.push_back(SegmentHistoryEntry {
            finished_at: Utc::now(),
            segment: segment.clone(),
        });
        while inner.recent_segments.len() > SEGMENT_RING_MAX {
            inner.recent_segments.pop_front();
        }
        Self::emit(
            &mut inner,
            &self.tx,
            "segment.finished",
            serde_json::json!({ "id": segment.id, "bufferedSec": buffered_secs }),
        );
    }

    pub fn segment_removed(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        Self::emit(
            &mut inner,
            &self.tx,
            "segment.removed",
            serde_json::json!({ "id": id }),
        );
    }

    pub fn count_build_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.counters.build_failures += 1;
    }

    pub fn count_render_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.counters.render_failures += 1;
    }

    // ── Queue ───────────────────────────────────────────────────────────

    pub fn queue_changed(&self, queue: Vec<QueueItemView>) {
        let mut inner = self.inner.lock().unwrap();
        let len = queue.len();
        inner.queue = queue;
        Self::emit(
            &mut inner,
            &self.tx,
            "queue.updated",
            serde_json::json!({ "length": len }),
        );
    }

    // ── Publisher ───────────────────────────────────────────────────────

    pub fn publisher_started(&self, rtmp_url: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.publisher.connected {
            return;
        }
        inner.publisher.connected = true;
        inner.publisher.reconnects += 1;
        Self::emit(
            &mut inner,
            &self.tx,
            "publisher.started",
            serde_json::json!({ "rtmpUrl": rtmp_url }),
        );
    }

    pub fn publisher_exited(&self, exit_code: Option<i32>) {
        let mut inner = self.inner.lock().unwrap();
        inner.publisher.connected = false;
        inner.publisher.last_exit_code = exit_code;
        Self::emit(
            &mut inner,
            &self.tx,
            "publisher.exited",
            serde_json::json!({ "exitCode": exit_code }),
        );
    }

    pub fn publisher_line(&self, line: &str) {
        // High-volume ffmpeg chatter: stored, not broadcast.
        let mut inner = self.inner.lock().unwrap();
        inner.publisher.last_line = Some(line.to_string());
    }

    pub fn publisher_stopped(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.publisher.connected = false;
        Self::emit(&mut inner, &self.tx, "publisher.stopped", serde_json::json!({}));
    }

    // ── Mixer view ──────────────────────────────────────────────────────

    /// Publish meters, gated by both the change delta and a minimum
    /// interval. Returns whether the update was published.
    pub fn update_meters(&self, meters: Meters) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if meters.l1_delta(&inner.meters) <= METER_MIN_DELTA {
            return false;
        }
        if let Some(last) = inner.last_meter_publish {
            if last.elapsed().as_millis() < u128::from(METER_MIN_INTERVAL_MS) {
                return false;
            }
        }
        inner.meters = meters;
        inner.last_meter_publish = Some(Instant::now());
        Self::emit(
            &mut inner,
            &self.tx,
            "meters",
            serde_json::to_value(meters).unwrap_or(serde_json::Value::Null),
        );
        true
    }

    pub fn update_mixer(
        &self,
        deck_a: DeckState,
        deck_b: DeckState,
        voice_over: VoiceLaneState,
        crossfader: CrossfaderState,
        ducking: DuckingState,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.deck_a = deck_a;
        inner.deck_b = deck_b;
        inner.voice_over = voice_over;
        inner.crossfader = crossfader;
        inner.ducking = ducking;
        // Mixer detail rides on the next snapshot or meter event; publishing
        // it per tick would drown subscribers.
    }

    // ── Snapshot ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> DashboardSnapshot {
        let inner = self.inner.lock().unwrap();
        DashboardSnapshot {
            running: inner.running,
            stream_started_at: inner.stream_started_at,
            phase: inner.phase,
            tracks_loaded: inner.tracks_loaded,
            buffered_secs: inner.buffered_secs,
            last_error: inner.last_error.clone(),
            now_playing: inner.now_playing.clone(),
            queue: inner.queue.clone(),
            recent_segments: inner.recent_segments.iter().cloned().collect(),
            recent_errors: inner.recent_errors.iter().cloned().collect(),
            publisher: inner.publisher.clone(),
            counters: inner.counters.clone(),
            playhead_secs: inner.playhead_secs,
            deck_a: inner.deck_a.clone(),
            deck_b: inner.deck_b.clone(),
            voice_over: inner.voice_over.clone(),
            crossfader: inner.crossfader.clone(),
            ducking: inner.ducking.clone(),
            lookahead_secs: inner.lookahead_secs,
            meters: inner.meters,
            revision: inner.revision,
        }
    }
}
