//! The playout engine: the single active agent. A control thread runs the
//! build-ahead loop at a ~250 ms cadence (segment lifecycle, meters, queue
//! draining, building); a pump thread feeds the sink at the pipe's own
//! real-time pace. Commands arrive over a channel; everything else is
//! event emission through the runtime state.

use crate::builder::SegmentBuilder;
use crate::error::StationError;
use crate::queue::SegmentQueue;
use crate::renderer::{GainRamp, MediaEngine, MixClip};
use crate::segment::{Channel, RenderedSegment, SegmentKind};
use crate::sink::Output;
use crate::state::{
    CrossfaderState, DeckState, DuckingState, Meters, StateHandle, VoiceLaneState,
};
use crate::timeline::{Deck, ScheduledClip, Timeline, Transition};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

/// Control-loop cadence.
const TICK: Duration = Duration::from_millis(250);
/// Chunked-render window length.
const WINDOW_SECS: f64 = 2.0;
/// Recovery filler length when a build fails.
const RECOVERY_SILENCE_SECS: f64 = 2.0;
/// Builds per tick with internal rendering, and without.
const MAX_BUILDS_TIMELINE: u32 = 4;
const MAX_BUILDS_PER_SEGMENT: u32 = 1;
/// Bed gain while a voice clip rides over music.
const DUCK_AMOUNT: f64 = 0.15;

/// Which output path the engine drives. Chosen at start, never switched
/// mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Whole rendered segments go to the sink in queue-pop order.
    PerSegment,
    /// The two-deck timeline is rendered in fixed windows.
    Timeline,
}

/// Commands sent to the control thread.
enum PlayoutCmd {
    Skip,
    Stop,
}

/// Seconds since stream start, measured from a monotonic instant.
#[derive(Clone)]
pub struct StreamClock {
    start: Instant,
}

impl StreamClock {
    pub fn start_now() -> Self {
        StreamClock {
            start: Instant::now(),
        }
    }

    pub fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Thread-safe handle to a running engine.
pub struct PlayoutHandle {
    tx: mpsc::Sender<PlayoutCmd>,
    join: Option<std::thread::JoinHandle<()>>,
    mode: EngineMode,
}

impl PlayoutHandle {
    /// Ask for the in-flight clip to be cut. Returns `false` when the
    /// running mode cannot honor a skip.
    pub fn skip(&self) -> bool {
        if self.mode == EngineMode::Timeline {
            return false;
        }
        self.tx.send(PlayoutCmd::Skip).is_ok()
    }

    /// Stop the loop and wait for the control thread to exit. The current
    /// render is allowed to complete.
    pub fn stop(&mut self) {
        let _ = self.tx.send(PlayoutCmd::Stop);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }
}

pub struct PlayoutEngine {
    pub mode: EngineMode,
    pub builder: SegmentBuilder,
    pub queue: Arc<Mutex<SegmentQueue>>,
    pub timeline: Arc<Mutex<Timeline>>,
    pub output: Arc<dyn Output>,
    pub media: Arc<dyn MediaEngine>,
    pub state: StateHandle,
    pub work_dir: PathBuf,
    pub target_buffer_secs: f64,
    /// Below this the station is close to dead air; worth shouting about.
    pub min_buffer_secs: f64,
    /// Apply the mastering chain to rendered windows.
    pub master_windows: bool,
}

/// Lifecycle stage per primary segment clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pending,
    Started,
}

struct EngineShared {
    queue: Arc<Mutex<SegmentQueue>>,
    timeline: Arc<Mutex<Timeline>>,
    output: Arc<dyn Output>,
    media: Arc<dyn MediaEngine>,
    state: StateHandle,
    clock: StreamClock,
    running: Arc<AtomicBool>,
    /// Segments placed but not yet finished, for lifecycle events.
    pending: Mutex<HashMap<String, (RenderedSegment, Stage)>>,
    work_dir: PathBuf,
    master_windows: bool,
}

impl EngineShared {
    /// Place a segment on the timeline and register it for lifecycle
    /// tracking.
    fn place(&self, segment: &RenderedSegment, now: f64) -> Vec<ScheduledClip> {
        let clips = self.timeline.lock().unwrap().place(segment, now);
        self.pending
            .lock()
            .unwrap()
            .insert(segment.id.clone(), (segment.clone(), Stage::Pending));
        clips
    }

    fn buffered_secs(&self, mode: EngineMode, now: f64) -> f64 {
        match mode {
            EngineMode::Timeline => self.timeline.lock().unwrap().buffered_secs(now),
            EngineMode::PerSegment => self.queue.lock().unwrap().total_duration_secs(),
        }
    }
}

/// Start the engine. The sink must already be running.
pub fn spawn_playout(engine: PlayoutEngine) -> PlayoutHandle {
    let (tx, rx) = mpsc::channel::<PlayoutCmd>();
    let mode = engine.mode;

    let join = std::thread::Builder::new()
        .name("playout".into())
        .spawn(move || control_loop(engine, rx))
        .expect("failed to spawn playout thread");

    PlayoutHandle {
        tx,
        join: Some(join),
        mode,
    }
}

fn control_loop(engine: PlayoutEngine, rx: mpsc::Receiver<PlayoutCmd>) {
    let PlayoutEngine {
        mode,
        mut builder,
        queue,
        timeline,
        output,
        media,
        state,
        work_dir,
        target_buffer_secs,
        min_buffer_secs,
        master_windows,
    } = engine;

    let shared = Arc::new(EngineShared {
        queue,
        timeline,
        output,
        media,
        state,
        clock: StreamClock::start_now(),
        running: Arc::new(AtomicBool::new(true)),
        pending: Mutex::new(HashMap::new()),
        work_dir,
        master_windows,
    });

    let pump = {
        let shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("playout-pump".into())
            .spawn(move || match mode {
                EngineMode::PerSegment => per_segment_pump(&shared),
                EngineMode::Timeline => chunk_pump(&shared),
            })
            .expect("failed to spawn pump thread")
    };

    let max_builds = match mode {
        EngineMode::Timeline => MAX_BUILDS_TIMELINE,
        EngineMode::PerSegment => MAX_BUILDS_PER_SEGMENT,
    };

    let mut tick: u64 = 0;
    'outer: loop {
        // Commands first, so stop and skip act promptly.
        loop {
            match rx.try_recv() {
                Ok(PlayoutCmd::Stop) => break 'outer,
                Ok(PlayoutCmd::Skip) => {
                    shared.output.abort_current();
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break 'outer,
            }
        }
        if !shared.output.is_running() {
            // The publisher died; report and idle until an external start.
            shared
                .state
                .record_error("publisher", "ffmpeg ingest exited".to_string());
            break;
        }

        let now = shared.clock.now_secs();

        sync_lifecycle(&shared, mode, now);
        publish_mixer(&shared, now);

        // In timeline mode the queue drains onto the timeline as long as
        // the buffer wants content.
        if mode == EngineMode::Timeline {
            while shared.buffered_secs(mode, now) < target_buffer_secs {
                let popped = shared.queue.lock().unwrap().pop();
                match popped {
                    Some(item) => {
                        shared.place(&item.segment, now);
                        let views = shared.queue.lock().unwrap().views();
                        shared.state.queue_changed(views);
                    }
                    None => break,
                }
            }
        }

        // Build ahead until the target buffer is covered.
        let mut builds = 0u32;
        while builds < max_builds {
            let queued = shared.queue.lock().unwrap().total_duration_secs();
            let covered = shared.buffered_secs(mode, now)
                + if mode == EngineMode::Timeline { queued } else { 0.0 };
            if covered >= target_buffer_secs {
                break;
            }
            builds += 1;
            match builder.build_next() {
                Ok(segment) => {
                    shared.state.segment_enqueued(&segment);
                    shared.queue.lock().unwrap().enqueue(segment);
                    let views = shared.queue.lock().unwrap().views();
                    shared.state.queue_changed(views);
                }
                Err(e) => {
                    shared.state.count_build_failure();
                    shared.state.record_error(e.tag(), e.to_string());
                    if let Some(silence) = recovery_silence(&shared) {
                        shared.state.segment_enqueued(&silence);
                        shared.queue.lock().unwrap().enqueue(silence);
                        let views = shared.queue.lock().unwrap().views();
                        shared.state.queue_changed(views);
                    }
                    break;
                }
            }
            shared.state.set_phase(builder.phase());
        }

        if tick % 4 == 0 {
            let buffered = shared.buffered_secs(mode, now);
            let lookahead = shared.timeline.lock().unwrap().buffered_secs(now);
            shared.state.set_buffered(buffered, now, lookahead);
            if buffered < min_buffer_secs && tick % 40 == 0 && tick > 0 {
                tracing::warn!(
                    "buffer at {:.0}s, below the {:.0}s floor",
                    buffered,
                    min_buffer_secs
                );
            }
        }
        tick += 1;

        std::thread::sleep(TICK);
    }

    shared.running.store(false, Ordering::SeqCst);
    // Unblock a pump stuck in a pipe write.
    shared.output.abort_current();
    let _ = pump.join();
}

/// A pinned 2-second filler that keeps the buffer advancing when building
/// fails.
fn recovery_silence(shared: &EngineShared) -> Option<RenderedSegment> {
    let out = shared
        .work_dir
        .join(format!("recover-{}.wav", uuid::Uuid::new_v4()));
    if let Err(e) = shared.media.silence(&out, RECOVERY_SILENCE_SECS) {
        tracing::error!("could not render recovery silence: {}", e);
        return None;
    }
    let mut seg = RenderedSegment::new(
        SegmentKind::Liner,
        out,
        RECOVERY_SILENCE_SECS,
        "recovery silence".into(),
    );
    seg.priority = crate::segment::PRIORITY_MAX;
    seg.pinned = true;
    Some(seg)
}

/// Advance per-segment lifecycle against the wall clock: `started` when the
/// playhead crosses a primary clip's start, `finished` when it crosses the
/// end. Finished clips age out of the timeline.
fn sync_lifecycle(shared: &EngineShared, mode: EngineMode, now: f64) {
    let primaries: Vec<(String, f64, f64)> = {
        let tl = shared.timeline.lock().unwrap();
        tl.clips()
            .iter()
            .filter(|c| c.parent_segment_id.is_none())
            .map(|c| (c.segment_id.clone(), c.start_at_secs, c.end_at_secs()))
            .collect()
    };

    for (segment_id, start, end) in primaries {
        let entry = {
            let pending = shared.pending.lock().unwrap();
            pending.get(&segment_id).cloned()
        };
        let Some((segment, stage)) = entry else {
            continue;
        };
        if stage == Stage::Pending && now >= start {
            shared.state.segment_started(&segment);
            shared
                .pending
                .lock()
                .unwrap()
                .insert(segment_id.clone(), (segment.clone(), Stage::Started));
        }
        let started = now >= start;
        if started && now >= end {
            let buffered = shared.buffered_secs(mode, now);
            shared.state.segment_finished(&segment, buffered);
            shared.pending.lock().unwrap().remove(&segment_id);
        }
    }

    shared.timeline.lock().unwrap().drop_finished(now);
}

/// Meter + mixer-view publication. Meter values are the envelope model,
/// clamped into [0, 1]; the master is the clamped RMS across lanes.
fn publish_mixer(shared: &EngineShared, now: f64) {
    let (meters, deck_a, deck_b, voice, crossfader, ducking) = {
        let tl = shared.timeline.lock().unwrap();
        let active: Vec<&ScheduledClip> = tl.active_clips(now);
        let meters = compute_meters(&active, now);
        let (a, b, v, x, d) = mixer_view(&active, tl.transitions(), now);
        (meters, a, b, v, x, d)
    };
    shared.state.update_mixer(deck_a, deck_b, voice, crossfader, ducking);
    shared.state.update_meters(meters);
}

/// Per-channel level = max over active clips of the clip envelope, clamped;
/// master = min(1, sqrt of the channel power sum).
pub fn compute_meters(active: &[&ScheduledClip], now: f64) -> Meters {
    let mut meters = Meters::default();
    for clip in active {
        let level = clip.envelope_level(now).clamp(0.0, 1.0);
        let slot = match clip.channel {
            Channel::Music => &mut meters.music,
            Channel::Voice => &mut meters.voice,
            Channel::Jingle => &mut meters.jingle,
            Channel::Ads => &mut meters.ads,
        };
        if level > *slot {
            *slot = level;
        }
    }
    let power = meters.music * meters.music
        + meters.voice * meters.voice
        + meters.jingle * meters.jingle
        + meters.ads * meters.ads;
    meters.master = power.sqrt().min(1.0);
    meters
}

/// Derive the dashboard mixer view from the active clips.
pub fn mixer_view(
    active: &[&ScheduledClip],
    transitions: &[Transition],
    now: f64,
) -> (DeckState, DeckState, VoiceLaneState, CrossfaderState, DuckingState) {
    let deck_state = |deck: Deck| {
        active
            .iter()
            .find(|c| c.deck == Some(deck))
            .map(|c| DeckState {
                segment_id: Some(c.segment_id.clone()),
                note: Some(c.note.clone()),
                until_secs: Some(c.end_at_secs()),
            })
            .unwrap_or_default()
    };
    let deck_a = deck_state(Deck::A);
    let deck_b = deck_state(Deck::B);

    let voice_clip = active.iter().find(|c| c.channel == Channel::Voice);
    let voice = voice_clip
        .map(|c| VoiceLaneState {
            active: true,
            segment_id: Some(c.segment_id.clone()),
            note: Some(c.note.clone()),
        })
        .unwrap_or_default();

    let active_transition = transitions
        .iter()
        .find(|t| now >= t.at_secs && now < t.at_secs + t.window_secs)
        .cloned();
    let position = match &active_transition {
        Some(t) => {
            let progress = ((now - t.at_secs) / t.window_secs).clamp(0.0, 1.0);
            let from_deck = active
                .iter()
                .find(|c| c.segment_id == t.from_segment_id)
                .and_then(|c| c.deck);
            match from_deck {
                Some(Deck::A) | None => -1.0 + 2.0 * progress,
                Some(Deck::B) => 1.0 - 2.0 * progress,
            }
        }
        None => {
            match (deck_a.segment_id.is_some(), deck_b.segment_id.is_some()) {
                (true, false) => -1.0,
                (false, true) => 1.0,
                _ => 0.0,
            }
        }
    };

    let music_active = active.iter().any(|c| c.channel == Channel::Music);
    let ducking = DuckingState {
        active: voice.active && music_active,
        amount: if voice.active && music_active {
            DUCK_AMOUNT
        } else {
            1.0
        },
    };

    (
        deck_a,
        deck_b,
        voice,
        CrossfaderState {
            position,
            active_transition,
        },
        ducking,
    )
}

// ── Per-segment pump ────────────────────────────────────────────────────────

/// Pop → place → push, one segment at a time. The sink's real-time pipe
/// paces this loop; a failed push (including a skip) moves on to the next
/// segment.
fn per_segment_pump(shared: &EngineShared) {
    while shared.running.load(Ordering::SeqCst) {
        let popped = shared.queue.lock().unwrap().pop();
        let Some(item) = popped else {
            std::thread::sleep(Duration::from_millis(200));
            continue;
        };
        let views = shared.queue.lock().unwrap().views();
        shared.state.queue_changed(views);

        let now = shared.clock.now_secs();
        shared.place(&item.segment, now);

        if let Err(e) = shared.output.push_file(&item.segment.path) {
            match &e {
                StationError::Process { stderr, .. } if stderr.contains("aborted") => {
                    tracing::info!("segment {} skipped", item.segment.id);
                }
                _ => shared.state.record_error(e.tag(), e.to_string()),
            }
        }
    }
}

// ── Chunked renderer ────────────────────────────────────────────────────────

/// Advance the output horizon in fixed windows, mixing whatever overlaps
/// each window (or silence) and pushing it through the sink. At most one
/// instance of this loop runs; the pipe write is the pacing point.
fn chunk_pump(shared: &EngineShared) {
    let mut horizon = 0.0_f64;
    while shared.running.load(Ordering::SeqCst) {
        let window_clips: Vec<MixClip> = {
            let tl = shared.timeline.lock().unwrap();
            let overlapping = tl.clips_overlapping(horizon, horizon + WINDOW_SECS);
            window_mix_clips(&overlapping, horizon, WINDOW_SECS)
        };

        let chunk = shared
            .work_dir
            .join(format!("engine-chunk-{}.wav", uuid::Uuid::new_v4()));
        let rendered = if window_clips.is_empty() {
            shared.media.silence(&chunk, WINDOW_SECS)
        } else {
            shared
                .media
                .render_mix(&window_clips, &chunk, shared.master_windows)
        };
        if let Err(e) = rendered {
            shared.state.count_render_failure();
            shared.state.record_error(e.tag(), e.to_string());
            std::thread::sleep(TICK);
            continue;
        }

        match shared.output.push_file(&chunk) {
            Ok(()) => {
                let _ = std::fs::remove_file(&chunk);
                horizon += WINDOW_SECS;
            }
            Err(e) => {
                let _ = std::fs::remove_file(&chunk);
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                shared.state.record_error(e.tag(), e.to_string());
                std::thread::sleep(TICK);
            }
        }
    }
}

/// Cut each overlapping clip down to its audible sub-window and evaluate
/// the gain ramp at the window edges.
pub fn window_mix_clips(clips: &[&ScheduledClip], horizon: f64, window: f64) -> Vec<MixClip> {
    let window_end = horizon + window;
    clips
        .iter()
        .map(|clip| {
            let from = clip.start_at_secs.max(horizon);
            let to = clip.end_at_secs().min(window_end);
            let into_clip = from - clip.start_at_secs;
            let duration = to - from;

            let (gain, ramp) = match clip.ramp {
                Some(r) => {
                    let g0 = ramp_value(&r, into_clip);
                    let g1 = ramp_value(&r, into_clip + duration);
                    if (g0 - g1).abs() < 1e-6 {
                        (g0, None)
                    } else {
                        (
                            1.0,
                            Some(GainRamp {
                                from: g0,
                                to: g1,
                                ramp_secs: duration,
                            }),
                        )
                    }
                }
                None => (clip.gain, None),
            };

            // Fade edges only apply in the windows that contain them.
            let fade_in = if clip.fade_in_secs > 0.0 && into_clip < clip.fade_in_secs {
                (clip.fade_in_secs - into_clip).min(duration)
            } else {
                0.0
            };
            let remaining_after = clip.end_at_secs() - to;
            let fade_out = if clip.fade_out_secs > 0.0 && remaining_after < clip.fade_out_secs {
                (clip.fade_out_secs - remaining_after).min(duration)
            } else {
                0.0
            };

            MixClip {
                path: clip.path.clone(),
                start_offset_secs: from - horizon,
                source_offset_secs: clip.source_offset_secs + into_clip,
                duration_secs: Some(duration),
                gain,
                ramp,
                fade_in_secs: fade_in,
                fade_out_secs: fade_out,
            }
        })
        .collect()
}

fn ramp_value(ramp: &GainRamp, at: f64) -> f64 {
    if ramp.ramp_secs <= 0.0 {
        return ramp.to;
    }
    ramp.from + (ramp.to - ramp.from) * (at / ramp.ramp_secs).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::RenderedSegment;
    use crate::timeline::Timeline;

    fn song(duration: f64) -> RenderedSegment {
        RenderedSegment::new(SegmentKind::Song, "song.wav".into(), duration, "song".into())
    }

    #[test]
    fn window_clips_trim_to_the_audible_subwindow() {
        let mut tl = Timeline::new(None, false);
        let placed = tl.place(&song(30.0), 0.0);
        let clip = &placed[0];

        // Window [4, 6): two seconds in the middle of the clip.
        let clips = window_mix_clips(&[clip], 4.0, 2.0);
        assert_eq!(clips.len(), 1);
        let c = &clips[0];
        assert_eq!(c.start_offset_secs, 0.0);
        assert_eq!(c.source_offset_secs, 4.0);
        assert_eq!(c.duration_secs, Some(2.0));
    }

    #[test]
    fn window_clips_delay_mid_window_entries() {
        let mut tl = Timeline::new(None, false);
        // First song occupies [0, 30); second starts at 30.
        tl.place(&song(30.0), 0.0);
        let placed = tl.place(&song(30.0), 0.0);
        let clip = &placed[0];

        // Window [29, 31): the second song enters 1s into the window.
        let clips = window_mix_clips(&[clip], 29.0, 2.0);
        let c = &clips[0];
        assert_eq!(c.start_offset_secs, 1.0);
        assert_eq!(c.source_offset_secs, 0.0);
        assert_eq!(c.duration_secs, Some(1.0));
    }

    #[test]
    fn window_gain_endpoints_follow_the_ramp() {
        let mut tl = Timeline::new(None, false);
        let placed = tl.place(&song(30.0), 0.0);
        let clip = &placed[0]; // music ramp 0.70 → 1.00 over 7s

        let clips = window_mix_clips(&[clip], 0.0, 2.0);
        let ramp = clips[0].ramp.unwrap();
        assert!((ramp.from - 0.70).abs() < 1e-9);
        let expected = 0.70 + (1.00 - 0.70) * (2.0 / 7.0);
        assert!((ramp.to - expected).abs() < 1e-9);
        assert_eq!(ramp.ramp_secs, 2.0);
    }

    #[test]
    fn settled_ramp_collapses_to_constant_gain() {
        let mut tl = Timeline::new(None, false);
        let placed = tl.place(&song(30.0), 0.0);
        let clip = &placed[0];

        // Window [10, 12): past the 7s entrance ramp.
        let clips = window_mix_clips(&[clip], 10.0, 2.0);
        assert!(clips[0].ramp.is_none());
        assert!((clips[0].gain - 1.0).abs() < 1e-9);
    }

    #[test]
    fn meters_stay_in_unit_range() {
        let mut tl = Timeline::new(None, false);
        tl.place(&song(30.0), 0.0);
        tl.place(&RenderedSegment::new(SegmentKind::Commentary, "t.wav".into(), 20.0, "t".into()), 0.0);

        for now in [0.0, 1.0, 5.0, 10.0, 29.5] {
            let active = tl.active_clips(now);
            let m = compute_meters(&active, now);
            for v in [m.music, m.voice, m.jingle, m.ads, m.master] {
                assert!((0.0..=1.0).contains(&v), "meter {} out of range at {}", v, now);
            }
        }
    }

    #[test]
    fn meters_are_zero_with_nothing_active() {
        let m = compute_meters(&[], 0.0);
        assert_eq!(m, Meters::default());
    }

    #[test]
    fn voice_over_music_engages_ducking() {
        let mut tl = Timeline::new(None, false);
        tl.place(&song(30.0), 0.0);
        // Commentary placed after a song starts at the cursor; put a voice
        // clip overlapping by placing with now well before the song ends.
        let talk = RenderedSegment::new(
            SegmentKind::Commentary,
            "t.wav".into(),
            10.0,
            "talk".into(),
        );
        tl.place(&talk, 0.0);

        // At t=31 the voice clip (30..40) is active, music is not.
        let active = tl.active_clips(31.0);
        let (_, _, voice, _, ducking) = mixer_view(&active, tl.transitions(), 31.0);
        assert!(voice.active);
        assert!(!ducking.active);

        // A song sliding under the commentary tail overlaps it.
        tl.place(&song(30.0), 31.0);
        let active = tl.active_clips(35.5);
        let (_, _, voice, _, ducking) = mixer_view(&active, tl.transitions(), 35.5);
        assert!(voice.active);
        assert!(ducking.active);
        assert_eq!(ducking.amount, DUCK_AMOUNT);
    }

    #[test]
    fn crossfader_rests_on_the_active_deck() {
        let mut tl = Timeline::new(None, false);
        tl.place(&song(30.0), 0.0); // deck A, 0..30
        let active = tl.active_clips(5.0);
        let (_, _, _, fader, _) = mixer_view(&active, tl.transitions(), 5.0);
        assert_eq!(fader.position, -1.0);
    }

    #[test]
    fn crossfader_sweeps_during_a_transition() {
        let mut tl = Timeline::new(None, false);
        tl.place(&song(30.0), 0.0); // deck A, 0..30
        tl.place(&song(30.0), 0.0); // deck B, 30..60, window 26.4..30
        // Halfway through the 3.6s window at t = 28.2.
        let active = tl.active_clips(28.2);
        let (_, _, _, fader, _) = mixer_view(&active, tl.transitions(), 28.2);
        let t = fader.active_transition.expect("transition active");
        assert_eq!(t.window_secs, 3.6);
        assert!((fader.position - 0.0).abs() < 0.05, "position {}", fader.position);
    }

    #[test]
    fn stream_clock_is_monotone() {
        let clock = StreamClock::start_now();
        let a = clock.now_secs();
        std::thread::sleep(Duration::from_millis(10));
        let b = clock.now_secs();
        assert!(b >= a);
    }
}
