//! The virtual playout timeline: two music decks, a voice-over lane, and a
//! jingle lane, with crossfade planning between songs. All placement is
//! pure in `now` (injected seconds-since-stream-start), so every rule here
//! is testable without a clock.

use crate::renderer::GainRamp;
use crate::segment::{Channel, RenderedSegment, SegmentKind};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Music-kind clips alternate between two virtual decks to plan crossfades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Deck {
    A,
    B,
}

impl Deck {
    fn other(self) -> Deck {
        match self {
            Deck::A => Deck::B,
            Deck::B => Deck::A,
        }
    }
}

impl fmt::Display for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deck::A => write!(f, "A"),
            Deck::B => write!(f, "B"),
        }
    }
}

/// Crossfade shape between adjacent songs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeCurve {
    Tri,
    Exp,
    Log,
}

/// One atomic element on the output timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledClip {
    pub id: String,
    pub segment_id: String,
    /// Set when this clip was expanded out of another segment (the
    /// station-ID jingle under a commentary).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_segment_id: Option<String>,
    pub kind: SegmentKind,
    pub channel: Channel,
    pub path: PathBuf,
    pub start_at_secs: f64,
    pub source_offset_secs: f64,
    pub duration_secs: f64,
    pub gain: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp: Option<GainRamp>,
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck: Option<Deck>,
    pub note: String,
}

impl ScheduledClip {
    pub fn end_at_secs(&self) -> f64 {
        self.start_at_secs + self.duration_secs
    }

    /// Envelope level at `now`: the gain ramp value shaped by the clip's
    /// fade edges. Zero outside the clip's window. This drives the meters;
    /// it is an envelope model, not sample amplitude.
    pub fn envelope_level(&self, now: f64) -> f64 {
        let dt = now - self.start_at_secs;
        if dt < 0.0 || dt > self.duration_secs {
            return 0.0;
        }

        let base = match self.ramp {
            Some(r) if r.ramp_secs > 0.0 => {
                r.from + (r.to - r.from) * (dt / r.ramp_secs).min(1.0)
            }
            Some(r) => r.to,
            None => self.gain,
        };

        let mut shape = 1.0;
        if self.fade_in_secs > 0.0 && dt < self.fade_in_secs {
            shape *= dt / self.fade_in_secs;
        }
        let remaining = self.duration_secs - dt;
        if self.fade_out_secs > 0.0 && remaining < self.fade_out_secs {
            shape *= remaining / self.fade_out_secs;
        }
        (base * shape).max(0.0)
    }
}

/// A planned deck-to-deck crossfade covering the tail of the outgoing song.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from_segment_id: String,
    pub to_segment_id: String,
    /// Where the window begins, seconds from stream start.
    pub at_secs: f64,
    pub window_secs: f64,
    pub curve: FadeCurve,
}

/// The station-identification sting prepended to commentary breaks.
#[derive(Debug, Clone)]
pub struct StationIdent {
    pub path: PathBuf,
    pub duration_secs: f64,
}

/// Shortest station-ID worth playing.
const IDENT_MIN_SECS: f64 = 0.05;
/// Finished clips stay visible this long for the dashboard.
const FINISHED_KEEP_SECS: f64 = 4.0;

const VOICE_RAMP: GainRamp = GainRamp {
    from: 0.65,
    to: 1.35,
    ramp_secs: 3.5,
};
const MUSIC_RAMP: GainRamp = GainRamp {
    from: 0.70,
    to: 1.00,
    ramp_secs: 7.0,
};

#[derive(Debug, Clone)]
struct LastPlaced {
    segment_id: String,
    kind: SegmentKind,
    start_at_secs: f64,
    duration_secs: f64,
    /// The song started beneath a commentary tail.
    under_commentary: bool,
}

pub struct Timeline {
    cursor_secs: f64,
    next_deck: Deck,
    last: Option<LastPlaced>,
    clips: Vec<ScheduledClip>,
    transitions: Vec<Transition>,
    station_ident: Option<StationIdent>,
    /// Carry the bed overlap into the following song's source offset.
    bed_carryover: bool,
}

impl Timeline {
    pub fn new(station_ident: Option<StationIdent>, bed_carryover: bool) -> Self {
        let station_ident =
            station_ident.filter(|ident| ident.duration_secs > IDENT_MIN_SECS);
        Timeline {
            cursor_secs: 0.0,
            next_deck: Deck::A,
            last: None,
            clips: Vec::new(),
            transitions: Vec::new(),
            station_ident,
            bed_carryover,
        }
    }

    /// Seconds of planned output ahead of `now`. Never negative.
    pub fn buffered_secs(&self, now: f64) -> f64 {
        (self.cursor_secs - now).max(0.0)
    }

    pub fn cursor_secs(&self) -> f64 {
        self.cursor_secs
    }

    pub fn clips(&self) -> &[ScheduledClip] {
        &self.clips
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Place a rendered segment. Returns the clips it expanded into, in
    /// start order; the same clips are retained on the timeline.
    pub fn place(&mut self, seg: &RenderedSegment, now: f64) -> Vec<ScheduledClip> {
        let mut base_start = self.cursor_secs.max(now);
        if let Some(requested) = seg.start_at_secs {
            base_start = base_start.max(requested);
        }

        let mut produced: Vec<ScheduledClip> = Vec::new();

        // A song slides beneath the latter half of a preceding commentary.
        let mut start = base_start;
        let mut under_commentary = false;
        if seg.kind == SegmentKind::Song {
            if let Some(last) = &self.last {
                if last.kind == SegmentKind::Commentary {
                    let midpoint = last.start_at_secs + 0.5 * last.duration_secs;
                    start = base_start.min(midpoint).max(now);
                    under_commentary = start < base_start;
                }
            }
        }

        // Commentary gets the station-ID sting in front, ducking under the
        // voice entrance.
        if seg.kind == SegmentKind::Commentary {
            if let Some(ident) = &self.station_ident {
                let d = ident.duration_secs;
                let crossfade = (0.4 * d).min(0.45);
                produced.push(ScheduledClip {
                    id: uuid::Uuid::new_v4().to_string(),
                    segment_id: format!("{}-ident", seg.id),
                    parent_segment_id: Some(seg.id.clone()),
                    kind: SegmentKind::Liner,
                    channel: Channel::Jingle,
                    path: ident.path.clone(),
                    start_at_secs: base_start,
                    source_offset_secs: 0.0,
                    duration_secs: d,
                    gain: 1.0,
                    ramp: Some(GainRamp {
                        from: 1.0,
                        to: 0.15,
                        ramp_secs: d,
                    }),
                    fade_in_secs: 0.0,
                    fade_out_secs: 0.0,
                    deck: None,
                    note: "station id".to_string(),
                });
                start = base_start + (d - crossfade).max(0.0);
            }
        }

        let deck = if seg.kind == SegmentKind::Song {
            let deck = self.next_deck;
            self.next_deck = deck.other();
            Some(deck)
        } else {
            None
        };

        let channel = seg.channel();
        let ramp = match channel {
            Channel::Voice => Some(VOICE_RAMP),
            Channel::Music => Some(MUSIC_RAMP),
            _ => None,
        };

        let mut source_offset = 0.0;
        let mut duration = seg.duration_secs;
        if self.bed_carryover && under_commentary {
            // The slice that played as a bed is consumed, not repeated.
            let bed = base_start - start;
            source_offset = bed;
            duration = (duration - bed).max(0.0);
            start = base_start;
        }

        let main = ScheduledClip {
            id: uuid::Uuid::new_v4().to_string(),
            segment_id: seg.id.clone(),
            parent_segment_id: None,
            kind: seg.kind,
            channel,
            path: seg.path.clone(),
            start_at_secs: start,
            source_offset_secs: source_offset,
            duration_secs: duration,
            gain: 1.0,
            ramp,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
            deck,
            note: seg.note.clone(),
        };

        // Adjacent songs get a crossfade window over the outgoing tail.
        if seg.kind == SegmentKind::Song {
            if let Some(last) = &self.last {
                if last.kind == SegmentKind::Song {
                    let window = crossfade_window_secs(seg.priority);
                    let curve = if last.under_commentary {
                        FadeCurve::Log
                    } else if seg.priority >= 100 {
                        FadeCurve::Exp
                    } else {
                        FadeCurve::Tri
                    };
                    self.transitions.push(Transition {
                        from_segment_id: last.segment_id.clone(),
                        to_segment_id: seg.id.clone(),
                        at_secs: last.start_at_secs + last.duration_secs - window,
                        window_secs: window,
                        curve,
                    });
                }
            }
        }

        self.cursor_secs = self.cursor_secs.max(main.end_at_secs());
        self.last = Some(LastPlaced {
            segment_id: seg.id.clone(),
            kind: seg.kind,
            start_at_secs: main.start_at_secs,
            duration_secs: main.duration_secs,
            under_commentary,
        });

        produced.push(main);
        produced.sort_by(|a, b| a.start_at_secs.total_cmp(&b.start_at_secs));
        self.clips.extend(produced.iter().cloned());
        produced
    }

    /// Clips whose audible window intersects `[from, to)`.
    pub fn clips_overlapping(&self, from: f64, to: f64) -> Vec<&ScheduledClip> {
        self.clips
            .iter()
            .filter(|c| c.start_at_secs < to && c.end_at_secs() > from)
            .collect()
    }

    /// Clips audible at `now`.
    pub fn active_clips(&self, now: f64) -> Vec<&ScheduledClip> {
        self.clips
            .iter()
            .filter(|c| c.start_at_secs <= now && c.end_at_secs() > now)
            .collect()
    }

    /// Forget clips that finished more than the keep window ago. Returns
    /// the dropped clips.
    pub fn drop_finished(&mut self, now: f64) -> Vec<ScheduledClip> {
        let cutoff = now - FINISHED_KEEP_SECS;
        let (dropped, kept): (Vec<_>, Vec<_>) = self
            .clips
            .drain(..)
            .partition(|c| c.end_at_secs() < cutoff);
        self.clips = kept;
        self.transitions
            .retain(|t| t.at_secs + t.window_secs >= cutoff);
        dropped
    }
}

/// Crossfade window width by the incoming song's priority.
fn crossfade_window_secs(priority: u8) -> f64 {
    if priority >= 120 {
        2.2
    } else if priority >= 80 {
        2.8
    } else {
        3.6
    }
}

// ── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrationEntry {
    pub segment_id: String,
    pub reason: crate::queue::ArbitrationReason,
}

/// Read-only view of the upcoming timeline, grouped by deck, with the
/// planned transitions inside the lookahead window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSnapshot {
    pub deck_a: Vec<ScheduledClip>,
    pub deck_b: Vec<ScheduledClip>,
    pub voice_lane: Vec<ScheduledClip>,
    pub jingle_lane: Vec<ScheduledClip>,
    pub transitions: Vec<Transition>,
    pub arbitration: Vec<ArbitrationEntry>,
    pub lookahead_secs: f64,
}

impl Timeline {
    pub fn snapshot(
        &self,
        now: f64,
        lookahead_secs: f64,
        arbitration: Vec<ArbitrationEntry>,
    ) -> TimelineSnapshot {
        let horizon = now + lookahead_secs;
        let upcoming: Vec<&ScheduledClip> = self
            .clips
            .iter()
            .filter(|c| c.end_at_secs() > now && c.start_at_secs < horizon)
            .collect();

        let lane = |pred: &dyn Fn(&ScheduledClip) -> bool| -> Vec<ScheduledClip> {
            upcoming.iter().filter(|c| pred(c)).map(|c| (*c).clone()).collect()
        };

        TimelineSnapshot {
            deck_a: lane(&|c| c.deck == Some(Deck::A)),
            deck_b: lane(&|c| c.deck == Some(Deck::B)),
            voice_lane: lane(&|c| c.deck.is_none() && c.channel == Channel::Voice),
            jingle_lane: lane(&|c| {
                c.deck.is_none() && matches!(c.channel, Channel::Jingle | Channel::Ads)
            }),
            transitions: self
                .transitions
                .iter()
                .filter(|t| t.at_secs + t.window_secs > now && t.at_secs < horizon)
                .cloned()
                .collect(),
            arbitration,
            lookahead_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{RenderedSegment, SegmentKind};

    fn seg(kind: SegmentKind, duration: f64, priority: u8) -> RenderedSegment {
        let mut s = RenderedSegment::new(kind, "seg.wav".into(), duration, "seg".into());
        s.priority = priority;
        s
    }

    fn bare_timeline() -> Timeline {
        Timeline::new(None, false)
    }

    #[test]
    fn placement_starts_at_cursor_or_now() {
        let mut tl = bare_timeline();
        let clips = tl.place(&seg(SegmentKind::Song, 30.0, 50), 5.0);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].start_at_secs, 5.0);
        assert_eq!(tl.cursor_secs(), 35.0);

        // The next placement continues at the cursor, not at now.
        let clips = tl.place(&seg(SegmentKind::Song, 30.0, 50), 6.0);
        assert_eq!(clips[0].start_at_secs, 35.0);
    }

    #[test]
    fn decks_alternate_for_songs_only() {
        let mut tl = bare_timeline();
        let a = tl.place(&seg(SegmentKind::Song, 10.0, 50), 0.0);
        let talk = tl.place(&seg(SegmentKind::Commentary, 5.0, 50), 0.0);
        let b = tl.place(&seg(SegmentKind::Song, 10.0, 50), 0.0);
        let c = tl.place(&seg(SegmentKind::Song, 10.0, 50), 0.0);
        assert_eq!(a[0].deck, Some(Deck::A));
        assert!(talk[0].deck.is_none());
        assert_eq!(b[0].deck, Some(Deck::B));
        assert_eq!(c[0].deck, Some(Deck::A));
    }

    #[test]
    fn four_songs_alternate_decks_and_plan_three_triangular_crossfades() {
        let mut tl = bare_timeline();
        let mut decks = Vec::new();
        for _ in 0..4 {
            let clips = tl.place(&seg(SegmentKind::Song, 60.0, 50), 0.0);
            decks.push(clips[0].deck.unwrap());
        }
        assert_eq!(decks, [Deck::A, Deck::B, Deck::A, Deck::B]);

        let transitions = tl.transitions();
        assert_eq!(transitions.len(), 3);
        for t in transitions {
            assert_eq!(t.window_secs, 3.6);
            assert_eq!(t.curve, FadeCurve::Tri);
        }
    }

    #[test]
    fn crossfade_window_narrows_with_priority() {
        assert_eq!(crossfade_window_secs(50), 3.6);
        assert_eq!(crossfade_window_secs(80), 2.8);
        assert_eq!(crossfade_window_secs(120), 2.2);
    }

    #[test]
    fn high_priority_follow_up_uses_exponential_curve() {
        let mut tl = bare_timeline();
        tl.place(&seg(SegmentKind::Song, 60.0, 50), 0.0);
        tl.place(&seg(SegmentKind::Song, 60.0, 110), 0.0);
        assert_eq!(tl.transitions()[0].curve, FadeCurve::Exp);
        assert_eq!(tl.transitions()[0].window_secs, 2.8);
    }

    #[test]
    fn song_slides_under_commentary_tail() {
        let mut tl = bare_timeline();
        tl.place(&seg(SegmentKind::Commentary, 10.0, 50), 0.0);
        assert_eq!(tl.cursor_secs(), 10.0);

        // Midpoint of the commentary is 5.0; the song begins there.
        let clips = tl.place(&seg(SegmentKind::Song, 30.0, 50), 2.0);
        assert_eq!(clips[0].start_at_secs, 5.0);
        assert_eq!(tl.cursor_secs(), 35.0);
    }

    #[test]
    fn song_never_starts_before_now() {
        let mut tl = bare_timeline();
        tl.place(&seg(SegmentKind::Commentary, 10.0, 50), 0.0);
        // now is already past the midpoint
        let clips = tl.place(&seg(SegmentKind::Song, 30.0, 50), 8.0);
        assert_eq!(clips[0].start_at_secs, 8.0);
    }

    #[test]
    fn station_ident_prepends_and_ducks_under_the_voice() {
        let ident = StationIdent {
            path: "ident.wav".into(),
            duration_secs: 0.8,
        };
        let mut tl = Timeline::new(Some(ident), false);
        let clips = tl.place(&seg(SegmentKind::Commentary, 10.0, 50), 20.0);
        assert_eq!(clips.len(), 2);

        let jingle = &clips[0];
        assert_eq!(jingle.channel, Channel::Jingle);
        assert_eq!(jingle.start_at_secs, 20.0);
        assert_eq!(jingle.duration_secs, 0.8);
        let ramp = jingle.ramp.unwrap();
        assert_eq!(ramp.from, 1.0);
        assert_eq!(ramp.to, 0.15);
        assert_eq!(ramp.ramp_secs, 0.8);

        // crossfade = min(0.45, 0.4 * 0.8) = 0.32 → voice at 20.48
        let voice = &clips[1];
        assert_eq!(voice.channel, Channel::Voice);
        assert!((voice.start_at_secs - 20.48).abs() < 1e-9);
        assert_eq!(voice.duration_secs, 10.0);
        assert_eq!(voice.parent_segment_id, None);
        assert_eq!(jingle.parent_segment_id.as_deref(), Some(clips[1].segment_id.as_str()));
    }

    #[test]
    fn too_short_ident_is_ignored() {
        let ident = StationIdent {
            path: "ident.wav".into(),
            duration_secs: 0.04,
        };
        let mut tl = Timeline::new(Some(ident), false);
        let clips = tl.place(&seg(SegmentKind::Commentary, 10.0, 50), 0.0);
        assert_eq!(clips.len(), 1);
    }

    #[test]
    fn voice_and_music_get_their_entrance_ramps() {
        let mut tl = bare_timeline();
        let song = tl.place(&seg(SegmentKind::Song, 30.0, 50), 0.0);
        let talk = tl.place(&seg(SegmentKind::Commentary, 10.0, 50), 0.0);
        let music_ramp = song[0].ramp.unwrap();
        assert_eq!((music_ramp.from, music_ramp.to, music_ramp.ramp_secs), (0.70, 1.00, 7.0));
        let voice_ramp = talk[0].ramp.unwrap();
        assert_eq!((voice_ramp.from, voice_ramp.to, voice_ramp.ramp_secs), (0.65, 1.35, 3.5));
    }

    #[test]
    fn liner_maps_to_jingle_lane_with_no_ramp() {
        let mut tl = bare_timeline();
        let clips = tl.place(&seg(SegmentKind::Liner, 3.0, 50), 0.0);
        assert_eq!(clips[0].channel, Channel::Jingle);
        assert!(clips[0].ramp.is_none());
    }

    #[test]
    fn buffered_seconds_never_negative() {
        let mut tl = bare_timeline();
        assert_eq!(tl.buffered_secs(100.0), 0.0);
        tl.place(&seg(SegmentKind::Song, 30.0, 50), 0.0);
        assert_eq!(tl.buffered_secs(10.0), 20.0);
        assert_eq!(tl.buffered_secs(500.0), 0.0);
    }

    #[test]
    fn cursor_is_monotone() {
        let mut tl = bare_timeline();
        let mut prev = tl.cursor_secs();
        for _ in 0..5 {
            tl.place(&seg(SegmentKind::Song, 10.0, 50), 0.0);
            assert!(tl.cursor_secs() >= prev);
            prev = tl.cursor_secs();
        }
    }

    #[test]
    fn envelope_is_zero_outside_and_shaped_inside() {
        let mut tl = bare_timeline();
        let clips = tl.place(&seg(SegmentKind::Song, 30.0, 50), 0.0);
        let clip = &clips[0];
        assert_eq!(clip.envelope_level(-1.0), 0.0);
        assert_eq!(clip.envelope_level(31.0), 0.0);
        // Entrance ramp: 0.70 at t=0 rising toward 1.0 at t=7.
        assert!((clip.envelope_level(0.0) - 0.70).abs() < 1e-9);
        assert!((clip.envelope_level(7.0) - 1.0).abs() < 1e-9);
        assert!((clip.envelope_level(20.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn down_ramp_envelope_descends() {
        let ident = StationIdent {
            path: "ident.wav".into(),
            duration_secs: 1.0,
        };
        let mut tl = Timeline::new(Some(ident), false);
        let clips = tl.place(&seg(SegmentKind::Commentary, 10.0, 50), 0.0);
        let jingle = &clips[0];
        assert!((jingle.envelope_level(0.0) - 1.0).abs() < 1e-9);
        assert!((jingle.envelope_level(1.0) - 0.15).abs() < 1e-9);
    }

    #[test]
    fn drop_finished_keeps_recent_and_active_clips() {
        let mut tl = bare_timeline();
        tl.place(&seg(SegmentKind::Song, 10.0, 50), 0.0); // ends at 10
        tl.place(&seg(SegmentKind::Song, 10.0, 50), 0.0); // ends at 20
        let dropped = tl.drop_finished(13.0);
        // First clip ended 3s ago, inside the keep window.
        assert!(dropped.is_empty());
        let dropped = tl.drop_finished(14.5);
        assert_eq!(dropped.len(), 1);
        assert_eq!(tl.clips().len(), 1);
    }

    #[test]
    fn overlap_query_finds_window_clips() {
        let mut tl = bare_timeline();
        tl.place(&seg(SegmentKind::Song, 10.0, 50), 0.0);
        tl.place(&seg(SegmentKind::Song, 10.0, 50), 0.0);
        assert_eq!(tl.clips_overlapping(0.0, 2.0).len(), 1);
        // Songs 1 and 2 meet at t=10.
        assert_eq!(tl.clips_overlapping(8.0, 12.0).len(), 2);
        assert_eq!(tl.clips_overlapping(30.0, 32.0).len(), 0);
    }

    #[test]
    fn requested_start_pushes_placement_later() {
        let mut tl = bare_timeline();
        let mut s = seg(SegmentKind::Song, 10.0, 50);
        s.start_at_secs = Some(42.0);
        let clips = tl.place(&s, 0.0);
        assert_eq!(clips[0].start_at_secs, 42.0);
    }

    #[test]
    fn bed_carryover_consumes_the_overlap() {
        let mut tl = Timeline::new(None, true);
        tl.place(&seg(SegmentKind::Commentary, 10.0, 50), 0.0);
        let clips = tl.place(&seg(SegmentKind::Song, 30.0, 50), 0.0);
        // Bed would have covered 5.0..10.0; the audible clip starts at the
        // commentary's end with the bed slice consumed.
        assert_eq!(clips[0].start_at_secs, 10.0);
        assert_eq!(clips[0].source_offset_secs, 5.0);
        assert_eq!(clips[0].duration_secs, 25.0);
    }

    #[test]
    fn snapshot_groups_by_deck_and_lane() {
        let ident = StationIdent {
            path: "ident.wav".into(),
            duration_secs: 0.8,
        };
        let mut tl = Timeline::new(Some(ident), false);
        tl.place(&seg(SegmentKind::Song, 30.0, 50), 0.0);
        tl.place(&seg(SegmentKind::Song, 30.0, 50), 0.0);
        tl.place(&seg(SegmentKind::Commentary, 10.0, 50), 0.0);

        let snap = tl.snapshot(0.0, 120.0, vec![]);
        assert_eq!(snap.deck_a.len(), 1);
        assert_eq!(snap.deck_b.len(), 1);
        assert_eq!(snap.voice_lane.len(), 1);
        assert_eq!(snap.jingle_lane.len(), 1);
        assert_eq!(snap.transitions.len(), 1);
        assert_eq!(snap.lookahead_secs, 120.0);
    }

    #[test]
    fn snapshot_respects_the_lookahead_window() {
        let mut tl = bare_timeline();
        tl.place(&seg(SegmentKind::Song, 30.0, 50), 0.0); // 0..30
        tl.place(&seg(SegmentKind::Song, 30.0, 50), 0.0); // 30..60
        let snap = tl.snapshot(0.0, 20.0, vec![]);
        assert_eq!(snap.deck_a.len() + snap.deck_b.len(), 1);
    }
}
