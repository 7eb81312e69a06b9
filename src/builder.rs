//! Segment production. Alternates between song and commentary phases per
//! the configured cadence, shuffles the catalog without immediate repeats,
//! and always degrades a failed commentary into a liner so playout never
//! stalls on an upstream service.

use crate::commentary::CommentaryGenerator;
use crate::error::Result;
use crate::renderer::MediaEngine;
use crate::segment::{RenderedSegment, SegmentKind};
use crate::track::Track;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolves a track to its cached, normalized WAV.
pub trait TrackAudio: Send + Sync {
    fn fetch_track_wav(&self, track: &Track) -> Result<PathBuf>;
}

/// Turns text into a WAV file.
pub trait SpeechSynth: Send + Sync {
    fn synthesize(&self, text: &str, output: &Path) -> Result<()>;
}

/// What the builder intends to produce next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Songs,
    Commentary,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Songs => write!(f, "songs"),
            Phase::Commentary => write!(f, "commentary"),
        }
    }
}

const SONG_FADE_IN_SECS: f64 = 0.4;
const SONG_FADE_OUT_SECS: f64 = 0.9;
const LINER_SILENCE_SECS: f64 = 3.0;
const LAST_PLAYED_MAX: usize = 5;

pub struct SegmentBuilder {
    tracks: Vec<Track>,
    order: Vec<usize>,
    pos: usize,
    phase: Phase,
    songs_since_commentary: u32,
    cadence: u32,
    last_played: Vec<Track>,
    work_dir: PathBuf,
    liner_dir: Option<PathBuf>,
    audio: Arc<dyn TrackAudio>,
    synth: Arc<dyn SpeechSynth>,
    media: Arc<dyn MediaEngine>,
    commentary: CommentaryGenerator,
}

impl SegmentBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracks: Vec<Track>,
        cadence: u32,
        work_dir: PathBuf,
        liner_dir: Option<PathBuf>,
        audio: Arc<dyn TrackAudio>,
        synth: Arc<dyn SpeechSynth>,
        media: Arc<dyn MediaEngine>,
        commentary: CommentaryGenerator,
    ) -> Self {
        let mut builder = SegmentBuilder {
            tracks,
            order: Vec::new(),
            pos: 0,
            phase: Phase::Songs,
            songs_since_commentary: 0,
            cadence: cadence.max(1),
            last_played: Vec::new(),
            work_dir,
            liner_dir,
            audio,
            synth,
            media,
            commentary,
        };
        builder.reshuffle();
        builder
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn songs_since_commentary(&self) -> u32 {
        self.songs_since_commentary
    }

    pub fn last_played(&self) -> &[Track] {
        &self.last_played
    }

    /// Produce the next rendered segment per the current phase.
    pub fn build_next(&mut self) -> Result<RenderedSegment> {
        match self.phase {
            Phase::Songs => self.build_song(),
            Phase::Commentary => Ok(self.build_commentary_or_liner()),
        }
    }

    // ── Songs ───────────────────────────────────────────────────────────

    fn build_song(&mut self) -> Result<RenderedSegment> {
        let track = self.next_track().clone();
        let source = self.audio.fetch_track_wav(&track)?;

        let out = self
            .work_dir
            .join(format!("song-faded-{}.wav", uuid::Uuid::new_v4()));
        self.media
            .edge_fades(&source, &out, SONG_FADE_IN_SECS, SONG_FADE_OUT_SECS)?;

        let measured = self.media.duration_secs(&out);
        let duration = if measured > 0.0 {
            measured
        } else {
            f64::from(track.duration_sec).min(crate::source_cache::CLIP_SECS)
        };

        let seg = RenderedSegment::new(SegmentKind::Song, out, duration, track.display());

        self.last_played.push(track);
        while self.last_played.len() > LAST_PLAYED_MAX {
            self.last_played.remove(0);
        }
        self.songs_since_commentary += 1;
        if self.songs_since_commentary >= self.cadence {
            self.phase = Phase::Commentary;
        }
        Ok(seg)
    }

    fn next_track(&mut self) -> &Track {
        if self.pos >= self.order.len() {
            self.reshuffle();
        }
        let idx = self.order[self.pos];
        self.pos += 1;
        &self.tracks[idx]
    }

    /// New random permutation. If the previous last-played track would land
    /// first, it is swapped away so the rotation never repeats immediately.
    fn reshuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.order = (0..self.tracks.len()).collect();
        self.order.shuffle(&mut rng);
        self.pos = 0;

        if self.order.len() > 1 {
            if let Some(last) = self.last_played.last() {
                if self.tracks[self.order[0]].id == last.id {
                    let swap_with = rng.gen_range(1..self.order.len());
                    self.order.swap(0, swap_with);
                }
            }
        }
    }

    /// The track the next song build will use, if the order is known.
    fn upcoming_track(&self) -> Option<&Track> {
        self.order.get(self.pos).map(|&idx| &self.tracks[idx])
    }

    // ── Commentary ──────────────────────────────────────────────────────

    /// Commentary build with the liner fallback. Whatever happens, the
    /// phase flips back to songs and the counter resets.
    fn build_commentary_or_liner(&mut self) -> RenderedSegment {
        let seg = match self.build_commentary() {
            Ok(seg) => seg,
            Err(e) => {
                tracing::warn!("commentary build failed, falling back to liner: {}", e);
                self.build_liner()
            }
        };
        self.phase = Phase::Songs;
        self.songs_since_commentary = 0;
        seg
    }

    fn build_commentary(&mut self) -> Result<RenderedSegment> {
        let recent: Vec<Track> = self.last_played.clone();
        let upcoming = self.upcoming_track().cloned();
        let text = self.commentary.generate(&recent, upcoming.as_ref());

        let raw = self
            .work_dir
            .join(format!("talk-raw-{}.wav", uuid::Uuid::new_v4()));
        self.synth.synthesize(&text, &raw)?;

        let out = self
            .work_dir
            .join(format!("talk-mix-{}.wav", uuid::Uuid::new_v4()));
        self.media.voice_chain(&raw, &out)?;
        let _ = std::fs::remove_file(&raw);

        let measured = self.media.duration_secs(&out);
        let duration = if measured > 0.0 { measured } else { 8.0 };

        let mut seg =
            RenderedSegment::new(SegmentKind::Commentary, out, duration, "host break".into());
        seg.commentary_text = Some(text);
        Ok(seg)
    }

    /// Emergency filler: a random pre-recorded liner, or rendered silence
    /// when no liner directory is configured.
    fn build_liner(&mut self) -> RenderedSegment {
        if let Some(path) = self.pick_liner() {
            let measured = self.media.duration_secs(&path);
            if measured > 0.0 {
                let note = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "liner".to_string());
                return RenderedSegment::new(SegmentKind::Liner, path, measured, note);
            }
        }

        let out = self
            .work_dir
            .join(format!("talk-liner-{}.wav", uuid::Uuid::new_v4()));
        let duration = match self.media.silence(&out, LINER_SILENCE_SECS) {
            Ok(()) => LINER_SILENCE_SECS,
            Err(e) => {
                tracing::error!("could not render liner silence: {}", e);
                LINER_SILENCE_SECS
            }
        };
        RenderedSegment::new(SegmentKind::Liner, out, duration, "silence".into())
    }

    fn pick_liner(&self) -> Option<PathBuf> {
        let dir = self.liner_dir.as_ref()?;
        let mut wavs: Vec<PathBuf> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
            })
            .collect();
        if wavs.is_empty() {
            return None;
        }
        let pick = rand::thread_rng().gen_range(0..wavs.len());
        Some(wavs.swap_remove(pick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StationError;
    use crate::renderer::MixClip;
    use std::sync::Mutex;

    // ── Fakes ───────────────────────────────────────────────────────────

    struct FakeAudio;
    impl TrackAudio for FakeAudio {
        fn fetch_track_wav(&self, track: &Track) -> Result<PathBuf> {
            Ok(PathBuf::from(format!("/cache/{}-60s.wav", track.id)))
        }
    }

    struct FailingAudio;
    impl TrackAudio for FailingAudio {
        fn fetch_track_wav(&self, _track: &Track) -> Result<PathBuf> {
            Err(StationError::DependencyMissing("no downloader".into()))
        }
    }

    struct FakeSynth {
        fail: bool,
        texts: Mutex<Vec<String>>,
    }
    impl SpeechSynth for FakeSynth {
        fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
            if self.fail {
                return Err(StationError::TtsUnsupportedPayload {
                    keys_seen: vec!["status".into()],
                });
            }
            self.texts.lock().unwrap().push(text.to_string());
            std::fs::write(output, b"RIFF").map_err(StationError::Io)
        }
    }

    /// A media engine that writes marker files and reports 2.0 s for
    /// everything, so builds run without ffmpeg.
    struct FakeMedia;
    impl MediaEngine for FakeMedia {
        fn render_mix(&self, _clips: &[MixClip], output: &Path, _master: bool) -> Result<()> {
            std::fs::write(output, b"RIFF").map_err(StationError::Io)
        }
        fn edge_fades(&self, _i: &Path, output: &Path, _fi: f64, _fo: f64) -> Result<()> {
            std::fs::write(output, b"RIFF").map_err(StationError::Io)
        }
        fn voice_chain(&self, _i: &Path, output: &Path) -> Result<()> {
            std::fs::write(output, b"RIFF").map_err(StationError::Io)
        }
        fn silence(&self, output: &Path, _secs: f64) -> Result<()> {
            std::fs::write(output, b"RIFF").map_err(StationError::Io)
        }
        fn duration_secs(&self, _path: &Path) -> f64 {
            2.0
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.into(),
            title: id.to_uppercase(),
            artist: "Artist".into(),
            url: "u".into(),
            duration_sec: 180,
            tags: vec![],
            energy: 0.5,
            mood: "neutral".into(),
            language: "en".into(),
        }
    }

    fn builder_with(
        tracks: Vec<Track>,
        cadence: u32,
        dir: &Path,
        synth_fails: bool,
    ) -> SegmentBuilder {
        SegmentBuilder::new(
            tracks,
            cadence,
            dir.to_path_buf(),
            None,
            Arc::new(FakeAudio),
            Arc::new(FakeSynth {
                fail: synth_fails,
                texts: Mutex::new(Vec::new()),
            }),
            Arc::new(FakeMedia),
            CommentaryGenerator::new("", "https://api.openai.com/v1", "m", "Testwave"),
        )
    }

    #[test]
    fn cadence_two_produces_song_song_commentary() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = builder_with(vec![track("t1"), track("t2")], 2, dir.path(), false);

        let s1 = b.build_next().unwrap();
        assert_eq!(s1.kind, SegmentKind::Song);
        assert_eq!(b.phase(), Phase::Songs);
        assert_eq!(b.songs_since_commentary(), 1);

        let s2 = b.build_next().unwrap();
        assert_eq!(s2.kind, SegmentKind::Song);
        assert_eq!(b.phase(), Phase::Commentary);
        assert_eq!(b.songs_since_commentary(), 2);

        // Both catalog tracks played exactly once before the break.
        assert_ne!(s1.note, s2.note);

        let s3 = b.build_next().unwrap();
        assert_eq!(s3.kind, SegmentKind::Commentary);
        assert_eq!(b.phase(), Phase::Songs);
        assert_eq!(b.songs_since_commentary(), 0);
    }

    #[test]
    fn song_segments_carry_auto_defaults_and_measured_duration() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = builder_with(vec![track("t1")], 2, dir.path(), false);
        let seg = b.build_next().unwrap();
        assert_eq!(seg.priority, crate::segment::PRIORITY_AUTO);
        assert!(!seg.pinned);
        assert_eq!(seg.duration_secs, 2.0);
        assert!(seg.path.to_string_lossy().contains("song-faded-"));
    }

    #[test]
    fn commentary_with_empty_key_uses_fallback_text_and_stays_commentary() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = builder_with(vec![track("t1"), track("t2")], 1, dir.path(), false);
        b.build_next().unwrap(); // song flips the phase at cadence 1
        let seg = b.build_next().unwrap();
        assert_eq!(seg.kind, SegmentKind::Commentary);
        let text = seg.commentary_text.unwrap();
        assert!(text.starts_with("That was "));
        assert!(text.ends_with("You are listening to Testwave."));
    }

    #[test]
    fn failed_tts_degrades_to_silence_liner() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = builder_with(vec![track("t1")], 1, dir.path(), true);
        b.build_next().unwrap();
        let seg = b.build_next().unwrap();
        assert_eq!(seg.kind, SegmentKind::Liner);
        assert_eq!(seg.duration_secs, 3.0);
        assert!(seg.path.to_string_lossy().contains("talk-liner-"));
        // The failure still flips the phase and resets the counter.
        assert_eq!(b.phase(), Phase::Songs);
        assert_eq!(b.songs_since_commentary(), 0);
    }

    #[test]
    fn failed_tts_prefers_a_recorded_liner_when_available() {
        let dir = tempfile::tempdir().unwrap();
        let liners = tempfile::tempdir().unwrap();
        std::fs::write(liners.path().join("sweep.wav"), b"RIFF").unwrap();

        let mut b = SegmentBuilder::new(
            vec![track("t1")],
            1,
            dir.path().to_path_buf(),
            Some(liners.path().to_path_buf()),
            Arc::new(FakeAudio),
            Arc::new(FakeSynth {
                fail: true,
                texts: Mutex::new(Vec::new()),
            }),
            Arc::new(FakeMedia),
            CommentaryGenerator::new("", "https://api.openai.com/v1", "m", "Testwave"),
        );
        b.build_next().unwrap();
        let seg = b.build_next().unwrap();
        assert_eq!(seg.kind, SegmentKind::Liner);
        assert!(seg.path.to_string_lossy().ends_with("sweep.wav"));
    }

    #[test]
    fn cache_failure_propagates_from_song_builds() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = SegmentBuilder::new(
            vec![track("t1")],
            2,
            dir.path().to_path_buf(),
            None,
            Arc::new(FailingAudio),
            Arc::new(FakeSynth {
                fail: false,
                texts: Mutex::new(Vec::new()),
            }),
            Arc::new(FakeMedia),
            CommentaryGenerator::new("", "https://api.openai.com/v1", "m", "Testwave"),
        );
        assert!(b.build_next().is_err());
    }

    #[test]
    fn rotation_covers_the_catalog_before_repeating() {
        let dir = tempfile::tempdir().unwrap();
        let tracks: Vec<Track> = (0..5).map(|i| track(&format!("t{}", i))).collect();
        let mut b = builder_with(tracks, 100, dir.path(), false);

        let mut first_pass: Vec<String> = Vec::new();
        for _ in 0..5 {
            first_pass.push(b.build_next().unwrap().note);
        }
        first_pass.sort();
        first_pass.dedup();
        assert_eq!(first_pass.len(), 5, "each track plays once per rotation");
    }

    #[test]
    fn reshuffle_never_repeats_the_previous_track_first() {
        let dir = tempfile::tempdir().unwrap();
        let tracks: Vec<Track> = (0..4).map(|i| track(&format!("t{}", i))).collect();
        let mut b = builder_with(tracks, 1000, dir.path(), false);

        let mut previous = String::new();
        for i in 0..40 {
            let note = b.build_next().unwrap().note;
            if i > 0 {
                assert_ne!(note, previous, "immediate repeat across rotations");
            }
            previous = note;
        }
    }

    #[test]
    fn last_played_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let tracks: Vec<Track> = (0..8).map(|i| track(&format!("t{}", i))).collect();
        let mut b = builder_with(tracks, 1000, dir.path(), false);
        for _ in 0..8 {
            b.build_next().unwrap();
        }
        assert_eq!(b.last_played().len(), LAST_PLAYED_MAX);
    }
}
