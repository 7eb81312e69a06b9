//! Headless integration tests for airwave.
//!
//! These exercise the `Station` facade end-to-end with fake collaborators
//! standing in for ffmpeg, yt-dlp, the TTS service, and the RTMP endpoint,
//! so everything here runs under `cargo test` alone. The sink tests at the
//! bottom drive the real FIFO plumbing against shell-script stand-ins.

use airwave::builder::{SpeechSynth, TrackAudio};
use airwave::config::Config;
use airwave::error::{Result, StationError};
use airwave::renderer::{MediaEngine, MixClip};
use airwave::segment::{SegmentKind, SegmentSource};
use airwave::sink::{Output, RtmpSink, SinkEvent};
use airwave::station::{SkipOutcome, Station};
use airwave::track::Track;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ─────────────────────────────────────────────────────────────────

struct FakeAudio;
impl TrackAudio for FakeAudio {
    fn fetch_track_wav(&self, track: &Track) -> Result<PathBuf> {
        Ok(PathBuf::from(format!("/cache/{}-60s.wav", track.id)))
    }
}

struct FakeSynth;
impl SpeechSynth for FakeSynth {
    fn synthesize(&self, _text: &str, output: &Path) -> Result<()> {
        std::fs::write(output, b"RIFF").map_err(StationError::Io)
    }
}

/// Marker-file media engine: every render writes a stub and every probe
/// reads 2 seconds.
struct FakeMedia;
impl MediaEngine for FakeMedia {
    fn render_mix(&self, _clips: &[MixClip], output: &Path, _master: bool) -> Result<()> {
        std::fs::write(output, b"RIFF").map_err(StationError::Io)
    }
    fn edge_fades(&self, _input: &Path, output: &Path, _fi: f64, _fo: f64) -> Result<()> {
        std::fs::write(output, b"RIFF").map_err(StationError::Io)
    }
    fn voice_chain(&self, _input: &Path, output: &Path) -> Result<()> {
        std::fs::write(output, b"RIFF").map_err(StationError::Io)
    }
    fn silence(&self, output: &Path, _secs: f64) -> Result<()> {
        std::fs::write(output, b"RIFF").map_err(StationError::Io)
    }
    fn duration_secs(&self, _path: &Path) -> f64 {
        2.0
    }
}

/// Records every pushed file and paces pushes a little, standing in for
/// the pipe's real-time backpressure.
#[derive(Default)]
struct RecordingOutput {
    pushed: Mutex<Vec<PathBuf>>,
}

impl Output for RecordingOutput {
    fn start(&self) -> Result<()> {
        Ok(())
    }
    fn push_file(&self, path: &Path) -> Result<()> {
        self.pushed.lock().unwrap().push(path.to_path_buf());
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    }
    fn abort_current(&self) -> bool {
        false
    }
    fn stop(&self) {}
    fn is_running(&self) -> bool {
        true
    }
}

// ── Harness ───────────────────────────────────────────────────────────────

fn write_catalog(dir: &Path, tracks: usize) -> PathBuf {
    let entries: Vec<serde_json::Value> = (0..tracks)
        .map(|i| {
            serde_json::json!({
                "id": format!("t{}", i),
                "title": format!("Track {}", i),
                "artist": "Fake Artist",
                "url": format!("https://yt/{}", i),
                "duration_sec": 180,
                "energy": 0.5,
            })
        })
        .collect();
    let path = dir.join("catalog.json");
    std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();
    path
}

fn station_config(work_dir: &Path, catalog: &Path, timeline_v2: bool) -> Config {
    let mut vars = HashMap::new();
    vars.insert("WORK_DIR".to_string(), work_dir.display().to_string());
    vars.insert("CATALOG_PATH".to_string(), catalog.display().to_string());
    vars.insert("TARGET_BUFFER_SEC".to_string(), "8".to_string());
    vars.insert("MIN_BUFFER_SEC".to_string(), "2".to_string());
    if timeline_v2 {
        vars.insert("TIMELINE_ENGINE_V2".to_string(), "1".to_string());
    }
    Config::from_vars(&vars)
}

fn fake_station(cfg: Config, output: Arc<dyn Output>) -> Station {
    Station::with_parts(
        cfg,
        Arc::new(FakeAudio),
        Arc::new(FakeSynth),
        Arc::new(FakeMedia),
        output,
    )
}

// ── Lifecycle ─────────────────────────────────────────────────────────────

#[test]
fn start_with_empty_catalog_fails_with_catalog_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = dir.path().join("catalog.json");
    std::fs::write(&catalog, "[]").unwrap();

    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );
    let err = station.start().unwrap_err();
    assert!(matches!(err, StationError::CatalogInvalid(_)));
    assert!(!station.is_running());
}

#[test]
fn start_with_missing_catalog_fails_with_catalog_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let station = fake_station(
        station_config(dir.path(), &dir.path().join("nope.json"), false),
        Arc::new(RecordingOutput::default()),
    );
    assert!(matches!(
        station.start().unwrap_err(),
        StationError::CatalogInvalid(_)
    ));
}

#[test]
fn per_segment_run_builds_pushes_and_orders_lifecycle_events() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 2);
    let output = Arc::new(RecordingOutput::default());
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::clone(&output) as Arc<dyn Output>,
    );

    let mut rx = station.subscribe();
    station.start().unwrap();
    assert!(station.is_running());

    // Collect events while the engine runs, draining so the channel never
    // lags.
    let mut events: Vec<(String, serde_json::Value)> = Vec::new();
    for _ in 0..30 {
        std::thread::sleep(Duration::from_millis(100));
        while let Ok(evt) = rx.try_recv() {
            events.push((evt.event, evt.payload));
        }
    }
    station.stop();
    assert!(!station.is_running());

    // Something was built and pushed.
    assert!(!output.pushed.lock().unwrap().is_empty());
    let snap = station.snapshot();
    assert_eq!(snap.tracks_loaded, 2);
    assert!(snap.counters.segments_built > 0);

    // Per-segment lifecycle order: enqueued before started before finished,
    // no duplicates.
    let mut per_segment: HashMap<String, Vec<&str>> = HashMap::new();
    for (event, payload) in &events {
        if let Some(stripped) = event.strip_prefix("segment.") {
            if let Some(id) = payload.get("id").and_then(|v| v.as_str()) {
                per_segment.entry(id.to_string()).or_default().push(stripped);
            }
        }
    }
    assert!(!per_segment.is_empty());
    for (id, seq) in per_segment {
        let filtered: Vec<&&str> = seq
            .iter()
            .filter(|s| matches!(**s, "enqueued" | "started" | "finished"))
            .collect();
        let expected = ["enqueued", "started", "finished"];
        assert!(
            filtered.len() <= 3
                && filtered
                    .iter()
                    .zip(expected.iter())
                    .all(|(have, want)| **have == *want),
            "segment {} saw lifecycle {:?}",
            id,
            seq
        );
    }

    // Buffered seconds never read negative anywhere we observed them.
    for (event, payload) in &events {
        if event == "state.updated" {
            if let Some(buffered) = payload.get("bufferedSec").and_then(|v| v.as_f64()) {
                assert!(buffered >= 0.0);
            }
        }
    }
}

#[test]
fn timeline_mode_renders_chunks_and_rejects_skip() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 2);
    let output = Arc::new(RecordingOutput::default());
    let station = fake_station(
        station_config(dir.path(), &catalog, true),
        Arc::clone(&output) as Arc<dyn Output>,
    );

    station.start().unwrap();
    std::thread::sleep(Duration::from_millis(1500));

    assert_eq!(station.skip(), SkipOutcome::Unsupported);

    station.stop();

    let pushed = output.pushed.lock().unwrap();
    assert!(!pushed.is_empty());
    assert!(pushed
        .iter()
        .all(|p| p.file_name().unwrap().to_string_lossy().starts_with("engine-chunk-")));
}

#[test]
fn skip_reports_by_mode_and_run_state() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 2);
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );

    assert_eq!(station.skip(), SkipOutcome::NotRunning);
    station.start().unwrap();
    assert_eq!(station.skip(), SkipOutcome::Skipped);
    station.stop();
    assert_eq!(station.skip(), SkipOutcome::NotRunning);
}

// ── Queue through the facade ──────────────────────────────────────────────

#[test]
fn manual_commentary_is_pinned_at_120() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 1);
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );

    let seg = station
        .enqueue_manual_commentary("Big shout-out to the night shift")
        .unwrap();
    assert_eq!(seg.kind, SegmentKind::Commentary);
    assert_eq!(seg.source, SegmentSource::Manual);
    assert_eq!(seg.priority, 120);
    assert!(seg.pinned);

    let queue = station.queue_views();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].segment.id, seg.id);
}

#[test]
fn manual_track_is_pinned_at_110() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 1);
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );

    let seg = station
        .enqueue_manual_track("Rare Groove", Some("Crate Digger"), "https://yt/rare")
        .unwrap();
    assert_eq!(seg.kind, SegmentKind::Song);
    assert_eq!(seg.priority, 110);
    assert!(seg.pinned);
    assert_eq!(seg.note, "Rare Groove — Crate Digger");
}

#[test]
fn empty_commentary_text_is_rejected_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 1);
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );
    assert!(station.enqueue_manual_commentary("   ").is_err());
    assert!(station.queue_views().is_empty());
}

#[test]
fn enqueue_then_remove_restores_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 1);
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );

    let seg = station.enqueue_manual_commentary("one-off").unwrap();
    assert_eq!(station.queue_views().len(), 1);
    station.remove_from_queue(&seg.id).unwrap();
    assert!(station.queue_views().is_empty());

    let err = station.remove_from_queue(&seg.id).unwrap_err();
    assert!(matches!(err, StationError::QueueMiss(_)));
}

#[test]
fn queue_update_reorders_manual_items() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 1);
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );

    let low = station.enqueue_manual_commentary("later").unwrap();
    let high = station.enqueue_manual_commentary("sooner").unwrap();
    // Same priority and pin: arrival order holds.
    assert_eq!(station.queue_views()[0].segment.id, low.id);

    station
        .update_queue_item(&high.id, Some(180), None)
        .unwrap();
    assert_eq!(station.queue_views()[0].segment.id, high.id);

    // Applying the same patch twice changes nothing further.
    station
        .update_queue_item(&high.id, Some(180), None)
        .unwrap();
    assert_eq!(station.queue_views()[0].segment.id, high.id);
}

#[test]
fn timeline_snapshot_carries_arbitration_reasons() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 1);
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );

    let seg = station.enqueue_manual_commentary("pinned break").unwrap();
    let snap = station.timeline_snapshot();
    assert_eq!(snap.arbitration.len(), 1);
    assert_eq!(snap.arbitration[0].segment_id, seg.id);

    let rebuilt = station.rebuild_timeline().unwrap();
    assert_eq!(rebuilt.arbitration.len(), 1);
}

#[test]
fn media_paths_resolve_queued_segments_only_inside_allowed_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = write_catalog(dir.path(), 1);
    let station = fake_station(
        station_config(dir.path(), &catalog, false),
        Arc::new(RecordingOutput::default()),
    );

    let seg = station.enqueue_manual_commentary("find me").unwrap();
    let path = station.media_path(&seg.id).expect("queued segment resolves");
    assert!(path.exists());
    assert!(station.media_path("ghost").is_none());

    assert!(station.checked_media_path(&path.display().to_string()).is_ok());
    assert!(station.checked_media_path("/etc/hostname").is_err());
}

// ── Real sink plumbing against shell stand-ins ────────────────────────────

#[cfg(unix)]
mod sink_plumbing {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable stand-in for ffmpeg. As the ingest (args end in
    /// an flv push) it drains the pipe; as the transcode it copies the
    /// input to stdout, then optionally lingers so aborts have something
    /// to kill.
    fn write_ffmpeg_stub(dir: &Path, linger_secs: u32) -> PathBuf {
        let path = dir.join("fake-ffmpeg.sh");
        let script = format!(
            "#!/bin/sh\n\
             input=\"\"\n\
             prev=\"\"\n\
             for a in \"$@\"; do\n\
             \t[ \"$prev\" = \"-i\" ] && input=\"$a\"\n\
             \tprev=\"$a\"\n\
             done\n\
             case \"$*\" in\n\
             \t*\"-f flv\"*) exec cat \"$input\" > /dev/null ;;\n\
             \t*) cat \"$input\"; sleep {} > /dev/null 2>&1 ;;\n\
             esac\n",
            linger_secs
        );
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn collecting_sink(dir: &Path, stub: &Path) -> (RtmpSink, Arc<Mutex<Vec<String>>>) {
        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let sink = RtmpSink::new(
            dir.join("live.pcm"),
            "rtmp://localhost:1935/live/radio".to_string(),
            stub.display().to_string(),
            Arc::new(move |event| {
                let name = match event {
                    SinkEvent::Started { .. } => "started".to_string(),
                    SinkEvent::IngestLine(_) => "line".to_string(),
                    SinkEvent::IngestExited(code) => format!("exited:{:?}", code),
                    SinkEvent::Stopped => "stopped".to_string(),
                };
                sink_events.lock().unwrap().push(name);
            }),
        );
        (sink, events)
    }

    #[test]
    fn sink_pushes_a_file_through_the_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_ffmpeg_stub(dir.path(), 0);
        let wav = dir.path().join("clip.wav");
        std::fs::write(&wav, vec![0u8; 4096]).unwrap();

        let (sink, events) = collecting_sink(dir.path(), &stub);
        sink.start().unwrap();
        sink.push_file(&wav).unwrap();
        sink.stop();

        let events = events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("started"));
        assert!(events.iter().any(|e| e == "stopped"));
    }

    #[test]
    fn aborting_an_in_flight_transcode_rejects_the_push() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_ffmpeg_stub(dir.path(), 30);
        let wav = dir.path().join("clip.wav");
        std::fs::write(&wav, vec![0u8; 1024]).unwrap();

        let (sink, _) = collecting_sink(dir.path(), &stub);
        let sink = Arc::new(sink);
        sink.start().unwrap();

        let pusher = Arc::clone(&sink);
        let pushed = std::thread::spawn(move || pusher.push_file(&wav));

        std::thread::sleep(Duration::from_millis(400));
        assert!(sink.abort_current(), "a transcode should be in flight");

        let result = pushed.join().unwrap();
        assert!(result.is_err(), "aborted push must reject");
        sink.stop();
    }

    #[test]
    fn second_abort_finds_nothing_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_ffmpeg_stub(dir.path(), 0);
        let (sink, _) = collecting_sink(dir.path(), &stub);
        sink.start().unwrap();
        assert!(!sink.abort_current());
        sink.stop();
    }
}
