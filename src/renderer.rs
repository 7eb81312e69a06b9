//! Mix rendering — ffmpeg filter-graph builder + runners.
//!
//! All mixing is delegated to ffmpeg: each render call builds one invocation
//! with a `-filter_complex` graph (trim, delay, fades, gain envelopes, sum)
//! and produces a 48 kHz stereo 16-bit WAV. The argument builders are pure
//! so the graph shape is unit-testable without ffmpeg installed.

use crate::error::{Result, StationError};
use crate::process::run_tool;
use std::path::{Path, PathBuf};

pub const SAMPLE_RATE: u32 = 48_000;

/// A linear gain ramp from `from` to `to` over the first `ramp_secs` of the
/// clip, holding `to` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GainRamp {
    pub from: f64,
    pub to: f64,
    pub ramp_secs: f64,
}

/// One input to a mix: a source window of a file, delayed onto the output
/// timeline, with an optional fade and gain envelope.
#[derive(Debug, Clone)]
pub struct MixClip {
    pub path: PathBuf,
    /// Where on the output timeline this clip begins.
    pub start_offset_secs: f64,
    /// Offset into the source file.
    pub source_offset_secs: f64,
    /// Source window length. None = to end of file.
    pub duration_secs: Option<f64>,
    /// Constant gain. Ignored when `ramp` is set.
    pub gain: f64,
    pub ramp: Option<GainRamp>,
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
}

impl MixClip {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MixClip {
            path: path.into(),
            start_offset_secs: 0.0,
            source_offset_secs: 0.0,
            duration_secs: None,
            gain: 1.0,
            ramp: None,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
        }
    }
}

// ── Filter graph builders ────────────────────────────────────────────────────

/// Build the complete ffmpeg argument list that mixes `clips` into `output`.
/// Returns a `Vec<String>` ready for `Command::new(ffmpeg).args(...)`.
///
/// The sum uses `duration=longest` and no amix normalization; per-clip
/// envelopes carry all level decisions. With `master` set, the sum runs
/// through a loudness-normalize + compressor + limiter chain.
pub fn build_mix_args(clips: &[MixClip], output: &Path, master: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

    for clip in clips {
        args.push("-i".into());
        args.push(clip.path.to_string_lossy().to_string());
    }

    let mut graph: Vec<String> = Vec::new();
    for (i, clip) in clips.iter().enumerate() {
        graph.push(format!("[{}:a]{}[c{}]", i, clip_filter_chain(clip), i));
    }

    let inputs: String = (0..clips.len()).map(|i| format!("[c{}]", i)).collect();
    graph.push(format!(
        "{}amix=inputs={}:duration=longest:normalize=0[mix]",
        inputs,
        clips.len()
    ));

    if master {
        graph.push(format!("[mix]{}[out]", master_chain()));
    } else {
        graph.push("[mix]anull[out]".into());
    }

    args.push("-filter_complex".into());
    args.push(graph.join(";"));
    args.push("-map".into());
    args.push("[out]".into());
    push_wav_output(&mut args, output);
    args
}

/// Per-clip chain: source trim, fades, gain envelope, timeline delay.
fn clip_filter_chain(clip: &MixClip) -> String {
    let mut filters: Vec<String> = Vec::new();

    if clip.source_offset_secs > 0.0001 || clip.duration_secs.is_some() {
        let trim = match clip.duration_secs {
            Some(dur) => format!(
                "atrim=start={:.6}:end={:.6}",
                clip.source_offset_secs,
                clip.source_offset_secs + dur
            ),
            None => format!("atrim=start={:.6}", clip.source_offset_secs),
        };
        filters.push(trim);
        filters.push("asetpts=PTS-STARTPTS".into());
    }

    if clip.fade_in_secs > 0.001 {
        filters.push(format!("afade=t=in:st=0:d={:.3}", clip.fade_in_secs));
    }
    if clip.fade_out_secs > 0.001 {
        if let Some(dur) = clip.duration_secs {
            let st = (dur - clip.fade_out_secs).max(0.0);
            filters.push(format!("afade=t=out:st={:.3}:d={:.3}", st, clip.fade_out_secs));
        }
    }

    match clip.ramp {
        Some(ramp) if ramp.ramp_secs > 0.001 && (ramp.from - ramp.to).abs() > 0.0001 => {
            filters.push(format!(
                "volume='{:.4}+({:.4}-{:.4})*min(t/{:.4},1)':eval=frame",
                ramp.from, ramp.to, ramp.from, ramp.ramp_secs
            ));
        }
        Some(ramp) => {
            if (ramp.to - 1.0).abs() > 0.0001 {
                filters.push(format!("volume={:.4}", ramp.to));
            }
        }
        None => {
            if (clip.gain - 1.0).abs() > 0.0001 {
                filters.push(format!("volume={:.4}", clip.gain));
            }
        }
    }

    if clip.start_offset_secs > 0.0001 {
        let ms = (clip.start_offset_secs * 1000.0).round() as i64;
        filters.push(format!("adelay={}|{}", ms, ms));
    }

    // Everything mixes at the output format.
    filters.push(format!("aresample={}", SAMPLE_RATE));

    filters.join(",")
}

/// Broadcast mastering: loudness target, glue compression, brickwall.
fn master_chain() -> String {
    "loudnorm=I=-14:TP=-1.5:LRA=11,\
     acompressor=threshold=-18dB:ratio=3:attack=20:release=250,\
     alimiter=limit=0.95"
        .to_string()
}

/// Edge fades for a song segment: short fade-in, longer fade-out. Needs the
/// total duration to place the fade-out.
pub fn build_edge_fade_args(
    input: &Path,
    output: &Path,
    fade_in_secs: f64,
    fade_out_secs: f64,
    total_duration_secs: f64,
) -> Vec<String> {
    let mut filters: Vec<String> = Vec::new();
    if fade_in_secs > 0.001 {
        filters.push(format!("afade=t=in:st=0:d={:.3}", fade_in_secs));
    }
    if fade_out_secs > 0.001 && total_duration_secs > fade_out_secs {
        let st = total_duration_secs - fade_out_secs;
        filters.push(format!("afade=t=out:st={:.3}:d={:.3}", st, fade_out_secs));
    }

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
    ];
    if !filters.is_empty() {
        args.push("-af".into());
        args.push(filters.join(","));
    }
    push_wav_output(&mut args, output);
    args
}

/// Voice enhancement for synthesized speech: drive the level up, normalize
/// to a speech loudness target, soften the onset.
pub fn build_voice_chain_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
        "-af".into(),
        "volume=1.9,loudnorm=I=-15:TP=-1.5:LRA=11,afade=t=in:st=0:d=0.25".into(),
    ];
    push_wav_output(&mut args, output);
    args
}

/// Generate `secs` of stereo silence.
pub fn build_silence_args(output: &Path, secs: f64) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-f".into(),
        "lavfi".into(),
        "-i".into(),
        format!("anullsrc=r={}:cl=stereo", SAMPLE_RATE),
        "-t".into(),
        format!("{:.3}", secs),
    ];
    push_wav_output(&mut args, output);
    args
}

fn push_wav_output(args: &mut Vec<String>, output: &Path) {
    args.push("-ar".into());
    args.push(SAMPLE_RATE.to_string());
    args.push("-ac".into());
    args.push("2".into());
    args.push("-acodec".into());
    args.push("pcm_s16le".into());
    args.push(output.to_string_lossy().to_string());
}

// ── MediaEngine ──────────────────────────────────────────────────────────────

/// The seam between playout logic and ffmpeg. The production engine shells
/// out; the headless test suite substitutes a fake.
pub trait MediaEngine: Send + Sync {
    /// Mix clips into one WAV. `master` applies the mastering chain.
    fn render_mix(&self, clips: &[MixClip], output: &Path, master: bool) -> Result<()>;
    /// Copy with edge fades applied.
    fn edge_fades(&self, input: &Path, output: &Path, fade_in: f64, fade_out: f64) -> Result<()>;
    /// Apply the voice enhancement chain.
    fn voice_chain(&self, input: &Path, output: &Path) -> Result<()>;
    /// Write a silent WAV of the given length.
    fn silence(&self, output: &Path, secs: f64) -> Result<()>;
    /// Probed duration in seconds, or -1.0 when the file is unreadable.
    fn duration_secs(&self, path: &Path) -> f64;
}

/// ffmpeg/ffprobe-backed engine.
pub struct FfmpegEngine {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegEngine {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        FfmpegEngine {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn run_render(&self, args: Vec<String>) -> Result<()> {
        run_tool(&self.ffmpeg, &args, None)
            .map(|_| ())
            .map_err(|e| StationError::Render(e.to_string()))
    }
}

impl MediaEngine for FfmpegEngine {
    fn render_mix(&self, clips: &[MixClip], output: &Path, master: bool) -> Result<()> {
        if clips.is_empty() {
            return Err(StationError::Render("mix with no input clips".to_string()));
        }
        self.run_render(build_mix_args(clips, output, master))
    }

    fn edge_fades(&self, input: &Path, output: &Path, fade_in: f64, fade_out: f64) -> Result<()> {
        let total = self.duration_secs(input);
        self.run_render(build_edge_fade_args(input, output, fade_in, fade_out, total))
    }

    fn voice_chain(&self, input: &Path, output: &Path) -> Result<()> {
        self.run_render(build_voice_chain_args(input, output))
    }

    fn silence(&self, output: &Path, secs: f64) -> Result<()> {
        self.run_render(build_silence_args(output, secs))
    }

    fn duration_secs(&self, path: &Path) -> f64 {
        probe_duration_secs(&self.ffprobe, path)
    }
}

/// Read a file's duration with ffprobe. Never fails into the caller's happy
/// path: any problem reads as -1.0.
pub fn probe_duration_secs(ffprobe: &str, path: &Path) -> f64 {
    let args: Vec<String> = vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path.to_string_lossy().to_string(),
    ];
    match run_tool(ffprobe, &args, None) {
        Ok(out) => out.stdout.trim().parse::<f64>().unwrap_or(-1.0),
        Err(_) => -1.0,
    }
}
