use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Priority ceiling for queued segments.
pub const PRIORITY_MAX: u8 = 200;
/// Default priority for segments the builder produces on its own.
pub const PRIORITY_AUTO: u8 = 50;
/// Default priority for operator-submitted segments without an explicit one.
pub const PRIORITY_MANUAL: u8 = 100;

/// What a rendered segment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Song,
    Commentary,
    /// Pre-recorded filler used when the commentary path fails.
    Liner,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKind::Song => write!(f, "song"),
            SegmentKind::Commentary => write!(f, "commentary"),
            SegmentKind::Liner => write!(f, "liner"),
        }
    }
}

/// Who asked for a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentSource {
    Auto,
    Manual,
}

/// Output lane a clip plays on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Music,
    Voice,
    Jingle,
    Ads,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Music, Channel::Voice, Channel::Jingle, Channel::Ads];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Music => write!(f, "music"),
            Channel::Voice => write!(f, "voice"),
            Channel::Jingle => write!(f, "jingle"),
            Channel::Ads => write!(f, "ads"),
        }
    }
}

/// The lane a segment kind plays on unless overridden.
pub fn default_channel(kind: SegmentKind) -> Channel {
    match kind {
        SegmentKind::Song => Channel::Music,
        SegmentKind::Commentary => Channel::Voice,
        SegmentKind::Liner => Channel::Jingle,
    }
}

/// A produced audio file ready for playout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedSegment {
    pub id: String,
    pub kind: SegmentKind,
    pub path: PathBuf,
    pub duration_secs: f64,
    /// Free-text note shown on the dashboard ("Night Drive — Volt").
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary_text: Option<String>,
    pub source: SegmentSource,
    pub priority: u8,
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    /// Requested start, seconds from stream start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at_secs: Option<f64>,
}

impl RenderedSegment {
    pub fn new(kind: SegmentKind, path: PathBuf, duration_secs: f64, note: String) -> Self {
        RenderedSegment {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            path,
            duration_secs,
            note,
            commentary_text: None,
            source: SegmentSource::Auto,
            priority: PRIORITY_AUTO,
            pinned: false,
            channel: None,
            start_at_secs: None,
        }
    }

    /// The lane this segment plays on.
    pub fn channel(&self) -> Channel {
        self.channel.unwrap_or_else(|| default_channel(self.kind))
    }
}

/// Clamp a requested priority into the valid range.
pub fn clamp_priority(value: i64) -> u8 {
    value.clamp(0, PRIORITY_MAX as i64) as u8
}
