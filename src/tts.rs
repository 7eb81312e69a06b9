//! Text-to-speech adapter. Posts text to the TTS service and materializes
//! the reply (raw audio bytes, a URL, a server-local path, or base64) into
//! a WAV file on disk.

use crate::error::{Result, StationError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The one-of shapes a TTS reply can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum TtsPayload {
    /// Raw audio bytes from an `audio/*` response body.
    Bytes(Vec<u8>),
    /// A URL to fetch the audio from.
    Url(String),
    /// A path on this machine (TTS service co-located).
    LocalPath(PathBuf),
    /// Base64-encoded audio, with or without a data-URI prefix.
    Base64(String),
}

const URL_KEYS: [&str; 4] = ["audio_url", "url", "file_url", "download_url"];
const PATH_KEYS: [&str; 4] = ["audio_path", "file_path", "path", "output_path"];
const BASE64_KEYS: [&str; 4] = ["audio_base64", "wav_base64", "base64", "audio"];

/// Decide what the response body is. `audio/*` bodies are taken verbatim;
/// anything else must be JSON carrying one of the accepted keys, checked in
/// URL → path → base64 priority order.
pub fn classify_response(content_type: Option<&str>, body: &[u8]) -> Result<TtsPayload> {
    if let Some(ct) = content_type {
        if ct.trim().to_ascii_lowercase().starts_with("audio/") {
            return Ok(TtsPayload::Bytes(body.to_vec()));
        }
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| StationError::Tts(format!("non-audio, non-JSON reply: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| StationError::Tts("JSON reply is not an object".to_string()))?;

    let str_field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
            .map(|s| s.to_string())
    };

    if let Some(url) = str_field(&URL_KEYS) {
        return Ok(TtsPayload::Url(url));
    }
    if let Some(path) = str_field(&PATH_KEYS) {
        return Ok(TtsPayload::LocalPath(PathBuf::from(path)));
    }
    if let Some(b64) = str_field(&BASE64_KEYS) {
        return Ok(TtsPayload::Base64(b64));
    }

    Err(StationError::TtsUnsupportedPayload {
        keys_seen: obj.keys().cloned().collect(),
    })
}

/// Strip a `data:audio/wav;base64,` style prefix if present.
fn strip_data_uri(b64: &str) -> &str {
    if b64.starts_with("data:") {
        match b64.find(',') {
            Some(pos) => &b64[pos + 1..],
            None => b64,
        }
    } else {
        b64
    }
}

pub struct TtsClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl TtsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        TtsClient {
            base_url: base_url.into(),
            http,
        }
    }

    /// Synthesize `text` into `output`. Total over all reply shapes.
    pub fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        let endpoint = format!("{}/generate", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()?;

        if !response.status().is_success() {
            return Err(StationError::Tts(format!(
                "{} returned {}",
                endpoint,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.bytes()?;

        let payload = classify_response(content_type.as_deref(), &body)?;
        self.materialize(payload, output)
    }

    /// Turn any payload variant into file bytes at `output`.
    fn materialize(&self, payload: TtsPayload, output: &Path) -> Result<()> {
        match payload {
            TtsPayload::Bytes(bytes) => {
                std::fs::write(output, bytes)?;
            }
            TtsPayload::Url(url) => {
                let body = self.http.get(&url).send()?.error_for_status()?.bytes()?;
                std::fs::write(output, body)?;
            }
            TtsPayload::LocalPath(path) => {
                std::fs::copy(&path, output).map_err(|e| {
                    StationError::Tts(format!("cannot copy '{}': {}", path.display(), e))
                })?;
            }
            TtsPayload::Base64(b64) => {
                let bytes = BASE64
                    .decode(strip_data_uri(&b64).trim())
                    .map_err(|e| StationError::Tts(format!("bad base64 payload: {}", e)))?;
                std::fs::write(output, bytes)?;
            }
        }
        Ok(())
    }
}

impl crate::builder::SpeechSynth for TtsClient {
    fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        TtsClient::synthesize(self, text, output)
    }
}
