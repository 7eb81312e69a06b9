//! On-air commentary. Builds a DJ prompt from recent-track context, calls an
//! OpenAI-compatible chat endpoint, and always has a deterministic fallback
//! line so the show never goes silent over an API problem.

use crate::error::{Result, StationError};
use crate::track::Track;
use std::collections::VecDeque;
use std::time::Duration;

/// Outputs kept for phrase-frequency diagnostics.
const HISTORY_MAX: usize = 6;

const SYSTEM_PROMPT: &str = "You are the on-air host of an internet radio \
station. Speak in short, rhythmic, broadcast-ready sentences that flow when \
read aloud. Stay PG-13. Never mention being an AI, never use stage \
directions, and never read out URLs.";

pub struct CommentaryGenerator {
    api_key: String,
    base_url: String,
    model: String,
    station_name: String,
    http: reqwest::blocking::Client,
    history: VecDeque<String>,
}

impl CommentaryGenerator {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        station_name: impl Into<String>,
    ) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        CommentaryGenerator {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            station_name: station_name.into(),
            http,
            history: VecDeque::new(),
        }
    }

    /// Produce the next commentary text. Falls back to the deterministic
    /// line when the key is missing, the call fails, or the reply is empty.
    pub fn generate(&mut self, recent: &[Track], upcoming: Option<&Track>) -> String {
        let text = if self.api_key.is_empty() {
            self.fallback_line(recent.last(), upcoming)
        } else {
            match self.call_llm(&self.user_prompt(recent, upcoming)) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("commentary call failed, using fallback: {}", e);
                    self.fallback_line(recent.last(), upcoming)
                }
            }
        };
        self.remember(&text);
        text
    }

    fn user_prompt(&self, recent: &[Track], upcoming: Option<&Track>) -> String {
        let played = if recent.is_empty() {
            "nothing yet, the show just started".to_string()
        } else {
            recent
                .iter()
                .map(|t| t.display())
                .collect::<Vec<_>>()
                .join("; ")
        };
        let next_desc = upcoming
            .map(|t| t.display())
            .unwrap_or_else(|| "a surprise drop".to_string());
        let vibe = upcoming.map(vibe_tag).unwrap_or("rhythmic momentum");

        format!(
            "Station: {}. Recently played: {}. Coming up next: {}. The vibe \
             of the next track is: {}. Write a 3-5 sentence link from what \
             just played into what comes next.",
            self.station_name, played, next_desc, vibe
        )
    }

    fn call_llm(&self, user_prompt: &str) -> Result<String> {
        let endpoint = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": 1.5,
            "max_tokens": 2000,
        });

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        if !response.status().is_success() {
            return Err(StationError::Commentary(format!(
                "{} returned {}",
                endpoint,
                response.status()
            )));
        }

        let value: serde_json::Value = response.json()?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if content.is_empty() {
            return Err(StationError::Commentary("empty completion".to_string()));
        }
        Ok(content)
    }

    /// The always-available line. Empty slots read naturally on air.
    pub fn fallback_line(&self, last: Option<&Track>, next: Option<&Track>) -> String {
        let last_desc = last
            .map(|t| format!("{} by {}", t.title, t.artist))
            .unwrap_or_else(|| "that last track".to_string());
        let next_desc = next
            .map(|t| format!("{} by {}", t.title, t.artist))
            .unwrap_or_else(|| "our next song".to_string());
        format!(
            "That was {}. Now we roll into {}. You are listening to {}.",
            last_desc, next_desc, self.station_name
        )
    }

    fn remember(&mut self, text: &str) {
        self.history.push_back(text.to_string());
        while self.history.len() > HISTORY_MAX {
            self.history.pop_front();
        }
    }

    /// Recent outputs, oldest first.
    pub fn recent_outputs(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(|s| s.as_str())
    }
}

/// Genre-vibe tag derived from the upcoming track's energy and mood.
pub fn vibe_tag(track: &Track) -> &'static str {
    let mood = track.mood.to_lowercase();
    if track.energy >= 0.8 {
        "high-energy anthem"
    } else if mood.contains("chill") {
        "smooth laid-back"
    } else if mood.contains("dark") || mood.contains("moody") {
        "late-night brooding"
    } else if track.energy <= 0.3 {
        "slow-burn groove"
    } else {
        "rhythmic momentum"
    }
}
