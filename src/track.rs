use crate::error::{Result, StationError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A catalog entry. Read-only after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Where the audio comes from (a YouTube URL in practice).
    pub url: String,
    /// Nominal duration in whole seconds, from the catalog.
    pub duration_sec: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 0.0 (ambient) .. 1.0 (peak-hour).
    #[serde(default)]
    pub energy: f64,
    #[serde(default = "default_mood")]
    pub mood: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_mood() -> String {
    "neutral".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Track {
    /// "Title — Artist", used in prompts and logs.
    pub fn display(&self) -> String {
        format!("{} — {}", self.title, self.artist)
    }
}

/// Load and validate the catalog file. Fails with `CatalogInvalid` when the
/// file is unreadable, not a JSON array, empty, or contains a bad entry.
pub fn load_catalog(path: &Path) -> Result<Vec<Track>> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        StationError::CatalogInvalid(format!("cannot read '{}': {}", path.display(), e))
    })?;
    let tracks: Vec<Track> = serde_json::from_str(&data)
        .map_err(|e| StationError::CatalogInvalid(format!("parse error: {}", e)))?;
    if tracks.is_empty() {
        return Err(StationError::CatalogInvalid("catalog is empty".to_string()));
    }
    for (i, t) in tracks.iter().enumerate() {
        if t.id.is_empty() {
            return Err(StationError::CatalogInvalid(format!("entry {} has no id", i)));
        }
        if t.duration_sec == 0 {
            return Err(StationError::CatalogInvalid(format!(
                "track '{}' has zero duration",
                t.id
            )));
        }
        if !(0.0..=1.0).contains(&t.energy) {
            return Err(StationError::CatalogInvalid(format!(
                "track '{}' energy {} outside [0, 1]",
                t.id, t.energy
            )));
        }
    }
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_minimal_catalog_with_defaults() {
        let f = write_catalog(
            r#"[{"id":"t1","title":"Night Drive","artist":"Volt","url":"https://yt/x","duration_sec":240}]"#,
        );
        let tracks = load_catalog(f.path()).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].mood, "neutral");
        assert_eq!(tracks[0].language, "en");
        assert!(tracks[0].tags.is_empty());
        assert_eq!(tracks[0].energy, 0.0);
    }

    #[test]
    fn empty_catalog_is_invalid() {
        let f = write_catalog("[]");
        let err = load_catalog(f.path()).unwrap_err();
        assert!(matches!(err, StationError::CatalogInvalid(_)));
    }

    #[test]
    fn zero_duration_is_invalid() {
        let f = write_catalog(
            r#"[{"id":"t1","title":"X","artist":"Y","url":"u","duration_sec":0}]"#,
        );
        assert!(load_catalog(f.path()).is_err());
    }

    #[test]
    fn energy_out_of_range_is_invalid() {
        let f = write_catalog(
            r#"[{"id":"t1","title":"X","artist":"Y","url":"u","duration_sec":60,"energy":1.5}]"#,
        );
        assert!(load_catalog(f.path()).is_err());
    }

    #[test]
    fn missing_file_is_invalid() {
        let err = load_catalog(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(matches!(err, StationError::CatalogInvalid(_)));
    }

    #[test]
    fn display_joins_title_and_artist() {
        let f = write_catalog(
            r#"[{"id":"t1","title":"Night Drive","artist":"Volt","url":"u","duration_sec":60}]"#,
        );
        let tracks = load_catalog(f.path()).unwrap();
        assert_eq!(tracks[0].display(), "Night Drive — Volt");
    }
}
