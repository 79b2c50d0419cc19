use serde::{Deserialize, Serialize};

/// Subset of the tool's `--dump-json` output the service uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default = "unknown_id")]
    pub id: String,
    #[serde(default = "unknown_title")]
    pub title: String,
    /// Seconds; some extractors report fractional values
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn unknown_id() -> String {
    "unknown".to_string()
}

fn unknown_title() -> String {
    "Unknown Title".to_string()
}

impl VideoMetadata {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Whole seconds, truncated
    pub fn duration_secs(&self) -> u64 {
        self.duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.floor() as u64)
            .unwrap_or(0)
    }
}
