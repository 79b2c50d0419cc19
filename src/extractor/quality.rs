//! Quality hints and the format selector handed to the extraction tool.

use std::fmt;

/// Lowest-quality format with no constraints; every selector ends with it.
const UNCONSTRAINED: &str = "worst";

/// Recognized quality hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityHint {
    Hd720,
    Sd480,
    Best,
    Worst,
    Other,
}

impl QualityHint {
    pub fn parse(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "720p" => Self::Hd720,
            "480p" => Self::Sd480,
            "best" => Self::Best,
            "worst" => Self::Worst,
            _ => Self::Other,
        }
    }
}

/// Ordered list of acceptable format constraints, most preferred first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualitySelector {
    constraints: Vec<String>,
}

impl QualitySelector {
    pub fn for_hint(hint: QualityHint) -> Self {
        let preferred: &[&str] = match hint {
            QualityHint::Hd720 => &[
                "best[height<=720][protocol!*=dash]",
                "best[height<=480][protocol!*=dash]",
                "best[height<=360]",
            ],
            QualityHint::Sd480 => &["best[height<=480][protocol!*=dash]", "best[height<=360]"],
            QualityHint::Best => &["best[protocol!*=dash]"],
            QualityHint::Worst | QualityHint::Other => &[],
        };

        let constraints = preferred
            .iter()
            .copied()
            .chain(std::iter::once(UNCONSTRAINED))
            .map(String::from)
            .collect();

        Self { constraints }
    }

    pub fn from_hint_str(hint: &str) -> Self {
        Self::for_hint(QualityHint::parse(hint))
    }

    pub fn constraints(&self) -> &[String] {
        &self.constraints
    }

    /// Renders the `-f` argument value, e.g. `best[height<=360]/worst`
    pub fn to_format_arg(&self) -> String {
        self.constraints.join("/")
    }
}

impl fmt::Display for QualitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_format_arg())
    }
}
