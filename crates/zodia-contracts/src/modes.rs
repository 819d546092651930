use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

/// Which backend produces the background image. Configured once before any
/// pipeline call and never mutated mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Local gradient renderer. No network, no credential, no cost.
    Free,
    /// Stability text-to-image. Paid, ~$0.05 per image.
    Stability,
    /// OpenAI text-to-image. Paid, ~$0.08 per image.
    OpenAi,
}

impl GenerationMode {
    pub const ALL: [GenerationMode; 3] = [
        GenerationMode::Free,
        GenerationMode::Stability,
        GenerationMode::OpenAi,
    ];

    /// Filename segment identifying the paid backend. `None` for the free
    /// path, which is exactly how an auditor tells a free image apart from a
    /// billed one.
    pub fn backend_tag(&self) -> Option<&'static str> {
        match self {
            GenerationMode::Free => None,
            GenerationMode::Stability => Some("stability"),
            GenerationMode::OpenAi => Some("openai"),
        }
    }

    /// Constant per-image cost estimate in USD. Reporting only; the pipeline
    /// never enforces a budget.
    pub fn cost_estimate_usd(&self) -> f64 {
        match self {
            GenerationMode::Free => 0.0,
            GenerationMode::Stability => 0.05,
            GenerationMode::OpenAi => 0.08,
        }
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, GenerationMode::Free)
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.backend_tag().unwrap_or("free"))
    }
}

impl FromStr for GenerationMode {
    type Err = GenerationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" | "test" => Ok(GenerationMode::Free),
            "stability" => Ok(GenerationMode::Stability),
            "openai" => Ok(GenerationMode::OpenAi),
            other => Err(GenerationError::Configuration(format!(
                "unknown generation mode '{other}' (expected free, stability or openai)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GenerationMode;

    #[test]
    fn mode_parsing_accepts_known_values() {
        assert_eq!("free".parse::<GenerationMode>().unwrap(), GenerationMode::Free);
        assert_eq!("test".parse::<GenerationMode>().unwrap(), GenerationMode::Free);
        assert_eq!(
            " Stability ".parse::<GenerationMode>().unwrap(),
            GenerationMode::Stability
        );
        assert_eq!(
            "openai".parse::<GenerationMode>().unwrap(),
            GenerationMode::OpenAi
        );
        assert!("dalle".parse::<GenerationMode>().is_err());
    }

    #[test]
    fn backend_tags_match_mode() {
        assert_eq!(GenerationMode::Free.backend_tag(), None);
        assert_eq!(GenerationMode::Stability.backend_tag(), Some("stability"));
        assert_eq!(GenerationMode::OpenAi.backend_tag(), Some("openai"));
    }

    #[test]
    fn only_paid_modes_require_credentials() {
        assert!(!GenerationMode::Free.requires_credential());
        assert!(GenerationMode::Stability.requires_credential());
        assert!(GenerationMode::OpenAi.requires_credential());
    }

    #[test]
    fn free_mode_costs_nothing() {
        assert_eq!(GenerationMode::Free.cost_estimate_usd(), 0.0);
        assert!(GenerationMode::Stability.cost_estimate_usd() > 0.0);
        assert!(
            GenerationMode::OpenAi.cost_estimate_usd()
                > GenerationMode::Stability.cost_estimate_usd()
        );
    }
}
