use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::PrismError;

/// Which rendering pipeline is active.
///
/// Deserializes through [`FromStr`], so config files and scripts accept the
/// same labels and aliases as the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Mode {
    /// Forward shading against every light.
    #[default]
    #[serde(rename = "naive")]
    Naive,
    /// Forward shading with clustered light culling.
    #[serde(rename = "forward+")]
    ForwardPlus,
    /// G-buffer pass followed by clustered deferred shading.
    #[serde(rename = "clustered deferred")]
    ClusteredDeferred,
}

impl Mode {
    /// Every mode, in selector order.
    pub const ALL: [Mode; 3] = [Mode::Naive, Mode::ForwardPlus, Mode::ClusteredDeferred];

    /// The label shown by the mode selector.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Naive => "naive",
            Mode::ForwardPlus => "forward+",
            Mode::ClusteredDeferred => "clustered deferred",
        }
    }

    /// Selector labels for every mode.
    pub fn labels() -> Vec<String> {
        Self::ALL.iter().map(|m| m.label().to_string()).collect()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Mode {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "naive" => Ok(Mode::Naive),
            "forward+" | "forward-plus" | "forward_plus" | "forwardplus" => Ok(Mode::ForwardPlus),
            "clustered deferred" | "clustered-deferred" | "clustered_deferred" | "deferred" => {
                Ok(Mode::ClusteredDeferred)
            }
            other => Err(PrismError::InvalidArgument(format!(
                "unknown render mode '{}' (expected one of: {})",
                other,
                Mode::labels().join(", ")
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_naive() {
        assert_eq!(Mode::default(), Mode::Naive);
    }

    #[test]
    fn test_labels_parse_back() {
        for mode in Mode::ALL {
            assert_eq!(mode.label().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("Forward-Plus".parse::<Mode>().unwrap(), Mode::ForwardPlus);
        assert_eq!("deferred".parse::<Mode>().unwrap(), Mode::ClusteredDeferred);
        assert_eq!(" NAIVE ".parse::<Mode>().unwrap(), Mode::Naive);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = "raytraced".parse::<Mode>().unwrap_err();
        assert!(err.to_string().contains("raytraced"));
    }
}
