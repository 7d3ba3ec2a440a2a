use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Vegetable name the model returns when the photo is not food.
pub const INVALID_IMAGE: &str = "invalid_image";

pub const DEFAULT_VEGETABLE_NAME: &str = "Unknown";
pub const DEFAULT_RECOMMENDATION: &str = "No recommendation available.";

pub const DEGRADED_VEGETABLE_NAME: &str = "Analysis Failed";
pub const DEGRADED_RECOMMENDATION: &str =
    "Unable to analyze image with LLM. Please try again later or contact support.";

/// Freshness grade reported by the model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
pub enum FreshnessLevel {
    #[serde(rename = "GOOD")]
    #[strum(serialize = "GOOD")]
    Good,
    #[serde(rename = "ACCEPTABLE")]
    #[strum(serialize = "ACCEPTABLE")]
    Acceptable,
    #[serde(rename = "NOT_RECOMMENDED")]
    #[strum(serialize = "NOT_RECOMMENDED")]
    NotRecommended,
    #[default]
    #[serde(rename = "Unknown")]
    #[strum(serialize = "Unknown")]
    Unknown,
}

impl FreshnessLevel {
    /// Lenient token parsing: case-insensitive, spaces and hyphens read as
    /// underscores. Anything unrecognised is `Unknown`.
    pub fn from_loose(raw: &str) -> Self {
        raw.trim()
            .to_uppercase()
            .replace([' ', '-'], "_")
            .parse()
            .unwrap_or_default()
    }
}

/// Which stage of the fallback chain produced a verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, IntoStaticStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisSource {
    Worker,
    Direct,
    Degraded,
}

/// Normalized analysis result. Every field is always populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisVerdict {
    pub vegetable_name: String,
    pub safe_to_eat: bool,
    pub disease_name: Option<String>,
    pub recommendation: String,
    pub freshness_level: FreshnessLevel,
    pub freshness_score: u8,
}

impl Default for AnalysisVerdict {
    fn default() -> Self {
        Self {
            vegetable_name: DEFAULT_VEGETABLE_NAME.to_string(),
            safe_to_eat: false,
            disease_name: None,
            recommendation: DEFAULT_RECOMMENDATION.to_string(),
            freshness_level: FreshnessLevel::Unknown,
            freshness_score: 0,
        }
    }
}

impl AnalysisVerdict {
    /// The fixed answer returned when no analysis path succeeded.
    pub fn degraded() -> Self {
        Self {
            vegetable_name: DEGRADED_VEGETABLE_NAME.to_string(),
            recommendation: DEGRADED_RECOMMENDATION.to_string(),
            ..Self::default()
        }
    }

    /// True when the model decided the photo does not show a vegetable.
    pub fn is_invalid_image(&self) -> bool {
        self.vegetable_name == INVALID_IMAGE
    }

    pub fn is_degraded(&self) -> bool {
        self.vegetable_name == DEGRADED_VEGETABLE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_level_loose_tokens() {
        assert_eq!(FreshnessLevel::from_loose("good"), FreshnessLevel::Good);
        assert_eq!(
            FreshnessLevel::from_loose(" not recommended "),
            FreshnessLevel::NotRecommended
        );
        assert_eq!(
            FreshnessLevel::from_loose("Not-Recommended"),
            FreshnessLevel::NotRecommended
        );
        assert_eq!(FreshnessLevel::from_loose("stale"), FreshnessLevel::Unknown);
    }

    #[test]
    fn test_verdict_serializes_camel_case() {
        let verdict = AnalysisVerdict {
            freshness_level: FreshnessLevel::NotRecommended,
            ..AnalysisVerdict::default()
        };
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["vegetableName"], "Unknown");
        assert_eq!(json["freshnessLevel"], "NOT_RECOMMENDED");
        assert!(json["diseaseName"].is_null());
    }

    #[test]
    fn test_degraded_verdict_is_fail_closed() {
        let verdict = AnalysisVerdict::degraded();
        assert!(verdict.is_degraded());
        assert!(!verdict.safe_to_eat);
        assert_eq!(verdict.freshness_score, 0);
        assert_eq!(verdict.freshness_level.to_string(), "Unknown");
    }
}
