use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::models::verdict::{AnalysisVerdict, FreshnessLevel};

const VEGETABLE_NAME_KEYS: &[&str] = &[
    "vegetableName",
    "Vegetable Name",
    "VegetableName",
    "vegetable_name",
];
const SAFE_TO_EAT_KEYS: &[&str] = &["safeToEat", "Safe to Eat", "Safe To Eat", "SafeToEat", "safe_to_eat"];
const DISEASE_NAME_KEYS: &[&str] = &["diseaseName", "Disease Name", "DiseaseName", "disease_name"];
const RECOMMENDATION_KEYS: &[&str] = &["recommendation", "Recommendation"];
const FRESHNESS_LEVEL_KEYS: &[&str] = &[
    "freshnessLevel",
    "Freshness Level",
    "FreshnessLevel",
    "freshness_level",
];
const FRESHNESS_SCORE_KEYS: &[&str] = &[
    "freshnessScore",
    "Freshness Score",
    "FreshnessScore",
    "freshness_score",
];

static VEGETABLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Vegetable Name\s*:?\s*([^:\s][^\n]*)").expect("valid regex"));
static SAFE_TO_EAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Safe to Eat:?\s*(true|false|yes|no)").expect("valid regex"));
static DISEASE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Disease Name\s*:?\s*([^:\s][^\n]*)").expect("valid regex"));
static RECOMMENDATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Recommendation\s*:?\s*([^:\s][^\n]*(?:\n[^\n]+)*)").expect("valid regex")
});
static FRESHNESS_LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Freshness Level:?\s*(GOOD|ACCEPTABLE|NOT[_ ]RECOMMENDED)").expect("valid regex")
});
static FRESHNESS_SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Freshness Score:?\s*(\d+)").expect("valid regex"));

/// Fields recovered from raw output. `None` means "not found".
#[derive(Debug, Default, PartialEq)]
struct ExtractedFields {
    vegetable_name: Option<String>,
    safe_to_eat: Option<bool>,
    disease_name: Option<String>,
    recommendation: Option<String>,
    freshness_level: Option<FreshnessLevel>,
    freshness_score: Option<u8>,
}

/// Normalize raw model text. Never fails.
///
/// The first `{...}` span is tried as JSON; otherwise labelled lines are
/// pulled out with regular expressions. Missing fields take the defaults.
pub fn normalize(raw: &str) -> AnalysisVerdict {
    let fields = extract_structured(raw).unwrap_or_else(|| {
        tracing::debug!("No parseable JSON object in model output, falling back to line extraction");
        extract_from_text(raw)
    });
    merge(fields)
}

/// Normalize a worker result, which may be a JSON object or a JSON string.
pub fn normalize_value(value: &Value) -> AnalysisVerdict {
    match value {
        Value::String(text) => normalize(text),
        Value::Object(map) => merge(fields_from_object(map)),
        other => normalize(&other.to_string()),
    }
}

/// Parse the span between the first `{` and the last `}` as a JSON object.
fn extract_structured(raw: &str) -> Option<ExtractedFields> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(map)) => Some(fields_from_object(&map)),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Model output JSON span failed to parse");
            None
        }
    }
}

fn fields_from_object(map: &Map<String, Value>) -> ExtractedFields {
    ExtractedFields {
        vegetable_name: lookup(map, VEGETABLE_NAME_KEYS).and_then(value_to_string),
        safe_to_eat: lookup(map, SAFE_TO_EAT_KEYS).map(coerce_bool),
        disease_name: lookup(map, DISEASE_NAME_KEYS)
            .and_then(value_to_string)
            .and_then(non_empty_disease),
        recommendation: lookup(map, RECOMMENDATION_KEYS).and_then(value_to_string),
        freshness_level: lookup(map, FRESHNESS_LEVEL_KEYS)
            .and_then(value_to_string)
            .map(|s| FreshnessLevel::from_loose(&s)),
        freshness_score: lookup(map, FRESHNESS_SCORE_KEYS).and_then(coerce_score),
    }
}

/// First usable value among the key spellings. Nulls and blank strings are
/// skipped so a later spelling can still supply the field.
fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("yes")
        }
        _ => false,
    }
}

fn coerce_score(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?.round() as i64,
        _ => return None,
    };
    Some(clamp_score(score))
}

fn clamp_score(score: i64) -> u8 {
    score.clamp(0, 100) as u8
}

fn non_empty_disease(name: String) -> Option<String> {
    let trimmed = name.trim();
    let lowered = trimmed.to_lowercase();
    if trimmed.is_empty() || matches!(lowered.as_str(), "none" | "null" | "n/a") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Labelled-line extraction for output that is not JSON at all.
fn extract_from_text(text: &str) -> ExtractedFields {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };

    ExtractedFields {
        vegetable_name: capture(&VEGETABLE_NAME_RE).filter(|s| !s.is_empty()),
        safe_to_eat: capture(&SAFE_TO_EAT_RE).map(|s| {
            let s = s.to_lowercase();
            s == "true" || s == "yes"
        }),
        disease_name: capture(&DISEASE_NAME_RE).and_then(non_empty_disease),
        recommendation: capture(&RECOMMENDATION_RE).filter(|s| !s.is_empty()),
        freshness_level: capture(&FRESHNESS_LEVEL_RE).map(|s| FreshnessLevel::from_loose(&s)),
        freshness_score: capture(&FRESHNESS_SCORE_RE)
            .and_then(|s| s.parse::<i64>().ok())
            .map(clamp_score),
    }
}

fn merge(fields: ExtractedFields) -> AnalysisVerdict {
    let defaults = AnalysisVerdict::default();
    AnalysisVerdict {
        vegetable_name: fields.vegetable_name.unwrap_or(defaults.vegetable_name),
        safe_to_eat: fields.safe_to_eat.unwrap_or(defaults.safe_to_eat),
        disease_name: fields.disease_name,
        recommendation: fields.recommendation.unwrap_or(defaults.recommendation),
        freshness_level: fields.freshness_level.unwrap_or(defaults.freshness_level),
        freshness_score: fields.freshness_score.unwrap_or(defaults.freshness_score),
    }
}
