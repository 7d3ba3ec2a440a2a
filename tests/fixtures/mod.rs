//! Canned model replies and upload bodies
#![allow(dead_code)]

/// PNG signature plus a few bytes; enough for format sniffing.
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

/// JSON verdict wrapped in chatter and a code fence.
pub const REPLY_WRAPPED_JSON: &str = r#"Sure! Here is my analysis:
```json
{
  "vegetableName": "Tomato",
  "safeToEat": true,
  "diseaseName": null,
  "recommendation": "Eat within 3 days.",
  "freshnessLevel": "GOOD",
  "freshnessScore": 85
}
```
Let me know if you need anything else."#;

/// Plain labelled text, no JSON at all.
pub const REPLY_LABELLED_TEXT: &str = "Vegetable Name: Potato
Safe to Eat: no
Disease Name: Late blight
Recommendation: Discard the affected tubers.
Keep the rest dry.

Freshness Level: NOT RECOMMENDED
Freshness Score: 15";

pub const REPLY_NOT_A_VEGETABLE: &str = r#"{"vegetableName": "invalid_image", "safeToEat": false, "recommendation": "The photo shows a laptop."}"#;

/// Verdict a worker peer sends back as its `task_result`.
pub fn worker_verdict() -> serde_json::Value {
    serde_json::json!({
        "vegetableName": "Cucumber",
        "safeToEat": true,
        "diseaseName": "none",
        "recommendation": "Refrigerate.",
        "freshnessLevel": "ACCEPTABLE",
        "freshnessScore": 64
    })
}
