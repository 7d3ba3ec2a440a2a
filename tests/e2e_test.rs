//! End-to-end tests against a deployed server
//!
//! These tests require:
//! 1. The veggie-scan server running
//! 2. An inference endpoint or a connected worker reachable from it
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:3000)

mod fixtures;

use fixtures::PNG_BYTES;

/// Get base URL from env or default to localhost
fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

#[tokio::test]
#[ignore] // Requires a running server
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Failed to reach server");

    assert!(response.status().is_success(), "Health check failed");

    let body: serde_json::Value = response.json().await.expect("Invalid health body");
    println!("Health: {}", serde_json::to_string_pretty(&body).unwrap_or_default());
    assert!(body["checks"]["dataset"].is_object());
}

#[tokio::test]
#[ignore] // Requires a running server
async fn test_e2e_analyze_returns_full_verdict() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let part = reqwest::multipart::Part::bytes(PNG_BYTES.to_vec())
        .file_name("photo.png")
        .mime_str("image/png")
        .expect("Invalid mime type");
    let form = reqwest::multipart::Form::new().part("image", part);

    let response = client
        .post(format!("{}/api/v1/analyze", base_url))
        .multipart(form)
        .send()
        .await
        .expect("Analyze request failed");

    // A photo rejected as not a vegetable is a 400 with a verdict body.
    let status = response.status();
    assert!(status.is_success() || status == reqwest::StatusCode::BAD_REQUEST);

    let verdict: serde_json::Value = response.json().await.expect("Invalid verdict body");
    println!("Verdict: {}", serde_json::to_string_pretty(&verdict).unwrap_or_default());
    for field in [
        "vegetableName",
        "safeToEat",
        "diseaseName",
        "recommendation",
        "freshnessLevel",
        "freshnessScore",
    ] {
        assert!(verdict.get(field).is_some(), "missing field {field}");
    }
}

#[tokio::test]
#[ignore] // Requires a running server
async fn test_e2e_worker_status() {
    let base_url = get_base_url();

    let status: serde_json::Value = reqwest::get(format!("{}/api/v1/workers", base_url))
        .await
        .expect("Status request failed")
        .json()
        .await
        .expect("Invalid status body");

    println!("Workers: {}", serde_json::to_string_pretty(&status).unwrap_or_default());
    assert!(status["connections"].is_array());
}
