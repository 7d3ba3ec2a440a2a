use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Timeout for the `/v1/models` liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 500;

/// Instruction sent with every photo, to workers and to the direct endpoint.
pub const ANALYSIS_PROMPT: &str = concat!(
    "You're a VeggieScan: Visual Diagnosis of Vegetable Freshness and Contamination AI Assistant. ",
    "Analyze the provided image and identify if it contains vegetables. ",
    "Always return your response in JSON format.\n\n",
    "If the image contains vegetables, provide:\n",
    "- vegetableName\n",
    "- safeToEat: true or false\n",
    "- diseaseName (if applicable, or null)\n",
    "- recommendation\n",
    "- freshnessLevel: one of GOOD, ACCEPTABLE, NOT_RECOMMENDED\n",
    "- freshnessScore: an integer from 0 to 100\n\n",
    "If the vegetable is damaged or cut, add \"(Proned to Bacteria)\" to the vegetable name.\n\n",
    "If the image is NOT a vegetable, set \"vegetableName\" to \"invalid_image\" ",
    "and explain why in the recommendation."
);

/// Photo handed over by the upload layer.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.to_base64())
    }
}

/// Client for an OpenAI-compatible, image-capable chat endpoint (LM Studio and friends).
pub struct InferenceClient {
    http: Client,
    base_url: String,
    chat_path: String,
    model: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl InferenceClient {
    pub fn new(
        base_url: &str,
        chat_path: &str,
        model: &str,
        request_timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let http = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_path: chat_path.to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lightweight probe: GET `/v1/models`, any 2xx means live.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.http.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "Inference endpoint liveness check failed");
                false
            }
        }
    }

    /// Model ids the endpoint currently serves.
    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.http.get(&url).timeout(PROBE_TIMEOUT).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Status(status.as_u16()));
        }

        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|model| model.id).collect())
    }

    /// Send one photo with the prompt and return the raw completion text.
    pub async fn complete(
        &self,
        image: &ImageInput,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<String, InferenceError> {
        let url = format!("{}{}", self.base_url, self.chat_path);

        let request_body = serde_json::json!({
            "model": model.unwrap_or(&self.model),
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image.data_url() } }
                ]
            }],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS
        });

        let response = self
            .http
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(InferenceError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Status(status.as_u16()));
        }

        let chat: ChatResponse = response.json().await.map_err(InferenceError::Http)?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or(InferenceError::MissingContent)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference endpoint returned status {0}")]
    Status(u16),

    #[error("Inference response had no completion content")]
    MissingContent,
}
