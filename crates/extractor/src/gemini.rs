use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    ExtractError, ReceiptImage, ReceiptModel, ResultExtract,
    prompt::{response_schema, system_prompt},
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub thinking_budget: u32,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.5,
            thinking_budget: 512,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
    response_schema: Value,
    thinking_config: ThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client of the Gemini `generateContent` REST endpoint.
pub struct GeminiModel {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiModel {
    pub fn new(config: GeminiConfig) -> ResultExtract<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request(&self, images: &[ReceiptImage]) -> GenerateRequest {
        let parts = images
            .iter()
            .map(|image| Part {
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: STANDARD.encode(&image.bytes),
                }),
                ..Part::default()
            })
            .collect();
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(system_prompt()),
                    ..Part::default()
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                response_mime_type: "application/json",
                response_schema: response_schema(),
                thinking_config: ThinkingConfig {
                    thinking_budget: self.config.thinking_budget,
                },
            },
        }
    }
}

#[async_trait]
impl ReceiptModel for GeminiModel {
    async fn extract(&self, images: &[ReceiptImage]) -> ResultExtract<String> {
        debug!(model = %self.config.model, images = images.len(), "calling model");
        let res = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&self.request(images))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let message = res
                .json::<ErrorResponse>()
                .await
                .map(|err| err.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ExtractError::Model(format!("{status}: {message}")));
        }

        let body = res.json::<GenerateResponse>().await?;
        if let Some(usage) = &body.usage_metadata {
            info!(model = %self.config.model, %usage, "model response received");
        }
        let Some(candidate) = body.candidates.into_iter().next() else {
            return Err(ExtractError::Model("no candidates returned".to_string()));
        };
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter(|part| part.thought != Some(true))
            .filter_map(|part| part.text)
            .collect();
        if text.trim().is_empty() {
            return Err(ExtractError::Model(format!(
                "empty response (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{Json, Router, extract::State, http::HeaderMap, routing::post};
    use serde_json::json;
    use tokio::{net::TcpListener, sync::Mutex};

    use super::*;

    type Seen = Arc<Mutex<Option<(String, Value)>>>;

    async fn generate(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let key = headers
            .get("x-goog-api-key")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        *seen.lock().await = Some((key, body));
        Json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "[]" }
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": { "totalTokenCount": 42 }
        }))
    }

    async fn stub_server() -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/v1beta/models/gemini-2.5-flash:generateContent",
                post(generate),
            )
            .with_state(seen.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn sends_images_with_prompt_and_schema() {
        let (base_url, seen) = stub_server().await;
        let model = GeminiModel::new(GeminiConfig {
            base_url,
            ..GeminiConfig::new("secret")
        })
        .unwrap();

        let text = model
            .extract(&[ReceiptImage {
                bytes: b"img".to_vec(),
                mime_type: "image/png".to_string(),
            }])
            .await
            .unwrap();
        assert_eq!(text, "[]");

        let (key, body) = seen.lock().await.take().unwrap();
        assert_eq!(key, "secret");
        assert_eq!(
            body["contents"][0]["parts"][0]["inlineData"]["data"],
            STANDARD.encode(b"img")
        );
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            512
        );
        assert!(
            body["systemInstruction"]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .contains("food-drink")
        );
    }

    #[tokio::test]
    async fn upstream_error_is_reported() {
        let model = GeminiModel::new(GeminiConfig {
            base_url: "http://127.0.0.1:9/unreachable".to_string(),
            timeout: Duration::from_secs(2),
            ..GeminiConfig::new("secret")
        })
        .unwrap();
        assert!(model.extract(&[]).await.is_err());
    }
}
