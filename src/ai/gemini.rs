// src/ai/gemini.rs
use base64::{engine::general_purpose, Engine as _};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::connector::VisionModel;
use crate::config::{Backend, Settings};
use crate::error::{AssistError, Result};
use crate::input::upload::EncodedImage;

const BLOCKING_FINISH_REASONS: [&str; 4] = ["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT"];

/// Google Gemini `generateContent` client
pub struct GeminiModel {
    base_url: String,
    model_name: String,
    api_key: String,
    timeout_secs: u64,
    client: Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    status: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GeminiModel {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or(AssistError::MissingApiKey)?;

        info!("Initializing Gemini model: {}", settings.model);

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: settings.gemini_url.trim_end_matches('/').to_string(),
            model_name: settings.model.clone(),
            api_key,
            timeout_secs: settings.timeout_secs,
            client,
        })
    }

    fn model_path(&self) -> String {
        if self.model_name.starts_with("models/") {
            self.model_name.clone()
        } else {
            format!("models/{}", self.model_name)
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> AssistError {
        if e.is_timeout() {
            AssistError::Timeout(self.timeout_secs)
        } else {
            AssistError::Http(e)
        }
    }
}

fn build_request(prompt: &str, image: &EncodedImage) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text {
                    text: prompt.to_string(),
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.to_string(),
                        data: general_purpose::STANDARD.encode(&image.data),
                    },
                },
            ],
        }],
    }
}

/// Text of the first candidate, all parts joined. Mirrors the SDK's `response.text`.
fn response_text(response: GenerateResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AssistError::Blocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(AssistError::EmptyResponse)?;

    let finish_reason = candidate.finish_reason.unwrap_or_default();
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        if BLOCKING_FINISH_REASONS.contains(&finish_reason.as_str()) {
            return Err(AssistError::Blocked(finish_reason));
        }
        return Err(AssistError::EmptyResponse);
    }

    Ok(text)
}

fn api_error(body: &str, status: reqwest::StatusCode) -> AssistError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(code) => format!("{} ({})", envelope.error.message, code),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    };
    AssistError::Api {
        service: "Gemini",
        message,
    }
}

impl VisionModel for GeminiModel {
    fn generate(&self, prompt: &str, image: &EncodedImage) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model_path());
        debug!("POST {} ({} image bytes)", url, image.data.len());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt, image))
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AssistError::ModelNotFound {
                backend: Backend::Gemini,
                model: self.model_name.clone(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(api_error(&body, status));
        }

        let parsed: GenerateResponse = response.json()?;
        response_text(parsed)
    }

    fn name(&self) -> &str {
        &self.model_name
    }

    fn available_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(api_error(&body, status));
        }

        let list: ModelList = response.json()?;
        Ok(list
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods.is_empty()
                    || m.supported_generation_methods.iter().any(|g| g == "generateContent")
            })
            .map(|m| m.name.trim_start_matches("models/").to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelArgs;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn request_carries_prompt_then_inline_image() {
        let image = EncodedImage {
            mime_type: "image/png",
            data: vec![1, 2, 3],
        };
        let body = serde_json::to_value(build_request("Describe this", &image)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "parts": [
                        { "text": "Describe this" },
                        { "inline_data": { "mime_type": "image/png", "data": "AQID" } }
                    ]
                }]
            })
        );
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let response = parse(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "A kitchen " }, { "text": "with a kettle." }] },
                  "finishReason": "STOP" },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }));
        assert_eq!(response_text(response).unwrap(), "A kitchen with a kettle.");
    }

    #[test]
    fn blocked_prompt_is_reported() {
        let response = parse(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        match response_text(response) {
            Err(AssistError::Blocked(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Blocked, got {:?}", other),
        }
    }

    #[test]
    fn safety_stop_without_text_is_blocked() {
        let response = parse(json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }]
        }));
        assert!(matches!(response_text(response), Err(AssistError::Blocked(_))));
    }

    #[test]
    fn no_candidates_is_empty_response() {
        assert!(matches!(
            response_text(parse(json!({}))),
            Err(AssistError::EmptyResponse)
        ));
    }

    #[test]
    fn api_error_uses_message_and_status() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        let err = api_error(body, reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "Gemini API error: API key not valid. (INVALID_ARGUMENT)"
        );

        let err = api_error("", reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "Gemini API error: 502 Bad Gateway");
    }

    #[test]
    fn requires_api_key() {
        let settings = Settings::resolve_with(&ModelArgs::default(), |_| None);
        assert!(matches!(GeminiModel::new(&settings), Err(AssistError::MissingApiKey)));
    }

    #[test]
    fn model_path_accepts_both_forms() {
        let mut settings = Settings::resolve_with(&ModelArgs::default(), |_| None);
        settings.api_key = Some("key".to_string());

        let model = GeminiModel::new(&settings).unwrap();
        assert_eq!(model.model_path(), "models/gemini-1.5-flash");

        settings.model = "models/gemini-1.5-pro".to_string();
        let model = GeminiModel::new(&settings).unwrap();
        assert_eq!(model.model_path(), "models/gemini-1.5-pro");
    }
}
