// src/ai/local_model.rs
use base64::{engine::general_purpose, Engine as _};
use log::{info, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::connector::VisionModel;
use crate::config::{Backend, Settings};
use crate::error::{AssistError, Result};
use crate::input::upload::EncodedImage;

//Implementation for Ollama local LLM processing
pub struct LocalModel {
    ollama_url: String,
    model_name: String,
    timeout_secs: u64,
    client: Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

impl LocalModel {
    pub fn new(settings: &Settings) -> Result<Self> {
        info!("Initializing Ollama model: {} at {}", settings.model, settings.ollama_url);

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            ollama_url: settings.ollama_url.clone(),
            model_name: settings.model.clone(),
            timeout_secs: settings.timeout_secs,
            client,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AssistError {
        if e.is_timeout() {
            AssistError::Timeout(self.timeout_secs)
        } else {
            AssistError::Http(e)
        }
    }
}

/// `llava` and `llava:latest` name the same model.
pub(crate) fn same_model(listed: &str, wanted: &str) -> bool {
    let normalize = |name: &str| {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{}:latest", name)
        }
    };
    normalize(listed) == normalize(wanted)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<OllamaError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

impl VisionModel for LocalModel {
    fn generate(&self, prompt: &str, image: &EncodedImage) -> Result<String> {
        //Check if Ollama is running and model is available
        let models = self.available_models()?;
        if !models.iter().any(|m| same_model(m, &self.model_name)) {
            return Err(AssistError::ModelNotFound {
                backend: Backend::Ollama,
                model: self.model_name.clone(),
            });
        }

        info!("Processing image with Ollama model: {}", self.model_name);

        let request = OllamaRequest {
            model: &self.model_name,
            prompt,
            images: vec![general_purpose::STANDARD.encode(&image.data)],
            stream: false,
        };

        let url = format!("{}/api/generate", self.ollama_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let error_text = response.text()?;
            return Err(AssistError::Api {
                service: "Ollama",
                message: error_message(&error_text),
            });
        }

        let response_data: OllamaResponse = response.json()?;
        if response_data.response.trim().is_empty() {
            warn!("Ollama returned an empty response for model {}", self.model_name);
            return Err(AssistError::EmptyResponse);
        }

        Ok(response_data.response)
    }

    fn name(&self) -> &str {
        &self.model_name
    }

    fn available_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.ollama_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(AssistError::Api {
                service: "Ollama",
                message: format!("server responded with status {}", response.status()),
            });
        }

        let tags: TagList = response.json()?;
        Ok(tags.models.into_iter().map(|t| t.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_is_non_streaming_with_base64_image() {
        let request = OllamaRequest {
            model: "llava:latest",
            prompt: "List the objects",
            images: vec![general_purpose::STANDARD.encode([0xffu8, 0x00])],
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "llava:latest",
                "prompt": "List the objects",
                "images": ["/wA="],
                "stream": false
            })
        );
    }

    #[test]
    fn untagged_names_match_latest() {
        assert!(same_model("llava:latest", "llava"));
        assert!(same_model("llava", "llava:latest"));
        assert!(same_model("llava:13b", "llava:13b"));
        assert!(!same_model("llava:13b", "llava"));
        assert!(!same_model("bakllava:latest", "llava:latest"));
    }

    #[test]
    fn error_body_is_unwrapped() {
        assert_eq!(
            error_message(r#"{"error":"model requires more system memory"}"#),
            "model requires more system memory"
        );
        assert_eq!(error_message("  plain failure \n"), "plain failure");
    }

    #[test]
    fn tag_list_parses_names() {
        let tags: TagList = serde_json::from_value(json!({
            "models": [
                { "name": "llava:latest", "size": 4733363377u64 },
                { "name": "moondream:latest", "size": 1738451197u64 }
            ]
        }))
        .unwrap();
        let names: Vec<String> = tags.models.into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["llava:latest", "moondream:latest"]);
    }
}
