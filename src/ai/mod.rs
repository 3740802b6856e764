pub mod connector;
pub mod gemini;
pub mod local_model;

use crate::config::{Backend, Settings};
use crate::error::Result;
use connector::VisionModel;

/// Build the model client for the configured backend.
pub fn build_model(settings: &Settings) -> Result<Box<dyn VisionModel>> {
    let model: Box<dyn VisionModel> = match settings.backend {
        Backend::Gemini => Box::new(gemini::GeminiModel::new(settings)?),
        Backend::Ollama => Box::new(local_model::LocalModel::new(settings)?),
    };
    Ok(model)
}

/// Whether `wanted` is among the names `available_models` returned, using the
/// same matching `generate` applies.
pub fn model_listed(backend: Backend, models: &[String], wanted: &str) -> bool {
    match backend {
        Backend::Gemini => {
            let wanted = wanted.trim_start_matches("models/");
            models.iter().any(|m| m == wanted)
        }
        Backend::Ollama => models.iter().any(|m| local_model::same_model(m, wanted)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn untagged_ollama_name_needs_latest() {
        let pulled = names(&["llava:7b"]);
        assert!(!model_listed(Backend::Ollama, &pulled, "llava"));
        assert!(model_listed(Backend::Ollama, &pulled, "llava:7b"));

        let pulled = names(&["llava:latest"]);
        assert!(model_listed(Backend::Ollama, &pulled, "llava"));
    }

    #[test]
    fn gemini_names_ignore_models_prefix() {
        let listed = names(&["gemini-1.5-flash", "gemini-1.5-pro"]);
        assert!(model_listed(Backend::Gemini, &listed, "models/gemini-1.5-pro"));
        assert!(model_listed(Backend::Gemini, &listed, "gemini-1.5-flash"));
        assert!(!model_listed(Backend::Gemini, &listed, "gemini-1.5"));
    }
}
