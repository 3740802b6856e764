// src/error.rs
use thiserror::Error;

use crate::config::Backend;

pub type Result<T> = std::result::Result<T, AssistError>;

#[derive(Debug, Error)]
pub enum AssistError {
    #[error("unsupported image type '{0}' (expected png, jpg or jpeg)")]
    UnsupportedFormat(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("{service} API error: {message}")]
    Api { service: &'static str, message: String },

    #[error("no API key configured")]
    MissingApiKey,

    #[error("model '{model}' not found")]
    ModelNotFound { backend: Backend, model: String },

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[cfg(feature = "ocr")]
    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("'{0}' executable not found")]
    ToolMissing(String),

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
}

impl AssistError {
    /// Suggested fix shown under the error text, if there is an obvious one.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::MissingApiKey => {
                Some("Set GEMINI_API_KEY or pass --api-key".to_string())
            }
            Self::ModelNotFound { backend: Backend::Ollama, model } => {
                Some(format!("To fix: ollama pull {}", model))
            }
            Self::ModelNotFound { backend: Backend::Gemini, .. } => {
                Some("Run `visual-assist list-models` to see the models your API key can use".to_string())
            }
            Self::Http(e) if e.is_connect() => {
                Some("Check the model server URL; for Ollama run: ollama serve".to_string())
            }
            Self::ToolMissing(tool) if tool.contains("tesseract") => {
                Some("Install Tesseract OCR or set TESSERACT_CMD".to_string())
            }
            Self::ToolMissing(_) => {
                Some("Install a speech synthesizer (espeak-ng, espeak or speech-dispatcher)".to_string())
            }
            _ => None,
        }
    }

    /// Error text with the hint appended on its own paragraph.
    pub fn display_with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{}\n\n{}", self, hint),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_suggests_pull() {
        let err = AssistError::ModelNotFound {
            backend: Backend::Ollama,
            model: "llava:latest".to_string(),
        };
        assert_eq!(err.hint().as_deref(), Some("To fix: ollama pull llava:latest"));
        assert!(err.display_with_hint().starts_with("model 'llava:latest' not found\n\n"));
    }

    #[test]
    fn unknown_gemini_model_points_at_model_list() {
        let err = AssistError::ModelNotFound {
            backend: Backend::Gemini,
            model: "gemini-1.5-flash".to_string(),
        };
        let shown = err.display_with_hint();
        assert!(shown.starts_with("model 'gemini-1.5-flash' not found\n\n"));
        assert!(shown.contains("visual-assist list-models"));
        assert!(!shown.contains("ollama pull"));
    }

    #[test]
    fn tool_hints_depend_on_tool() {
        let ocr = AssistError::ToolMissing("tesseract".to_string());
        assert!(ocr.hint().unwrap().contains("TESSERACT_CMD"));

        let tts = AssistError::ToolMissing("espeak".to_string());
        assert!(tts.hint().unwrap().contains("espeak-ng"));
    }

    #[test]
    fn plain_errors_have_no_hint() {
        let err = AssistError::EmptyResponse;
        assert!(err.hint().is_none());
        assert_eq!(err.display_with_hint(), "model returned an empty response");
    }
}
