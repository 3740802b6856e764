// src/config.rs
use clap::{Args, ValueEnum};
use serde::Serialize;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_OLLAMA_MODEL: &str = "llava:latest";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
/// Default speaking rate, in words per minute.
pub const DEFAULT_SPEECH_RATE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Google Gemini generateContent API
    Gemini,
    /// Local Ollama server
    Ollama,
}

impl Backend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "gemini" | "google" => Some(Self::Gemini),
            "ollama" | "local" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => DEFAULT_GEMINI_MODEL,
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
        }
    }
}

/// Model options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Vision backend [env: VISION_BACKEND] (default: gemini)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Model name (e.g., "gemini-1.5-flash" or "llava:latest")
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Gemini API key [env: GEMINI_API_KEY or GOOGLE_API_KEY]
    #[arg(long)]
    pub api_key: Option<String>,

    /// Ollama server URL (default: http://localhost:11434)
    #[arg(long)]
    pub ollama_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub model: String,
    pub api_key: Option<String>,
    pub gemini_url: String,
    pub ollama_url: String,
    pub timeout_secs: u64,
    pub tesseract_cmd: String,
    pub ocr_lang: String,
    pub speech_rate: u32,
    pub speech_voice: Option<String>,
}

impl Settings {
    /// Resolve settings from CLI arguments, then the process environment, then defaults.
    pub fn resolve(args: &ModelArgs) -> Self {
        Self::resolve_with(args, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(args: &ModelArgs, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = args
            .backend
            .or_else(|| env("VISION_BACKEND").and_then(|v| Backend::parse(&v)))
            .unwrap_or(Backend::Gemini);

        let model_env = match backend {
            Backend::Gemini => env("GEMINI_MODEL"),
            Backend::Ollama => env("OLLAMA_MODEL"),
        };
        let model = args
            .model
            .clone()
            .or(model_env)
            .unwrap_or_else(|| backend.default_model().to_string());

        let api_key = args
            .api_key
            .clone()
            .or_else(|| env("GEMINI_API_KEY"))
            .or_else(|| env("GOOGLE_API_KEY"));

        let ollama_url = args
            .ollama_url
            .clone()
            .or_else(|| env("OLLAMA_HOST"))
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Self {
            backend,
            model,
            api_key,
            gemini_url: env("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            ollama_url: ollama_url.trim_end_matches('/').to_string(),
            timeout_secs: env("REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            tesseract_cmd: env("TESSERACT_CMD").unwrap_or_else(|| "tesseract".to_string()),
            ocr_lang: env("OCR_LANG").unwrap_or_else(|| "eng".to_string()),
            speech_rate: env("SPEECH_RATE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SPEECH_RATE),
            speech_voice: env("SPEECH_VOICE"),
        }
    }
}
