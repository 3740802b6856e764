// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use crate::assistant::{AnalysisReport, Section, TaskOutcome, VisualAssistant};
use crate::config::{Backend, ModelArgs, Settings};
use crate::input::upload::UploadedImage;
use crate::ocr::Tesseract;
use crate::speech::{SpeechEngine, SystemSpeaker};

mod ai;
mod assistant;
mod config;
mod error;
mod gui;
mod input;
mod ocr;
mod speech;
mod tasks;

#[derive(Parser)]
#[command(name = "visual-assist")]
#[command(about = "Describe images, read their text aloud and suggest tasks for visually impaired users", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image: scene, text, objects and task guidance
    Analyze {
        /// Image to analyze (png, jpg or jpeg)
        image: PathBuf,

        /// Only run these sections (repeatable)
        #[arg(long, value_enum)]
        only: Vec<Section>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to a file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Read the extracted text aloud
        #[arg(long)]
        speak: bool,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Extract text from an image with Tesseract
    Ocr {
        /// Image to read (png, jpg or jpeg)
        image: PathBuf,

        /// Read the extracted text aloud
        #[arg(long)]
        speak: bool,
    },
    /// Speak a piece of text with the system synthesizer
    Speak {
        /// Text to speak
        text: String,
    },
    /// Check the model backend, Tesseract and speech engine
    Check {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// List models available on the configured backend
    ListModels {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Run graphical user interface
    Gui {
        #[command(flatten)]
        model: ModelArgs,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info")
    );

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { image, only, json, output, speak, model } => {
            run_analyze(&image, &only, json, output.as_deref(), speak, &Settings::resolve(&model))
        }
        Commands::Ocr { image, speak } => {
            run_ocr(&image, speak, &Settings::resolve(&ModelArgs::default()))
        }
        Commands::Speak { text } => {
            let settings = Settings::resolve(&ModelArgs::default());
            SystemSpeaker::from_settings(&settings)
                .speak(&text)
                .map_err(|e| anyhow::anyhow!(e.display_with_hint()))
        }
        Commands::Check { model } => {
            check_status(&Settings::resolve(&model))
        }
        Commands::ListModels { model } => {
            list_models(&Settings::resolve(&model))
        }
        Commands::Gui { model } => {
            gui::run_gui(Settings::resolve(&model))
        }
    }
}

fn run_analyze(
    image_path: &Path,
    only: &[Section],
    json: bool,
    output: Option<&Path>,
    speak: bool,
    settings: &Settings,
) -> Result<()> {
    let upload = UploadedImage::load_path(image_path)
        .with_context(|| format!("Failed to load {}", image_path.display()))?;

    let sections: &[Section] = if only.is_empty() { &Section::ALL } else { only };
    let assistant = VisualAssistant::from_settings(settings);
    let report = assistant.analyze(&upload, sections);

    if let Some(path) = output {
        let body = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report saved to: {}", path.display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if speak {
        match &report.extracted_text {
            Some(text) if !text.trim().is_empty() => {
                if let Err(e) = assistant.speak_text(text) {
                    error!("Speech failed: {}", e);
                    println!("\n{}", e.display_with_hint());
                }
            }
            _ => warn!("No extracted text to speak"),
        }
    }

    Ok(())
}

fn print_report(report: &AnalysisReport) {
    println!("\n=== Visual Assistance: {} ({}x{}) ===", report.image, report.width, report.height);
    if let Some(model) = &report.model {
        println!("Model: {}", model);
    }

    if let Some(scene) = &report.scene {
        println!("\n🔍 Scene Understanding\n{}", scene.trim_end());
    }
    if let Some(text) = &report.extracted_text {
        let shown = if text.trim().is_empty() { "(no text found)" } else { text.trim_end() };
        println!("\n📝 Text Extraction\n{}", shown);
    }
    if let Some(objects) = &report.objects {
        println!("\n🚧 Object Detection\n{}", objects.trim_end());
    }
    match &report.tasks {
        Some(TaskOutcome::Insights(insights)) => {
            println!("\n🤝 Personalized Task Assistance");
            if insights.is_empty() {
                println!("{}", insights.raw_response.trim_end());
            }
            for (label, lines) in insights.sections() {
                if lines.is_empty() {
                    continue;
                }
                println!("\n{}:", label);
                for line in lines {
                    println!("  {}", line);
                }
            }
        }
        Some(TaskOutcome::Error(message)) => {
            println!("\n🤝 Personalized Task Assistance\n{}", message);
        }
        None => {}
    }
    println!("===========================================\n");
}

fn run_ocr(image_path: &Path, speak: bool, settings: &Settings) -> Result<()> {
    use crate::ocr::TextExtractor;

    let upload = UploadedImage::load_path(image_path)
        .with_context(|| format!("Failed to load {}", image_path.display()))?;

    let text = Tesseract::from_settings(settings)
        .extract(upload.encoded())
        .map_err(|e| anyhow::anyhow!(e.display_with_hint()))?;
    println!("{}", text.trim_end());

    if speak {
        SystemSpeaker::from_settings(settings)
            .speak(&text)
            .map_err(|e| anyhow::anyhow!(e.display_with_hint()))?;
    }
    Ok(())
}

fn check_status(settings: &Settings) -> Result<()> {
    info!("Checking {:?} backend...", settings.backend);

    match ai::build_model(settings) {
        Ok(model) => match model.available_models() {
            Ok(models) => {
                println!("✓ {:?} backend reachable ({} model(s) available)", settings.backend, models.len());
                if ai::model_listed(settings.backend, &models, &settings.model) {
                    println!("✓ Model {} is available", settings.model);
                } else {
                    println!("✗ Model {} not listed by the backend", settings.model);
                    if settings.backend == Backend::Ollama {
                        println!("  To fix: ollama pull {}", settings.model);
                    }
                }
            }
            Err(e) => {
                println!("✗ {:?} backend error: {}", settings.backend, e);
                if let Some(hint) = e.hint() {
                    println!("  {}", hint);
                }
            }
        },
        Err(e) => {
            println!("✗ Could not initialize {:?} backend: {}", settings.backend, e);
            if let Some(hint) = e.hint() {
                println!("  {}", hint);
            }
        }
    }

    match Tesseract::from_settings(settings).version() {
        Ok(version) => println!("✓ OCR: {}", version),
        Err(e) => {
            println!("✗ OCR unavailable: {}", e);
            if let Some(hint) = e.hint() {
                println!("  {}", hint);
            }
        }
    }

    match SystemSpeaker::from_settings(settings).installed_engine() {
        Some(engine) => println!("✓ Speech: {}", engine),
        None => println!("✗ Speech: no synthesizer found on PATH"),
    }

    Ok(())
}

fn list_models(settings: &Settings) -> Result<()> {
    let model = ai::build_model(settings).map_err(|e| anyhow::anyhow!(e.display_with_hint()))?;
    let models = model
        .available_models()
        .map_err(|e| anyhow::anyhow!(e.display_with_hint()))?;

    println!("\nAvailable models ({:?}):", settings.backend);
    if models.is_empty() {
        println!("  No models found");
    }
    for name in &models {
        let selected = ai::model_listed(settings.backend, std::slice::from_ref(name), &settings.model);
        let marker = if selected { " (selected)" } else { "" };
        println!("  - {}{}", name, marker);
    }
    println!();

    if settings.backend == Backend::Ollama {
        println!("Suggested vision models:");
        println!("  - llava:latest (general vision model)");
        println!("  - llava:13b (larger, more accurate)");
        println!("  - llava:7b (smaller, faster)");
    }
    Ok(())
}
