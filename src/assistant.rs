// src/assistant.rs
use chrono::{DateTime, Local};
use clap::ValueEnum;
use log::{error, info};
use serde::Serialize;

use crate::ai::{self, connector::VisionModel};
use crate::config::Settings;
use crate::error::Result;
use crate::input::upload::UploadedImage;
use crate::ocr::{Tesseract, TextExtractor};
use crate::speech::{SpeechEngine, SystemSpeaker};
use crate::tasks::TaskInsights;

pub const SCENE_PROMPT: &str = "Provide a comprehensive, detailed description of this scene. \
Focus on key elements, colors, objects, and spatial relationships. \
Describe the scene as if explaining it to someone who cannot see.";

pub const OBJECTS_PROMPT: &str = "Identify and list all distinct objects in this image. \
Provide their locations and any notable characteristics.";

pub const TASKS_PROMPT: &str = "Analyze this image and provide personalized, practical guidance. \
Consider the following aspects:\n\
1. Identify specific objects or items in the image\n\
2. Suggest potential daily tasks or activities related to these objects\n\
3. Provide step-by-step guidance or safety tips\n\
4. Highlight any potential challenges for a visually impaired person\n\
5. Offer practical advice for interaction or navigation\n\
Provide a comprehensive, helpful, and empathetic response.\n\
Organize the answer under these headings, each on its own line and in this order: \
Identified Objects:, Potential Tasks:, Safety Tips:, Navigation Advice:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// Scene description
    Scene,
    /// OCR text extraction
    Text,
    /// Object listing
    Objects,
    /// Personalized task assistance
    Tasks,
}

impl Section {
    pub const ALL: [Section; 4] = [Section::Scene, Section::Text, Section::Objects, Section::Tasks];
}

/// Outcome of the task assistance call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Insights(TaskInsights),
    Error(String),
}

/// Everything produced for one uploaded image. Failed calls hold their error text.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub model: Option<String>,
    pub generated_at: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskOutcome>,
}

pub struct VisualAssistant {
    model: std::result::Result<Box<dyn VisionModel>, String>,
    ocr: Box<dyn TextExtractor>,
    speech: Box<dyn SpeechEngine>,
}

impl VisualAssistant {
    /// A model that failed to initialize only fails the calls that need it.
    pub fn new(
        model: Result<Box<dyn VisionModel>>,
        ocr: Box<dyn TextExtractor>,
        speech: Box<dyn SpeechEngine>,
    ) -> Self {
        let model = model.map_err(|e| {
            error!("Failed to initialize vision model: {}", e);
            e.display_with_hint()
        });
        Self { model, ocr, speech }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ai::build_model(settings),
            Box::new(Tesseract::from_settings(settings)),
            Box::new(SystemSpeaker::from_settings(settings)),
        )
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_ref().ok().map(|m| m.name())
    }

    fn generate(&self, prompt: &str, image: &UploadedImage) -> std::result::Result<String, String> {
        let model = self.model.as_ref().map_err(|e| e.clone())?;
        model
            .generate(prompt, image.encoded())
            .map_err(|e| e.display_with_hint())
    }

    pub fn analyze_scene(&self, image: &UploadedImage) -> String {
        info!("Analyzing scene in '{}'", image.name());
        self.generate(SCENE_PROMPT, image).unwrap_or_else(|e| {
            error!("Scene analysis failed: {}", e);
            format!("Scene analysis error: {}", e)
        })
    }

    pub fn extract_text(&self, image: &UploadedImage) -> String {
        info!("Extracting text from '{}'", image.name());
        self.ocr.extract(image.encoded()).unwrap_or_else(|e| {
            error!("Text extraction failed: {}", e);
            format!("Text extraction error: {}", e.display_with_hint())
        })
    }

    pub fn detect_objects(&self, image: &UploadedImage) -> String {
        info!("Detecting objects in '{}'", image.name());
        self.generate(OBJECTS_PROMPT, image).unwrap_or_else(|e| {
            error!("Object detection failed: {}", e);
            format!("Object detection error: {}", e)
        })
    }

    pub fn personalized_task_assistance(&self, image: &UploadedImage) -> std::result::Result<TaskInsights, String> {
        info!("Generating task guidance for '{}'", image.name());
        match self.generate(TASKS_PROMPT, image) {
            Ok(text) => {
                let insights = TaskInsights::parse(&text);
                if insights.is_empty() {
                    info!("Task guidance had no recognizable section headers");
                }
                Ok(insights)
            }
            Err(e) => {
                error!("Task assistance failed: {}", e);
                Err(format!("Task assistance analysis error: {}", e))
            }
        }
    }

    pub fn speak_text(&self, text: &str) -> Result<()> {
        self.speech.speak(text)
    }

    /// Run the selected capabilities in display order.
    pub fn analyze(&self, image: &UploadedImage, sections: &[Section]) -> AnalysisReport {
        let wants = |section: Section| sections.contains(&section);
        let (width, height) = image.dimensions();

        AnalysisReport {
            image: image.name().to_string(),
            width,
            height,
            model: self.model_name().map(str::to_string),
            generated_at: Local::now(),
            scene: wants(Section::Scene).then(|| self.analyze_scene(image)),
            extracted_text: wants(Section::Text).then(|| self.extract_text(image)),
            objects: wants(Section::Objects).then(|| self.detect_objects(image)),
            tasks: wants(Section::Tasks).then(|| match self.personalized_task_assistance(image) {
                Ok(insights) => TaskOutcome::Insights(insights),
                Err(e) => TaskOutcome::Error(e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::error::AssistError;
    use crate::input::upload::EncodedImage;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    struct ScriptedModel {
        prompts: Arc<Mutex<Vec<String>>>,
        tasks_reply: String,
        fail: bool,
    }

    impl VisionModel for ScriptedModel {
        fn generate(&self, prompt: &str, image: &EncodedImage) -> Result<String> {
            assert_eq!(image.mime_type, "image/png");
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(AssistError::ModelNotFound {
                    backend: Backend::Ollama,
                    model: "llava:latest".to_string(),
                });
            }
            Ok(match prompt {
                SCENE_PROMPT => "A sunny kitchen.".to_string(),
                OBJECTS_PROMPT => "1. Kettle, left counter".to_string(),
                _ => self.tasks_reply.clone(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn available_models(&self) -> Result<Vec<String>> {
            Ok(vec!["scripted".to_string()])
        }
    }

    struct FixedOcr(Option<&'static str>);

    impl TextExtractor for FixedOcr {
        fn extract(&self, _image: &EncodedImage) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| AssistError::ToolMissing("tesseract".to_string()))
        }
    }

    #[derive(Default, Clone)]
    struct RecordingSpeaker(Arc<Mutex<Vec<String>>>);

    impl SpeechEngine for RecordingSpeaker {
        fn speak(&self, text: &str) -> Result<()> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn upload() -> UploadedImage {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(3, 2))
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        UploadedImage::from_bytes("kitchen.png", &bytes).unwrap()
    }

    fn assistant(fail: bool, tasks_reply: &str, ocr: Option<&'static str>) -> (VisualAssistant, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let model = ScriptedModel {
            prompts: Arc::clone(&prompts),
            tasks_reply: tasks_reply.to_string(),
            fail,
        };
        let assistant = VisualAssistant::new(
            Ok(Box::new(model)),
            Box::new(FixedOcr(ocr)),
            Box::new(RecordingSpeaker::default()),
        );
        (assistant, prompts)
    }

    #[test]
    fn full_report_runs_every_section_in_order() {
        let reply = "Identified Objects:\nKettle\nPotential Tasks:\nMake tea\nSafety Tips:\nSteam burns\nNavigation Advice:\nCounter is ahead";
        let (assistant, prompts) = assistant(false, reply, Some("EXIT\n"));

        let report = assistant.analyze(&upload(), &Section::ALL);

        assert_eq!(report.image, "kitchen.png");
        assert_eq!((report.width, report.height), (3, 2));
        assert_eq!(report.model.as_deref(), Some("scripted"));
        assert_eq!(report.scene.as_deref(), Some("A sunny kitchen."));
        assert_eq!(report.extracted_text.as_deref(), Some("EXIT\n"));
        assert_eq!(report.objects.as_deref(), Some("1. Kettle, left counter"));
        match report.tasks {
            Some(TaskOutcome::Insights(insights)) => {
                assert_eq!(insights.identified_objects, vec!["Kettle"]);
                assert_eq!(insights.navigation_advice, vec!["Counter is ahead"]);
            }
            other => panic!("expected insights, got {:?}", other),
        }
        assert_eq!(
            *prompts.lock().unwrap(),
            vec![SCENE_PROMPT, OBJECTS_PROMPT, TASKS_PROMPT]
        );
    }

    #[test]
    fn failures_become_prefixed_messages() {
        let (assistant, _) = assistant(true, "", None);
        let image = upload();

        let scene = assistant.analyze_scene(&image);
        assert!(scene.starts_with("Scene analysis error: model 'llava:latest' not found"));
        assert!(scene.contains("ollama pull llava:latest"));

        assert!(assistant
            .detect_objects(&image)
            .starts_with("Object detection error: "));
        assert!(assistant
            .extract_text(&image)
            .starts_with("Text extraction error: 'tesseract' executable not found"));

        let tasks = assistant.personalized_task_assistance(&image).unwrap_err();
        assert!(tasks.starts_with("Task assistance analysis error: "));
    }

    #[test]
    fn model_init_failure_spares_ocr() {
        let assistant = VisualAssistant::new(
            Err(AssistError::MissingApiKey),
            Box::new(FixedOcr(Some("STOP"))),
            Box::new(RecordingSpeaker::default()),
        );
        let report = assistant.analyze(&upload(), &Section::ALL);

        assert_eq!(report.model, None);
        assert_eq!(report.extracted_text.as_deref(), Some("STOP"));
        let scene = report.scene.unwrap();
        assert!(scene.starts_with("Scene analysis error: no API key configured"));
        assert!(scene.contains("GEMINI_API_KEY"));
        assert!(matches!(report.tasks, Some(TaskOutcome::Error(_))));
    }

    #[test]
    fn only_selected_sections_run() {
        let (assistant, prompts) = assistant(false, "", Some("text"));
        let report = assistant.analyze(&upload(), &[Section::Text, Section::Objects]);

        assert!(report.scene.is_none());
        assert!(report.tasks.is_none());
        assert_eq!(report.extracted_text.as_deref(), Some("text"));
        assert_eq!(*prompts.lock().unwrap(), vec![OBJECTS_PROMPT]);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("scene").is_none());
        assert_eq!(json["objects"], "1. Kettle, left counter");
    }

    #[test]
    fn task_errors_serialize_like_an_error_field() {
        let (assistant, _) = assistant(true, "", None);
        let report = assistant.analyze(&upload(), &[Section::Tasks]);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["tasks"]["error"]
            .as_str()
            .unwrap()
            .starts_with("Task assistance analysis error: "));
    }

    #[test]
    fn speak_text_goes_to_speech_engine() {
        let speaker = RecordingSpeaker::default();
        let spoken = Arc::clone(&speaker.0);
        let assistant = VisualAssistant::new(
            Err(AssistError::MissingApiKey),
            Box::new(FixedOcr(None)),
            Box::new(speaker),
        );
        assistant.speak_text("Fire exit").unwrap();
        assert_eq!(*spoken.lock().unwrap(), vec!["Fire exit"]);
    }

    #[test]
    fn tasks_prompt_asks_for_parsable_headings() {
        for header in ["Identified Objects:", "Potential Tasks:", "Safety Tips:", "Navigation Advice:"] {
            assert!(TASKS_PROMPT.contains(header));
        }
    }
}
