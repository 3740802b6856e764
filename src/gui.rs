// src/gui.rs
use anyhow::Result;
use chrono::{DateTime, Local};
use eframe::egui;
use egui::{Align, Color32, Layout, RichText, ScrollArea, Ui, Vec2};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

#[cfg(feature = "clipboard")]
use arboard::Clipboard;

use crate::assistant::{AnalysisReport, TaskOutcome, VisualAssistant};
use crate::config::{Backend, Settings};
use crate::input::upload::{UploadedImage, SUPPORTED_EXTENSIONS};
use crate::speech::{SpeechEngine, SystemSpeaker};
use crate::tasks::TaskInsights;

const WINDOW_WIDTH: f32 = 900.0;
const WINDOW_HEIGHT: f32 = 1000.0;
const PREVIEW_MAX_SIDE: u32 = 1600;
const ACCENT: Color32 = Color32::from_rgb(42, 90, 170);
const CARD_FILL: Color32 = Color32::from_rgb(35, 35, 35);

enum Panel<T> {
    Idle,
    Pending,
    Ready(T),
}

impl<T> Panel<T> {
    fn ready(&self) -> Option<&T> {
        match self {
            Panel::Ready(value) => Some(value),
            _ => None,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, Panel::Pending)
    }
}

struct ThreadSafeState {
    /// Bumped on every upload; workers drop results for older images.
    generation: u64,
    upload: Option<Arc<UploadedImage>>,
    texture: Option<egui::TextureHandle>,
    started_at: Option<DateTime<Local>>,
    model_name: Option<String>,
    scene: Panel<String>,
    text: Panel<String>,
    objects: Panel<String>,
    tasks: Panel<std::result::Result<TaskInsights, String>>,
    speaking: bool,
    status: Option<String>,
}

impl ThreadSafeState {
    fn busy(&self) -> bool {
        self.scene.is_pending()
            || self.text.is_pending()
            || self.objects.is_pending()
            || self.tasks.is_pending()
    }
}

pub struct VisualAssistApp {
    was_style_initialized: bool,
    settings: Settings,
    state: Arc<Mutex<ThreadSafeState>>,
}

impl VisualAssistApp {
    pub fn new(settings: Settings) -> Self {
        let state = Arc::new(Mutex::new(ThreadSafeState {
            generation: 0,
            upload: None,
            texture: None,
            started_at: None,
            model_name: None,
            scene: Panel::Idle,
            text: Panel::Idle,
            objects: Panel::Idle,
            tasks: Panel::Idle,
            speaking: false,
            status: None,
        }));
        Self {
            was_style_initialized: false,
            settings,
            state,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ThreadSafeState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<ThreadSafeState>) -> MutexGuard<'_, ThreadSafeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Apply `update` only if no newer image has been uploaded since `generation`.
fn publish<F>(state: &Mutex<ThreadSafeState>, generation: u64, update: F)
where
    F: FnOnce(&mut ThreadSafeState),
{
    let mut guard = lock(state);
    if guard.generation == generation {
        update(&mut guard);
    } else {
        info!("Dropping result for superseded upload (generation {})", generation);
    }
}

impl eframe::App for VisualAssistApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.was_style_initialized {
            let mut style = (*ctx.style()).clone();
            style.visuals.panel_fill = Color32::from_rgb(25, 25, 25);
            style.visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(30, 30, 30);
            style.visuals.widgets.inactive.bg_fill = Color32::from_rgb(45, 45, 45);
            style.visuals.widgets.hovered.bg_fill = Color32::from_rgb(55, 55, 55);
            style.visuals.widgets.active.bg_fill = Color32::from_rgb(65, 65, 65);
            style.visuals.widgets.inactive.rounding = egui::Rounding::same(6.0);
            style.visuals.widgets.hovered.rounding = egui::Rounding::same(6.0);
            style.visuals.widgets.active.rounding = egui::Rounding::same(6.0);
            style.visuals.selection.bg_fill = ACCENT;
            style.text_styles.insert(
                egui::TextStyle::Body,
                egui::FontId::new(15.0, egui::FontFamily::Proportional),
            );
            style.text_styles.insert(
                egui::TextStyle::Button,
                egui::FontId::new(15.0, egui::FontFamily::Proportional),
            );
            style.text_styles.insert(
                egui::TextStyle::Heading,
                egui::FontId::new(22.0, egui::FontFamily::Proportional),
            );
            ctx.set_style(style);
            self.was_style_initialized = true;
        }

        self.accept_dropped_files(ctx);
        self.load_texture_if_needed(ctx);

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            self.draw_header(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ScrollArea::vertical()
                .auto_shrink([false; 2])
                .show(ui, |ui| self.draw_results(ui));
        });

        let busy = {
            let state = self.lock_state();
            state.busy() || state.speaking
        };
        if busy {
            ctx.request_repaint();
        }
    }
}

impl VisualAssistApp {
    fn draw_header(&mut self, ui: &mut Ui) {
        ui.add_space(10.0);
        ui.heading(RichText::new("🌟 Visual Assistance AI").size(26.0));
        ui.label(
            RichText::new("Empowering Vision through Artificial Intelligence")
                .color(Color32::from_rgb(180, 180, 180)),
        );
        ui.add_space(8.0);

        let mut wants_upload = false;
        let mut wants_rerun = false;
        ui.horizontal(|ui| {
            if ui
                .add_sized(
                    [180.0, 36.0],
                    egui::Button::new(RichText::new("📂 Upload an Image").size(14.0))
                        .fill(ACCENT)
                        .rounding(8.0),
                )
                .on_hover_text("Upload an image for comprehensive analysis")
                .clicked()
            {
                wants_upload = true;
            }

            ui.add_space(8.0);
            ui.label(RichText::new("Model:").size(14.0));
            let current = self.settings.model.clone();
            egui::ComboBox::from_id_source("model_selector")
                .selected_text(&current)
                .width(200.0)
                .show_ui(ui, |ui| {
                    for choice in model_choices(self.settings.backend, &current) {
                        if ui.selectable_label(self.settings.model == choice, choice.as_str()).clicked() {
                            self.settings.model = choice;
                        }
                    }
                });

            let (busy, has_upload) = {
                let state = self.lock_state();
                (state.busy(), state.upload.is_some())
            };
            if busy {
                ui.spinner();
            } else if has_upload
                && ui
                    .add_sized(
                        [110.0, 28.0],
                        egui::Button::new(RichText::new("🔄 Re-analyze").size(14.0)).rounding(4.0),
                    )
                    .clicked()
            {
                wants_rerun = true;
            }
        });

        if let Some(status) = self.lock_state().status.clone() {
            ui.add_space(4.0);
            ui.colored_label(Color32::from_rgb(230, 120, 110), status);
        }
        ui.add_space(8.0);

        if wants_upload {
            if let Some(path) = rfd::FileDialog::new()
                .add_filter("Image", &SUPPORTED_EXTENSIONS)
                .pick_file()
            {
                self.upload_path(path);
            }
        }
        if wants_rerun {
            let upload = self.lock_state().upload.clone();
            if let Some(upload) = upload {
                self.start_analysis(upload);
            }
        }
    }

    fn draw_results(&mut self, ui: &mut Ui) {
        let (texture, image_name) = {
            let state = self.lock_state();
            (
                state.texture.clone(),
                state.upload.as_ref().map(|u| u.name().to_string()),
            )
        };

        let Some(image_name) = image_name else {
            ui.add_space(40.0);
            ui.vertical_centered(|ui| {
                ui.label(
                    RichText::new("Upload a PNG or JPEG image, or drop one onto this window.")
                        .size(16.0)
                        .color(Color32::from_rgb(150, 150, 150)),
                );
            });
            return;
        };

        if let Some(texture) = &texture {
            ui.add_space(8.0);
            let available_width = ui.available_width();
            let aspect_ratio = texture.size_vec2().x / texture.size_vec2().y;
            let width = available_width.min(texture.size_vec2().x);
            let height = if aspect_ratio > 0.0 { width / aspect_ratio } else { width };
            ui.vertical_centered(|ui| {
                ui.image((texture.id(), Vec2::new(width, height)));
                ui.label(RichText::new("Uploaded Image").small().color(Color32::from_rgb(150, 150, 150)));
                ui.label(RichText::new(&image_name).small().color(Color32::from_rgb(130, 130, 130)));
            });
        }

        section_heading(ui, "🔍 Scene Understanding");
        {
            let state = self.lock_state();
            match &state.scene {
                Panel::Ready(text) => card(ui, |ui| {
                    ui.label(text.as_str());
                }),
                Panel::Pending => pending(ui, "Describing the scene..."),
                Panel::Idle => {}
            };
        }

        section_heading(ui, "📝 Text Extraction");
        self.draw_text_panel(ui);

        section_heading(ui, "🚧 Object Detection");
        {
            let state = self.lock_state();
            match &state.objects {
                Panel::Ready(text) => card(ui, |ui| {
                    ui.label(text.as_str());
                }),
                Panel::Pending => pending(ui, "Listing objects..."),
                Panel::Idle => {}
            };
        }

        section_heading(ui, "🤝 Personalized Task Assistance");
        {
            let state = self.lock_state();
            match &state.tasks {
                Panel::Ready(Ok(insights)) => draw_insights(ui, insights),
                Panel::Ready(Err(message)) => {
                    ui.colored_label(Color32::from_rgb(230, 120, 110), message.as_str());
                }
                Panel::Pending => pending(ui, "Preparing task guidance..."),
                Panel::Idle => {}
            };
        }

        ui.add_space(16.0);
        let report_ready = {
            let state = self.lock_state();
            !state.busy() && state.tasks.ready().is_some()
        };
        if report_ready
            && ui
                .add_sized(
                    [160.0, 32.0],
                    egui::Button::new(RichText::new("💾 Save Report").size(14.0))
                        .fill(Color32::from_rgb(45, 45, 45))
                        .rounding(6.0),
                )
                .clicked()
        {
            if let Some(path) = rfd::FileDialog::new()
                .add_filter("JSON", &["json"])
                .set_file_name("analysis.json")
                .save_file()
            {
                self.save_report(path);
            }
        }
        ui.add_space(16.0);
    }

    fn draw_text_panel(&mut self, ui: &mut Ui) {
        let (text, speaking) = {
            let state = self.lock_state();
            if state.text.is_pending() {
                drop(state);
                pending(ui, "Reading text...");
                return;
            }
            (state.text.ready().cloned(), state.speaking)
        };
        let Some(text) = text else {
            return;
        };

        let mut view = text.as_str();
        ui.add(
            egui::TextEdit::multiline(&mut view)
                .desired_rows(5)
                .desired_width(f32::INFINITY)
                .hint_text("Extracted Text"),
        );

        ui.horizontal(|ui| {
            let can_speak = !speaking && !text.trim().is_empty();
            if ui
                .add_enabled(
                    can_speak,
                    egui::Button::new(RichText::new("🔊 Read Extracted Text").size(14.0))
                        .fill(Color32::from_rgb(45, 45, 45))
                        .rounding(6.0),
                )
                .clicked()
            {
                self.speak(text.clone());
            }
            if speaking {
                ui.spinner();
            }
            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                if ui
                    .add_enabled(
                        !text.trim().is_empty(),
                        egui::Button::new(RichText::new("📋 Copy").size(14.0))
                            .fill(Color32::from_rgb(45, 45, 45))
                            .rounding(6.0),
                    )
                    .clicked()
                {
                    self.copy_text_to_clipboard(&text);
                }
            });
        });
    }

    fn accept_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let Some(file) = dropped.into_iter().next() else {
            return;
        };
        if let Some(path) = file.path {
            self.upload_path(path);
        } else if let Some(bytes) = file.bytes {
            self.upload_bytes(&file.name, &bytes);
        }
    }

    fn upload_path(&mut self, path: PathBuf) {
        info!("Uploading {}", path.display());
        match UploadedImage::load_path(&path) {
            Ok(upload) => self.start_analysis(Arc::new(upload)),
            Err(e) => self.report_upload_error(e),
        }
    }

    fn upload_bytes(&mut self, name: &str, bytes: &[u8]) {
        match UploadedImage::from_bytes(name, bytes) {
            Ok(upload) => self.start_analysis(Arc::new(upload)),
            Err(e) => self.report_upload_error(e),
        }
    }

    fn report_upload_error(&self, e: crate::error::AssistError) {
        error!("Failed to load image: {}", e);
        self.lock_state().status = Some(format!("Could not load image: {}", e));
    }

    fn load_texture_if_needed(&self, ctx: &egui::Context) {
        let upload = {
            let state = self.lock_state();
            if state.texture.is_some() {
                return;
            }
            match &state.upload {
                Some(upload) => Arc::clone(upload),
                None => return,
            }
        };

        let image = upload.image();
        let preview = if image.width() > PREVIEW_MAX_SIDE || image.height() > PREVIEW_MAX_SIDE {
            image.thumbnail(PREVIEW_MAX_SIDE, PREVIEW_MAX_SIDE)
        } else {
            image.clone()
        };
        let size = [preview.width() as usize, preview.height() as usize];
        let rgba = preview.to_rgba8();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_flat_samples().as_slice());
        let texture = ctx.load_texture("uploaded_image", color_image, egui::TextureOptions::LINEAR);

        let mut state = self.lock_state();
        if state.upload.as_ref().map_or(false, |current| Arc::ptr_eq(current, &upload)) {
            state.texture = Some(texture);
        }
    }

    fn start_analysis(&mut self, upload: Arc<UploadedImage>) {
        let generation = {
            let mut state = self.lock_state();
            state.generation += 1;
            if !state
                .upload
                .as_ref()
                .map_or(false, |current| Arc::ptr_eq(current, &upload))
            {
                state.texture = None;
            }
            state.upload = Some(Arc::clone(&upload));
            state.started_at = Some(Local::now());
            state.model_name = None;
            state.scene = Panel::Pending;
            state.text = Panel::Pending;
            state.objects = Panel::Pending;
            state.tasks = Panel::Pending;
            state.status = None;
            state.generation
        };

        let settings = self.settings.clone();
        let state = Arc::clone(&self.state);
        info!("Starting analysis of '{}' with {}", upload.name(), settings.model);

        thread::spawn(move || {
            let assistant = VisualAssistant::from_settings(&settings);
            let model_name = assistant.model_name().map(str::to_string);
            publish(&state, generation, |s| s.model_name = model_name);

            let scene = assistant.analyze_scene(&upload);
            publish(&state, generation, |s| s.scene = Panel::Ready(scene));

            let text = assistant.extract_text(&upload);
            publish(&state, generation, |s| s.text = Panel::Ready(text));

            let objects = assistant.detect_objects(&upload);
            publish(&state, generation, |s| s.objects = Panel::Ready(objects));

            let tasks = assistant.personalized_task_assistance(&upload);
            publish(&state, generation, |s| s.tasks = Panel::Ready(tasks));

            info!("Analysis complete.");
        });
    }

    fn speak(&mut self, text: String) {
        self.lock_state().speaking = true;
        let speaker = SystemSpeaker::from_settings(&self.settings);
        let state = Arc::clone(&self.state);
        thread::spawn(move || {
            let result = speaker.speak(&text);
            let mut state = lock(&state);
            state.speaking = false;
            if let Err(e) = result {
                error!("Speech failed: {}", e);
                state.status = Some(format!("Speech error: {}", e.display_with_hint()));
            }
        });
    }

    fn build_report(&self) -> Option<AnalysisReport> {
        let state = self.lock_state();
        let upload = state.upload.as_ref()?;
        let (width, height) = upload.dimensions();
        Some(AnalysisReport {
            image: upload.name().to_string(),
            width,
            height,
            model: state.model_name.clone(),
            generated_at: state.started_at.unwrap_or_else(Local::now),
            scene: state.scene.ready().cloned(),
            extracted_text: state.text.ready().cloned(),
            objects: state.objects.ready().cloned(),
            tasks: state.tasks.ready().map(|outcome| match outcome {
                Ok(insights) => TaskOutcome::Insights(insights.clone()),
                Err(e) => TaskOutcome::Error(e.clone()),
            }),
        })
    }

    fn save_report(&self, path: PathBuf) {
        let Some(report) = self.build_report() else {
            warn!("No analysis to save");
            return;
        };
        let result = serde_json::to_string_pretty(&report)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(&path, json).map_err(anyhow::Error::from));
        match result {
            Ok(()) => info!("Report saved to: {}", path.display()),
            Err(e) => {
                error!("Failed to save report: {}", e);
                self.lock_state().status = Some(format!("Failed to save report: {}", e));
            }
        }
    }

    fn copy_text_to_clipboard(&self, text: &str) {
        #[cfg(feature = "clipboard")]
        {
            match Clipboard::new() {
                Ok(mut clipboard) => {
                    if let Err(e) = clipboard.set_text(text.to_string()) {
                        error!("Failed to copy text to clipboard: {}", e);
                    } else {
                        info!("Extracted text copied to clipboard");
                    }
                }
                Err(e) => {
                    error!("Failed to access clipboard: {}", e);
                }
            }
        }
        #[cfg(not(feature = "clipboard"))]
        {
            let _ = text;
            self.lock_state().status = Some("Clipboard feature not enabled in this build.".to_string());
            error!("Clipboard feature not enabled. Enable the 'clipboard' feature in Cargo.toml");
        }
    }
}

fn model_choices(backend: Backend, current: &str) -> Vec<String> {
    let presets: &[&str] = match backend {
        Backend::Gemini => &["gemini-1.5-flash", "gemini-1.5-pro"],
        Backend::Ollama => &["llava:latest", "llava:13b", "llava:7b"],
    };
    let mut choices: Vec<String> = presets.iter().map(|m| m.to_string()).collect();
    if !choices.iter().any(|c| c == current) {
        choices.insert(0, current.to_string());
    }
    choices
}

fn section_heading(ui: &mut Ui, title: &str) {
    ui.add_space(12.0);
    ui.heading(RichText::new(title).size(20.0));
    ui.add_space(4.0);
}

fn pending(ui: &mut Ui, message: &str) {
    ui.horizontal(|ui| {
        ui.spinner();
        ui.label(RichText::new(message).color(Color32::from_rgb(150, 150, 150)));
    });
}

fn card(ui: &mut Ui, add_contents: impl FnOnce(&mut Ui)) {
    egui::Frame::none()
        .fill(CARD_FILL)
        .rounding(8.0)
        .inner_margin(10.0)
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            add_contents(ui);
        });
}

fn draw_insights(ui: &mut Ui, insights: &TaskInsights) {
    if insights.is_empty() {
        // The model ignored the headings; show its answer as-is.
        card(ui, |ui| {
            ui.label(insights.raw_response.as_str());
        });
        return;
    }
    card(ui, |ui| {
        for (label, lines) in insights.sections() {
            if lines.is_empty() {
                continue;
            }
            ui.label(RichText::new(format!("{}:", label)).strong());
            for line in lines {
                ui.label(line.as_str());
            }
            ui.add_space(6.0);
        }
    });
}

pub fn run_gui(settings: Settings) -> Result<()> {
    info!("Visual Assistance GUI starting up...");

    let native_options = eframe::NativeOptions {
        initial_window_size: Some(egui::vec2(WINDOW_WIDTH, WINDOW_HEIGHT)),
        min_window_size: Some(egui::vec2(480.0, 400.0)),
        ..eframe::NativeOptions::default()
    };

    eframe::run_native(
        "Visual Assistance AI",
        native_options,
        Box::new(move |_cc| Box::new(VisualAssistApp::new(settings))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to start GUI: {}", e))?;

    Ok(())
}
