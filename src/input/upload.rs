// src/input/upload.rs
use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use log::info;
use std::io::Cursor;
use std::path::Path;

use crate::error::{AssistError, Result};

/// File extensions accepted by the upload dialog and the CLI.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Image bytes in the form they are sent to a model.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

/// An uploaded image, decoded once and re-encoded as PNG for the model calls.
pub struct UploadedImage {
    name: String,
    image: DynamicImage,
    encoded: EncodedImage,
}

impl UploadedImage {
    /// Load an image from disk. Only png/jpg/jpeg files are accepted.
    pub fn load_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AssistError::UnsupportedFormat(extension));
        }

        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(&name, &bytes)
    }

    /// Decode uploaded bytes. The container format is sniffed from the content.
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes)?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(AssistError::UnsupportedFormat(format!("{:?}", format).to_lowercase()));
        }

        let image = image::load_from_memory_with_format(bytes, format)?;

        let mut data = Vec::new();
        image.write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Png)?;

        info!("Loaded image '{}': {}x{}", name, image.width(), image.height());

        Ok(Self {
            name: name.to_string(),
            image,
            encoded: EncodedImage {
                mime_type: "image/png",
                data,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// The PNG bytes forwarded to the vision model and the OCR engine.
    pub fn encoded(&self) -> &EncodedImage {
        &self.encoded
    }
}
