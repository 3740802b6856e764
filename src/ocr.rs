// src/ocr.rs
use log::{debug, info};
#[cfg(not(feature = "ocr"))]
use std::io::{ErrorKind, Write};
#[cfg(not(feature = "ocr"))]
use std::process::{Command, Stdio};

use crate::config::Settings;
use crate::error::{AssistError, Result};
use crate::input::upload::EncodedImage;

/// Extracts printable text from an image
pub trait TextExtractor: Send + Sync {
    fn extract(&self, image: &EncodedImage) -> Result<String>;
}

/// Tesseract OCR.
///
/// With the `ocr` feature the image is handed to libtesseract in memory.
/// Without it the `tesseract` executable is run with the image on stdin.
pub struct Tesseract {
    #[cfg_attr(feature = "ocr", allow(dead_code))]
    program: String,
    lang: String,
}

impl Tesseract {
    pub fn new(program: &str, lang: &str) -> Self {
        Self {
            program: program.to_string(),
            lang: lang.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.tesseract_cmd, &settings.ocr_lang)
    }

    #[cfg(not(feature = "ocr"))]
    fn args(&self) -> Vec<&str> {
        vec!["stdin", "stdout", "-l", self.lang.as_str()]
    }

    /// Tesseract version line, used by `check`.
    #[cfg(not(feature = "ocr"))]
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| self.spawn_error(e))?;
        // Older releases print the version on stderr.
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Initializes libtesseract with the configured language, used by `check`.
    #[cfg(feature = "ocr")]
    pub fn version(&self) -> Result<String> {
        tesseract::Tesseract::new(None, Some(&self.lang)).map_err(ocr_error)?;
        Ok(format!("libtesseract (lang={})", self.lang))
    }

    #[cfg(not(feature = "ocr"))]
    fn spawn_error(&self, e: std::io::Error) -> AssistError {
        if e.kind() == ErrorKind::NotFound {
            AssistError::ToolMissing(self.program.clone())
        } else {
            AssistError::Io(e)
        }
    }
}

#[cfg(feature = "ocr")]
fn ocr_error<E: std::fmt::Display>(e: E) -> AssistError {
    AssistError::Ocr(e.to_string())
}

#[cfg(feature = "ocr")]
impl TextExtractor for Tesseract {
    fn extract(&self, image: &EncodedImage) -> Result<String> {
        info!("Running OCR with libtesseract (lang={})", self.lang);
        debug!("{} image bytes", image.data.len());

        let mut api = tesseract::Tesseract::new(None, Some(&self.lang))
            .map_err(ocr_error)?
            .set_image_from_mem(&image.data)
            .map_err(ocr_error)?;
        let text = api.get_text().map_err(ocr_error)?;

        info!("OCR extracted {} characters", text.trim().len());
        Ok(text)
    }
}

#[cfg(not(feature = "ocr"))]
impl TextExtractor for Tesseract {
    fn extract(&self, image: &EncodedImage) -> Result<String> {
        info!("Running OCR with {} (lang={})", self.program, self.lang);
        debug!("{} {}", self.program, self.args().join(" "));

        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // Tesseract reads all of stdin before writing, so no reader thread is needed.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&image.data) {
                // An early exit closes the pipe; the exit status below says why.
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(AssistError::ToolFailed {
                tool: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!("OCR extracted {} characters", text.trim().len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_image() -> EncodedImage {
        EncodedImage {
            mime_type: "image/png",
            data: vec![0u8; 8],
        }
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn library_failures_are_ocr_errors() {
        // Eight zero bytes are not an image; a missing language pack fails earlier.
        let ocr = Tesseract::new("tesseract", "eng");
        match ocr.extract(&blank_image()) {
            Err(AssistError::Ocr(message)) => assert!(!message.is_empty()),
            other => panic!("expected Ocr error, got {:?}", other),
        }
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn unknown_language_fails_initialization() {
        let ocr = Tesseract::new("tesseract", "no-such-language-pack");
        assert!(matches!(ocr.version(), Err(AssistError::Ocr(_))));
    }

    #[cfg(not(feature = "ocr"))]
    #[test]
    fn reads_stdin_writes_stdout_with_language() {
        let ocr = Tesseract::new("tesseract", "eng+fra");
        assert_eq!(ocr.args(), vec!["stdin", "stdout", "-l", "eng+fra"]);
    }

    #[cfg(not(feature = "ocr"))]
    #[test]
    fn missing_executable_is_reported_by_name() {
        let ocr = Tesseract::new("tesseract-that-is-not-installed", "eng");
        match ocr.extract(&blank_image()) {
            Err(AssistError::ToolMissing(name)) => assert_eq!(name, "tesseract-that-is-not-installed"),
            other => panic!("expected ToolMissing, got {:?}", other),
        }
        assert!(matches!(ocr.version(), Err(AssistError::ToolMissing(_))));
    }

    #[cfg(all(unix, not(feature = "ocr")))]
    #[test]
    fn non_zero_exit_is_tool_failure() {
        // `false` ignores its arguments and exits with status 1.
        let ocr = Tesseract::new("false", "eng");
        match ocr.extract(&blank_image()) {
            Err(AssistError::ToolFailed { tool, .. }) => assert_eq!(tool, "false"),
            other => panic!("expected ToolFailed, got {:?}", other),
        }
    }
}
