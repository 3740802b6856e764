// src/ai/connector.rs
use crate::error::Result;
use crate::input::upload::EncodedImage;

/// Trait defining the interface for a vision-capable text generation model
pub trait VisionModel: Send + Sync {
    /// Send a prompt together with an image and return the model's text response
    fn generate(&self, prompt: &str, image: &EncodedImage) -> Result<String>;

    /// Model name, for display
    fn name(&self) -> &str;

    /// Names of the models the backend can serve
    fn available_models(&self) -> Result<Vec<String>>;
}
