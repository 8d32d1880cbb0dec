pub mod gemini;
pub mod key;

pub use gemini::{GeminiClient, GeminiConfig};
pub use key::KeyValidator;

use crate::error::Result;
use async_trait::async_trait;

/// Default model for both batch generation and the key probe.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Sampling temperature for batch generation, kept low for stable output.
pub const BATCH_TEMPERATURE: f32 = 0.4;

/// One call to the remote text model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The single instruction block sent as the user turn.
    pub prompt: String,
    /// Ask the model for a strict JSON body.
    pub json_response: bool,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    /// A strict-JSON request at the batch temperature.
    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            json_response: true,
            temperature: Some(BATCH_TEMPERATURE),
        }
    }

    /// A plain-text request with provider defaults.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            json_response: false,
            temperature: None,
        }
    }
}

/// The remote model seam.
///
/// Implementations return the response text, or `None` when the model
/// produced no text. Failures must come back as
/// [`ScriptError::Remote`](crate::error::ScriptError::Remote) with the kind
/// already classified, so callers never inspect message text.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>>;
}

#[async_trait]
impl<T: TextModel + ?Sized> TextModel for std::sync::Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>> {
        (**self).generate(request).await
    }
}
