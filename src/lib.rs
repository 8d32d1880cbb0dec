//! Long, continuity-locked scene scripts for text-to-video models.
//!
//! A single idea is expanded into numbered scenes by asking a text model for
//! small batches, each seeded with a fingerprint of how the previous batch
//! ended. Every scene carries a canonical JSON payload for the video model
//! and an optional freeform prompt.

pub mod api;
pub mod batch;
pub mod continuity;
pub mod error;
pub mod generator;
pub mod retry;
pub mod scene;

pub use api::{GeminiClient, GeminiConfig, KeyValidator, TextModel};
pub use error::{Result, ScriptError};
pub use generator::{GeneratorConfig, ScriptGenerator};
pub use retry::{OnProgress, RetryPolicy};
pub use scene::{DialogueLanguage, GenerationOptions, PromptType, Scene, Script};

/// Generates a fresh script against Gemini with `api_key`.
pub async fn generate_script(
    options: &GenerationOptions,
    api_key: &str,
    on_progress: OnProgress<'_>,
) -> Result<Script> {
    let client = GeminiClient::new(GeminiConfig::new(api_key))?;
    ScriptGenerator::new(client)
        .generate_script(options, on_progress)
        .await
}

/// Generates `count` scenes continuing from `last_scene` against Gemini.
pub async fn extend_script(
    last_scene: &Scene,
    extension_idea: &str,
    count: u32,
    options: &GenerationOptions,
    api_key: &str,
    on_progress: OnProgress<'_>,
) -> Result<Vec<Scene>> {
    let client = GeminiClient::new(GeminiConfig::new(api_key))?;
    ScriptGenerator::new(client)
        .extend_script(last_scene, extension_idea, count, options, on_progress)
        .await
}
