pub mod normalize;
pub mod raw;

use crate::error::{Result, ScriptError};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Scene count used when a fresh run is given no usable count.
pub const DEFAULT_PROMPT_COUNT: u32 = 5;

/// Spoken language requested for scene dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DialogueLanguage {
    #[default]
    None,
    Vietnamese,
    English,
}

impl DialogueLanguage {
    /// Label written into the instruction and the dialogue schema.
    pub fn label(self) -> &'static str {
        match self {
            DialogueLanguage::None => "None",
            DialogueLanguage::Vietnamese => "Vietnamese",
            DialogueLanguage::English => "English",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    /// Varied camera work between scenes.
    #[default]
    Default,
    /// One locked-off take for the whole video.
    CameraLock,
}

/// Input to one generation run, reused unchanged for every batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub idea: String,
    /// Number of scenes wanted. `None` or zero falls back to
    /// [`DEFAULT_PROMPT_COUNT`] on a fresh run.
    pub prompt_count: Option<u32>,
    pub video_style: String,
    pub aspect_ratio: String,
    pub dialogue_language: DialogueLanguage,
    pub prompt_type: PromptType,
}

impl GenerationOptions {
    pub fn new(idea: impl Into<String>, prompt_count: u32) -> Self {
        Self {
            idea: idea.into(),
            prompt_count: Some(prompt_count),
            ..Self::default()
        }
    }

    /// Target scene count for a fresh run.
    pub fn target_count(&self) -> usize {
        match self.prompt_count {
            Some(count) if count > 0 => count as usize,
            _ => DEFAULT_PROMPT_COUNT as usize,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            idea: String::new(),
            prompt_count: None,
            video_style: "Cinematic".to_string(),
            aspect_ratio: "16:9".to_string(),
            dialogue_language: DialogueLanguage::None,
            prompt_type: PromptType::Default,
        }
    }
}

/// One numbered unit of generated video content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    /// Human-readable one-line summary of the scene.
    pub script_description: String,
    /// Canonical JSON payload for the video model, serialized.
    pub structured_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub story_summary: String,
    pub scenes: Vec<Scene>,
}

impl Script {
    pub fn last_scene(&self) -> Option<&Scene> {
        self.scenes.last()
    }

    /// Appends the result of an extension run. The new scenes must pick up
    /// numbering right after the current tail.
    pub fn extend(&mut self, new_scenes: Vec<Scene>) -> Result<()> {
        let mut previous = self.last_scene().map_or(0, |s| s.scene_number);
        for scene in &new_scenes {
            if previous.checked_add(1) != Some(scene.scene_number) {
                return Err(ScriptError::InvalidInput(format!(
                    "extension scene {} does not follow scene {}",
                    scene.scene_number, previous
                )));
            }
            previous = scene.scene_number;
        }
        self.scenes.extend(new_scenes);
        Ok(())
    }

    /// All structured prompts, one per paragraph.
    pub fn structured_prompts(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.structured_prompt.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// All non-empty freeform prompts, one per paragraph.
    pub fn freeform_prompts(&self) -> String {
        self.scenes
            .iter()
            .filter_map(|s| s.freeform_prompt.as_deref())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
