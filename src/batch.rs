use crate::api::{GenerationRequest, TextModel};
use crate::continuity::ContinuityState;
use crate::error::{Result, ScriptError};
use crate::scene::raw::{RawBatch, RawScene};
use crate::scene::{DialogueLanguage, GenerationOptions, PromptType};
use tracing::{debug, instrument};

/// Most scenes ever requested in one call.
pub const MAX_BATCH_SIZE: u32 = 5;

/// Everything needed to ask for the next run of scenes.
#[derive(Debug, Clone)]
pub struct BatchRequest<'a> {
    pub options: &'a GenerationOptions,
    /// Idea the run is built around. For extensions this already includes
    /// the extension idea.
    pub core_idea: &'a str,
    pub start_scene_number: u32,
    pub batch_size: u32,
    pub continuity: &'a ContinuityState,
    pub story_summary: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutput {
    pub scenes: Vec<RawScene>,
    /// The model's updated summary, or the running one if it sent none.
    pub summary: String,
}

impl BatchRequest<'_> {
    pub fn is_first_batch(&self) -> bool {
        self.start_scene_number == 1
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ScriptError::InvalidInput(format!(
                "batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.start_scene_number == 0 {
            return Err(ScriptError::InvalidInput(
                "scene numbers start at 1".to_string(),
            ));
        }
        if self
            .start_scene_number
            .checked_add(self.batch_size - 1)
            .is_none()
        {
            return Err(ScriptError::InvalidInput(format!(
                "{} scenes starting at scene {} exceed the largest scene number",
                self.batch_size, self.start_scene_number
            )));
        }
        if self.continuity.is_opening() && !self.is_first_batch() {
            return Err(ScriptError::InvalidInput(format!(
                "scene {} cannot start without a continuity fingerprint",
                self.start_scene_number
            )));
        }
        Ok(())
    }

    fn end_scene_number(&self) -> u32 {
        self.start_scene_number
            .saturating_add(self.batch_size.saturating_sub(1))
    }

    /// The full instruction block sent to the model.
    pub fn instruction(&self) -> String {
        let options = self.options;

        let context = if self.is_first_batch() {
            format!(
                "CORE IDEA: \"{}\"\nSTART: Begin Scene 1 according to the core idea.",
                self.core_idea
            )
        } else {
            format!(
                "CORE IDEA: \"{idea}\"\n\
                 STORY SO FAR: \"{summary}\"\n\n\
                 CRITICAL - PREVIOUS SCENE ENDING VISUALS:\n\"{continuity}\"\n\n\
                 TASK: Start Scene {start} EXACTLY where the previous scene ended.",
                idea = self.core_idea,
                summary = self.story_summary,
                continuity = self.continuity,
                start = self.start_scene_number,
            )
        };

        let camera_rule = match options.prompt_type {
            PromptType::Default => {
                "5. **CAMERA**: Maintain smooth camera flow between scenes.".to_string()
            }
            PromptType::CameraLock => "5. **CAMERA LOCK**: This is one locked-off take. \
                 Keep the exact same shot type and framing in every scene and set \
                 camera.movement to \"static\"."
                .to_string(),
        };

        let dialogue_rule = match options.dialogue_language {
            DialogueLanguage::None => {
                "6. **DIALOGUE**: No spoken dialogue. Leave dialogue.line empty.".to_string()
            }
            language => format!(
                "6. **DIALOGUE**: Any spoken line must be in {}.",
                language.label()
            ),
        };

        format!(
            r#"You are a world-class AI Cinematographer specializing in SINGLE-TAKE / CONTINUOUS SHOT videos.
Your task is to generate JSON prompts for Scene {start} to {end}.
Aspect ratio: {aspect}. Visual style: {style}.

{context}

ABSOLUTE RULES FOR SEAMLESS CONTINUITY:
1. **NO CUTS**: Treat this as a continuous video stream. Scene N starts visually exactly where Scene N-1 ended.
2. **LOCK ENVIRONMENT**: Do NOT change the location, background, time of day, or weather unless the characters physically travel there in the scene.
3. **LOCK CHARACTERS**: Characters must have the EXACT SAME appearance (clothes, hair, face) as described in the previous scene.
4. **FLOW**: If a scene ends with a character raising a hand, the next scene MUST start with that hand raised.
{camera_rule}
{dialogue_rule}

JSON OUTPUT STRUCTURE (must be valid JSON, exactly {count} scenes):
{{
  "story_summary": "Updated summary of the whole story so far",
  "scenes": [
    {{
      "scene": <number>,
      "time": {{ "start": 0, "end": 5 }},
      "continuity_reference": "Describe the EXACT visual state from the end of the previous scene to match here.",
      "environment": {{ "location": "SAME AS PREVIOUS", "weather": "SAME AS PREVIOUS", "ambient_sound": ["..."] }},
      "characters": [
        {{
          "name": "...",
          "appearance": "MUST MATCH PREVIOUS",
          "outfit": "MUST MATCH PREVIOUS",
          "emotion": "...",
          "actions": {{ "body_movement": "Action that flows naturally from the previous scene..." }}
        }}
      ],
      "camera": {{ "shot_type": "...", "movement": "..." }},
      "visual_style": {{ "style": "{style}", "lighting": "..." }},
      "dialogue": {{ "line": "...", "language": "{language}" }},
      "wishk_prompt": "A detailed descriptive prompt describing this specific frame moment."
    }}
  ]
}}
"#,
            start = self.start_scene_number,
            end = self.end_scene_number(),
            count = self.batch_size,
            aspect = options.aspect_ratio,
            style = options.video_style,
            language = options.dialogue_language.label(),
            context = context,
            camera_rule = camera_rule,
            dialogue_rule = dialogue_rule,
        )
    }
}

/// Requests one batch of raw scenes. Stateless; the caller threads the
/// continuity fingerprint and summary between calls.
#[instrument(skip_all, fields(start = request.start_scene_number, size = request.batch_size))]
pub async fn request_batch<M>(model: &M, request: &BatchRequest<'_>) -> Result<BatchOutput>
where
    M: TextModel + ?Sized,
{
    request.validate()?;

    let text = model
        .generate(&GenerationRequest::json(request.instruction()))
        .await?
        .filter(|t| !t.trim().is_empty())
        .ok_or(ScriptError::EmptyResponse)?;

    let batch = RawBatch::parse(&text)?;
    debug!(scenes = batch.scenes.len(), "Batch parsed");

    let summary = batch
        .story_summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| request.story_summary.to_string());

    Ok(BatchOutput {
        scenes: batch.scenes,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuity::RunKind;
    use crate::scene::Scene;

    fn options() -> GenerationOptions {
        GenerationOptions::new("a walk on a beach", 10)
    }

    fn tail_scene() -> Scene {
        Scene {
            scene_number: 5,
            script_description: String::new(),
            structured_prompt: r#"{"environment":{"location":"beach"}}"#.to_string(),
            freeform_prompt: None,
        }
    }

    #[test]
    fn first_batch_states_the_idea_once() {
        let options = options();
        let opening = ContinuityState::opening();
        let request = BatchRequest {
            options: &options,
            core_idea: &options.idea,
            start_scene_number: 1,
            batch_size: 5,
            continuity: &opening,
            story_summary: "",
        };
        let text = request.instruction();
        assert_eq!(text.matches("a walk on a beach").count(), 1);
        assert!(text.contains("Scene 1 to 5"));
        assert!(text.contains("START: Begin Scene 1"));
        assert!(!text.contains("STORY SO FAR"));
    }

    #[test]
    fn later_batches_carry_summary_and_fingerprint() {
        let options = options();
        let continuity = ContinuityState::from_scene(&tail_scene(), RunKind::Fresh);
        let request = BatchRequest {
            options: &options,
            core_idea: &options.idea,
            start_scene_number: 6,
            batch_size: 3,
            continuity: &continuity,
            story_summary: "She reaches the pier.",
        };
        let text = request.instruction();
        assert!(text.contains("STORY SO FAR: \"She reaches the pier.\""));
        assert!(text.contains(continuity.as_str()));
        assert!(text.contains("Start Scene 6 EXACTLY"));
        assert!(text.contains("Scene 6 to 8"));
    }

    #[test]
    fn camera_lock_and_dialogue_rules() {
        let mut options = options();
        options.prompt_type = PromptType::CameraLock;
        options.dialogue_language = DialogueLanguage::Vietnamese;
        let opening = ContinuityState::opening();
        let request = BatchRequest {
            options: &options,
            core_idea: &options.idea,
            start_scene_number: 1,
            batch_size: 1,
            continuity: &opening,
            story_summary: "",
        };
        let text = request.instruction();
        assert!(text.contains("CAMERA LOCK"));
        assert!(text.contains("must be in Vietnamese"));
        assert!(text.contains(r#""language": "Vietnamese""#));
    }

    #[test]
    fn rejects_out_of_range_requests() {
        let options = options();
        let opening = ContinuityState::opening();
        let base = BatchRequest {
            options: &options,
            core_idea: &options.idea,
            start_scene_number: 1,
            batch_size: 5,
            continuity: &opening,
            story_summary: "",
        };
        assert!(base.validate().is_ok());
        assert!(BatchRequest { batch_size: 6, ..base.clone() }.validate().is_err());
        assert!(BatchRequest { batch_size: 0, ..base.clone() }.validate().is_err());
        assert!(BatchRequest { start_scene_number: 0, ..base.clone() }.validate().is_err());
        assert!(BatchRequest { start_scene_number: 4, ..base }.validate().is_err());
    }

    #[test]
    fn rejects_batches_past_the_last_scene_number() {
        let options = options();
        let continuity = ContinuityState::from_scene(&tail_scene(), RunKind::Extension);
        let request = BatchRequest {
            options: &options,
            core_idea: &options.idea,
            start_scene_number: u32::MAX - 1,
            batch_size: 2,
            continuity: &continuity,
            story_summary: "",
        };
        assert!(request.validate().is_ok());
        assert!(request.instruction().contains(&format!("to {}", u32::MAX)));
        assert!(matches!(
            BatchRequest { batch_size: 3, ..request }.validate(),
            Err(ScriptError::InvalidInput(_))
        ));
    }
}
