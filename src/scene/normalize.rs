//! Turns raw batch items into canonical [`Scene`]s.
//!
//! Two cleaning rules apply. [`clean_attribute`] feeds the human-readable
//! description and the continuity fingerprint, and blanks out placeholder
//! words the model uses for "nothing". [`clean_for_json`] feeds the
//! structured payload and only normalizes whitespace, so the payload keeps
//! whatever the model actually wrote.

use super::raw::{AmbientSound, RawCharacter, RawScene};
use super::Scene;
use crate::error::{Result, ScriptError};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use tracing::warn;

const PLACEHOLDERS: [&str; 6] = ["", "none", "n/a", "null", "unknown", "không có"];

const DEFAULT_START_SECS: i64 = 0;
const DEFAULT_END_SECS: i64 = 5;

/// Cleans a field for display: collapses whitespace and line breaks, strips
/// surrounding commas and periods, and maps placeholder values such as
/// `"N/A"` or `"none"` to the empty string.
pub fn clean_attribute(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = collapsed.trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace());
    if PLACEHOLDERS.contains(&stripped.to_lowercase().as_str()) {
        return String::new();
    }
    stripped.to_string()
}

/// Cleans a field for the structured payload: every whitespace run becomes
/// a single space and the ends are trimmed. Nothing else changes.
pub fn clean_for_json(text: Option<&str>) -> String {
    text.map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// Canonical per-scene payload handed to the video model.
///
/// Every key is always present; missing values are empty strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredPrompt {
    pub scene: u32,
    pub time: TimeWindow,
    pub continuity_reference: String,
    pub environment: EnvironmentPrompt,
    pub characters: Vec<CharacterPrompt>,
    pub camera: CameraPrompt,
    pub visual_style: VisualStylePrompt,
    pub dialogue: DialoguePrompt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Number,
    pub end: Number,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: Number::from(DEFAULT_START_SECS),
            end: Number::from(DEFAULT_END_SECS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPrompt {
    pub location: String,
    pub weather: String,
    pub ambient_sound: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterPrompt {
    pub name: String,
    pub appearance: String,
    pub outfit: String,
    pub emotion: String,
    pub actions: ActionsPrompt,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionsPrompt {
    pub body_movement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraPrompt {
    pub shot_type: String,
    pub movement: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualStylePrompt {
    pub style: String,
    pub lighting: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialoguePrompt {
    pub line: String,
    pub language: String,
}

impl StructuredPrompt {
    /// Builds the payload for `raw`, forcing the scene index to `scene_number`.
    pub fn from_raw(raw: &RawScene, scene_number: u32) -> Self {
        let environment = raw.environment.clone().unwrap_or_default();
        let camera = raw.camera.clone().unwrap_or_default();
        let visual_style = raw.visual_style.clone().unwrap_or_default();
        let dialogue = raw.dialogue.clone().unwrap_or_default();

        let ambient_sound = match &environment.ambient_sound {
            Some(AmbientSound::Many(sounds)) => sounds
                .iter()
                .map(|s| clean_for_json(Some(s)))
                .collect(),
            Some(AmbientSound::One(sound)) => {
                let sound = clean_for_json(Some(sound));
                if sound.is_empty() {
                    Vec::new()
                } else {
                    vec![sound]
                }
            }
            None => Vec::new(),
        };

        Self {
            scene: scene_number,
            time: time_window(raw),
            continuity_reference: clean_for_json(raw.continuity_reference.as_deref()),
            environment: EnvironmentPrompt {
                location: clean_for_json(environment.location.as_deref()),
                weather: clean_for_json(environment.weather.as_deref()),
                ambient_sound,
            },
            characters: raw.characters.iter().map(character_prompt).collect(),
            camera: CameraPrompt {
                shot_type: clean_for_json(camera.shot_type.as_deref()),
                movement: clean_for_json(camera.movement.as_deref()),
            },
            visual_style: VisualStylePrompt {
                style: clean_for_json(visual_style.style.as_deref()),
                lighting: clean_for_json(visual_style.lighting.as_deref()),
            },
            dialogue: DialoguePrompt {
                line: clean_for_json(dialogue.line.as_deref()),
                language: clean_for_json(dialogue.language.as_deref()),
            },
        }
    }
}

fn time_window(raw: &RawScene) -> TimeWindow {
    let default = TimeWindow::default();
    match &raw.time {
        Some(time) => TimeWindow {
            start: time.start.clone().unwrap_or(default.start),
            end: time.end.clone().unwrap_or(default.end),
        },
        None => default,
    }
}

fn character_prompt(c: &RawCharacter) -> CharacterPrompt {
    CharacterPrompt {
        name: clean_for_json(c.name.as_deref()),
        appearance: clean_for_json(c.appearance.as_deref()),
        outfit: clean_for_json(c.outfit.as_deref()),
        emotion: clean_for_json(c.emotion.as_deref()),
        actions: ActionsPrompt {
            body_movement: clean_for_json(c.body_movement()),
        },
    }
}

/// Normalizes one batch. Scene numbers are assigned from `start_index` by
/// position; whatever index the model reported is ignored.
pub fn normalize_batch(raws: &[RawScene], start_index: u32) -> Result<Vec<Scene>> {
    raws.iter()
        .enumerate()
        .map(|(offset, raw)| {
            let number = u32::try_from(offset)
                .ok()
                .and_then(|offset| start_index.checked_add(offset))
                .ok_or_else(|| {
                    ScriptError::InvalidInput(format!(
                        "scene {} of a batch starting at {} has no valid number",
                        offset + 1,
                        start_index
                    ))
                })?;
            normalize_scene(raw, number)
        })
        .collect()
}

pub fn normalize_scene(raw: &RawScene, scene_number: u32) -> Result<Scene> {
    let payload = StructuredPrompt::from_raw(raw, scene_number);
    let freeform = clean_for_json(raw.wishk_prompt.as_deref());

    Ok(Scene {
        scene_number,
        script_description: describe(raw, &payload.time, scene_number),
        structured_prompt: serde_json::to_string(&payload)?,
        freeform_prompt: (!freeform.is_empty()).then_some(freeform),
    })
}

impl Scene {
    /// Reads the structured payload back as a raw item.
    ///
    /// A payload that no longer parses yields an empty item, so the caller
    /// still gets a well-formed (if uninformative) result.
    pub fn payload(&self) -> RawScene {
        serde_json::from_str(&self.structured_prompt).unwrap_or_else(|e| {
            warn!(
                "Scene {} has an unreadable structured prompt: {}",
                self.scene_number, e
            );
            RawScene::default()
        })
    }
}

fn describe(raw: &RawScene, time: &TimeWindow, scene_number: u32) -> String {
    let mut parts = vec![format!(
        "Scene {} (Duration: {}s - {}s)",
        scene_number, time.start, time.end
    )];

    let continuity = clean_attribute(raw.continuity_reference.as_deref());
    if !continuity.is_empty() {
        parts.push(format!("Continues from: {}", continuity));
    }

    if let Some(env) = &raw.environment {
        let sounds = match &env.ambient_sound {
            Some(AmbientSound::Many(sounds)) => sounds
                .iter()
                .map(|s| clean_attribute(Some(s)))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
            Some(AmbientSound::One(sound)) => clean_attribute(Some(sound)),
            None => String::new(),
        };
        let env_line = labeled(&[
            ("Location", clean_attribute(env.location.as_deref())),
            ("Weather", clean_attribute(env.weather.as_deref())),
            ("Sound", sounds),
        ]);
        if !env_line.is_empty() {
            parts.push(env_line);
        }
    }

    let characters = raw
        .characters
        .iter()
        .map(describe_character)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>();
    if !characters.is_empty() {
        parts.push(format!("Characters: {}", characters.join("; ")));
    }

    if let Some(camera) = &raw.camera {
        let shots = [
            clean_attribute(camera.shot_type.as_deref()),
            clean_attribute(camera.movement.as_deref()),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
        if !shots.is_empty() {
            parts.push(format!("Camera: {}", shots.join(" | ")));
        }
    }

    if let Some(style) = &raw.visual_style {
        let style_line = labeled(&[
            ("Visual", clean_attribute(style.style.as_deref())),
            ("Light", clean_attribute(style.lighting.as_deref())),
        ]);
        if !style_line.is_empty() {
            parts.push(style_line);
        }
    }

    let dialogue = raw.dialogue.clone().unwrap_or_default();
    let line = clean_attribute(dialogue.line.as_deref());
    let language = clean_attribute(dialogue.language.as_deref());
    parts.push(match (line.is_empty(), language.is_empty()) {
        (true, _) => "Dialogue: none".to_string(),
        (false, true) => format!("Dialogue: \"{}\"", line),
        (false, false) => format!("Dialogue ({}): \"{}\"", language, line),
    });

    parts.join(" | ")
}

fn labeled(fields: &[(&str, String)]) -> String {
    fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(label, value)| format!("{}: {}", label, value))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn describe_character(c: &RawCharacter) -> String {
    let mut desc = clean_attribute(c.name.as_deref());

    let looks = [
        clean_attribute(c.appearance.as_deref()),
        clean_attribute(c.outfit.as_deref()),
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>();
    if !looks.is_empty() {
        desc.push_str(&format!(" [{}]", looks.join(", ")));
    }

    let emotion = clean_attribute(c.emotion.as_deref());
    if !emotion.is_empty() {
        desc.push_str(&format!(" (Emotion: {})", emotion));
    }

    let action = clean_attribute(c.body_movement());
    if !action.is_empty() {
        desc.push_str(&format!(" -> Action: {}", action));
    }

    desc.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawScene {
        serde_json::from_value(value).unwrap()
    }

    fn beach_item() -> RawScene {
        raw(json!({
            "scene": 9,
            "time": {"start": 0, "end": 8},
            "continuity_reference": "She is mid-stride,\nfacing the sea.",
            "environment": {
                "location": "Sandy beach at dusk",
                "weather": "N/A",
                "ambient_sound": ["waves", "  distant gulls "]
            },
            "characters": [{
                "name": "Linh",
                "appearance": "long black hair",
                "outfit": "white linen dress",
                "emotion": "calm",
                "actions": {"body_movement": "walks along the waterline"}
            }],
            "camera": {"shot_type": "wide shot", "movement": "slow dolly"},
            "visual_style": {"style": "Cinematic", "lighting": "golden hour"},
            "dialogue": {"line": "", "language": "None"},
            "wishk_prompt": "A woman walks\n\non a beach at dusk"
        }))
    }

    #[test]
    fn attribute_clean_blanks_placeholders_case_insensitively() {
        for placeholder in ["N/A", "none", "", "Không Có", "NULL", " Unknown ", "none."] {
            assert_eq!(clean_attribute(Some(placeholder)), "", "{placeholder:?}");
        }
        assert_eq!(clean_attribute(None), "");
    }

    #[test]
    fn attribute_clean_strips_edges_and_line_breaks() {
        assert_eq!(clean_attribute(Some(" ,red coat.\n")), "red coat");
        assert_eq!(
            clean_attribute(Some("walks\r\ntoward the\nwater")),
            "walks toward the water"
        );
    }

    #[test]
    fn json_clean_keeps_placeholders() {
        assert_eq!(clean_for_json(Some("N/A")), "N/A");
        assert_eq!(clean_for_json(Some("none")), "none");
        assert_eq!(clean_for_json(Some("Không Có")), "Không Có");
        assert_eq!(clean_for_json(Some("  a \n\n b\t c ")), "a b c");
        assert_eq!(clean_for_json(None), "");
    }

    #[test]
    fn scene_number_comes_from_position() {
        let items = vec![RawScene::default(), beach_item()];
        let scenes = normalize_batch(&items, 4).unwrap();
        assert_eq!(scenes[0].scene_number, 4);
        assert_eq!(scenes[1].scene_number, 5);

        let payload: StructuredPrompt = serde_json::from_str(&scenes[1].structured_prompt).unwrap();
        assert_eq!(payload.scene, 5);
    }

    #[test]
    fn empty_item_still_has_full_payload() {
        let scene = normalize_scene(&RawScene::default(), 1).unwrap();
        let value: serde_json::Value = serde_json::from_str(&scene.structured_prompt).unwrap();
        assert_eq!(value["time"], json!({"start": 0, "end": 5}));
        assert_eq!(value["environment"]["location"], "");
        assert_eq!(value["environment"]["ambient_sound"], json!([]));
        assert_eq!(value["characters"], json!([]));
        assert_eq!(value["camera"], json!({"shot_type": "", "movement": ""}));
        assert_eq!(value["dialogue"], json!({"line": "", "language": ""}));
        assert_eq!(scene.freeform_prompt, None);
        assert_eq!(
            scene.script_description,
            "Scene 1 (Duration: 0s - 5s) | Dialogue: none"
        );
    }

    #[test]
    fn description_skips_empty_parts() {
        let scene = normalize_scene(&beach_item(), 1).unwrap();
        assert_eq!(
            scene.script_description,
            "Scene 1 (Duration: 0s - 8s) \
             | Continues from: She is mid-stride, facing the sea \
             | Location: Sandy beach at dusk | Sound: waves, distant gulls \
             | Characters: Linh [long black hair, white linen dress] (Emotion: calm) -> Action: walks along the waterline \
             | Camera: wide shot | slow dolly \
             | Visual: Cinematic | Light: golden hour \
             | Dialogue: none"
        );
        assert_eq!(
            scene.freeform_prompt.as_deref(),
            Some("A woman walks on a beach at dusk")
        );
    }

    #[test]
    fn payload_keeps_placeholder_text() {
        let scene = normalize_scene(&beach_item(), 1).unwrap();
        let payload: StructuredPrompt = serde_json::from_str(&scene.structured_prompt).unwrap();
        assert_eq!(payload.environment.weather, "N/A");
        assert_eq!(payload.environment.ambient_sound, vec!["waves", "distant gulls"]);
        assert_eq!(payload.continuity_reference, "She is mid-stride, facing the sea.");
        assert_eq!(payload.dialogue.language, "None");
    }

    #[test]
    fn single_ambient_sound_becomes_a_list() {
        let item = raw(json!({"environment": {"ambient_sound": "rain on a tin roof"}}));
        let payload = StructuredPrompt::from_raw(&item, 1);
        assert_eq!(payload.environment.ambient_sound, vec!["rain on a tin roof"]);
    }

    #[test]
    fn renormalizing_a_payload_is_stable() {
        let messy = raw(json!({
            "time": {"start": "1", "end": 6.5},
            "continuity_reference": "  hand   raised \n",
            "environment": {"location": "rooftop,", "ambient_sound": "wind"},
            "characters": [{"name": "Minh", "outfit": "none"}, {"emotion": "tense"}],
            "camera": {"shot_type": "close-up"},
            "dialogue": {"line": "Wait  here.", "language": "English"}
        }));
        let first = normalize_scene(&messy, 3).unwrap();
        let second = normalize_scene(&first.payload(), 3).unwrap();
        assert_eq!(first.structured_prompt, second.structured_prompt);
        assert_eq!(first.script_description, second.script_description);
    }

    #[test]
    fn numbering_stops_at_the_largest_scene_number() {
        let items = vec![beach_item(), beach_item()];
        let scenes = normalize_batch(&items, u32::MAX - 1).unwrap();
        assert_eq!(scenes[1].scene_number, u32::MAX);

        let items = vec![beach_item(), beach_item(), beach_item()];
        assert!(matches!(
            normalize_batch(&items, u32::MAX - 1),
            Err(ScriptError::InvalidInput(_))
        ));
    }
}
