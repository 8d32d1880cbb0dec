//! Loosely-typed model output.
//!
//! The model is asked for a fixed schema but routinely drops fields, swaps a
//! string for an array, or returns numbers as strings. Everything here is
//! optional and decoded leniently: a malformed leaf becomes `None` instead of
//! rejecting the whole batch. Only the envelope itself is strict.

use crate::error::{Result, ScriptError};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::warn;

/// The `{ story_summary, scenes }` envelope of one batch response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub story_summary: Option<String>,
    pub scenes: Vec<RawScene>,
}

impl RawBatch {
    /// Parses the text body of a batch response.
    ///
    /// Markdown code fences around the JSON are tolerated. Scene items that
    /// are not JSON objects are dropped.
    pub fn parse(text: &str) -> Result<Self> {
        let json_text = strip_code_fence(text);
        let value: Value = serde_json::from_str(json_text)
            .map_err(|e| ScriptError::MalformedJson(e.to_string()))?;

        let Value::Object(mut envelope) = value else {
            return Err(ScriptError::MalformedJson(
                "expected a JSON object with `story_summary` and `scenes`".to_string(),
            ));
        };

        let story_summary = envelope.remove("story_summary").and_then(loose_text);
        let items = match envelope.remove("scenes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(ScriptError::MalformedJson(format!(
                    "`scenes` must be an array, got {}",
                    json_type(&other)
                )))
            }
        };

        let total = items.len();
        let scenes: Vec<RawScene> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if scenes.len() < total {
            warn!("Dropped {} unusable scene items", total - scenes.len());
        }

        Ok(Self {
            story_summary,
            scenes,
        })
    }
}

/// One scene item as the model returned it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawScene {
    /// Index the model claims for this scene. Never trusted for numbering.
    #[serde(default, deserialize_with = "lenient")]
    pub scene: Option<Number>,
    #[serde(default, deserialize_with = "lenient")]
    pub time: Option<RawTime>,
    #[serde(default, deserialize_with = "text")]
    pub continuity_reference: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub environment: Option<RawEnvironment>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub characters: Vec<RawCharacter>,
    #[serde(default, deserialize_with = "lenient")]
    pub camera: Option<RawCamera>,
    #[serde(default, deserialize_with = "lenient")]
    pub visual_style: Option<RawVisualStyle>,
    #[serde(default, deserialize_with = "lenient")]
    pub dialogue: Option<RawDialogue>,
    #[serde(default, deserialize_with = "text")]
    pub wishk_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTime {
    #[serde(default, deserialize_with = "number")]
    pub start: Option<Number>,
    #[serde(default, deserialize_with = "number")]
    pub end: Option<Number>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawEnvironment {
    #[serde(default, deserialize_with = "text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub weather: Option<String>,
    #[serde(default, deserialize_with = "ambient")]
    pub ambient_sound: Option<AmbientSound>,
}

/// `ambient_sound` arrives either as one string or as a list.
#[derive(Debug, Clone, PartialEq)]
pub enum AmbientSound {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCharacter {
    #[serde(default, deserialize_with = "text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub appearance: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub outfit: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub emotion: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub actions: Option<RawActions>,
}

impl RawCharacter {
    pub fn body_movement(&self) -> Option<&str> {
        self.actions.as_ref()?.body_movement.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawActions {
    #[serde(default, deserialize_with = "text")]
    pub body_movement: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCamera {
    #[serde(default, deserialize_with = "text")]
    pub shot_type: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub movement: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawVisualStyle {
    #[serde(default, deserialize_with = "text")]
    pub style: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub lighting: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawDialogue {
    #[serde(default, deserialize_with = "text")]
    pub line: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub language: Option<String>,
}

fn strip_code_fence(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn loose_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn loose_number(value: Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Number::from)
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64))
        }
        _ => None,
    }
}

fn text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_text(Value::deserialize(deserializer)?))
}

fn number<'de, D>(deserializer: D) -> std::result::Result<Option<Number>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_number(Value::deserialize(deserializer)?))
}

fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn ambient<'de, D>(deserializer: D) -> std::result::Result<Option<AmbientSound>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(AmbientSound::Many(
            items.into_iter().filter_map(loose_text).collect(),
        )),
        other => loose_text(other).map(AmbientSound::One),
    })
}
