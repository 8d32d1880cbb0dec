//! Scripted text model for driving the generator without network calls.

#![allow(dead_code)]

use async_trait::async_trait;
use seamless_script::api::{GenerationRequest, TextModel};
use seamless_script::error::{RemoteErrorKind, Result, ScriptError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A single scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// The model answered but produced no text.
    Empty,
    Error(RemoteErrorKind, String),
}

impl MockReply {
    pub fn batch(summary: &str, scenes: Vec<Value>) -> Self {
        MockReply::Text(json!({ "story_summary": summary, "scenes": scenes }).to_string())
    }

    pub fn busy() -> Self {
        MockReply::Error(
            RemoteErrorKind::RateLimited,
            "HTTP 429: RESOURCE_EXHAUSTED quota exceeded".to_string(),
        )
    }

    pub fn broken() -> Self {
        MockReply::Error(RemoteErrorKind::Other, "connection reset by peer".to_string())
    }
}

/// Replies in order; once the queue is empty the fallback repeats forever.
pub struct MockModel {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new(replies: Vec<MockReply>) -> Arc<Self> {
        Self::with_fallback(replies, MockReply::broken())
    }

    pub fn with_fallback(replies: Vec<MockReply>, fallback: MockReply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn repeating(reply: MockReply) -> Arc<Self> {
        Self::with_fallback(Vec::new(), reply)
    }

    pub fn slow(reply: MockReply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: reply,
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextModel for MockModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            MockReply::Text(text) => Ok(Some(text)),
            MockReply::Empty => Ok(None),
            MockReply::Error(kind, message) => Err(ScriptError::remote(kind, message)),
        }
    }
}

/// A well-formed scene item. `scene` is what the model claims, not what the
/// generator will assign.
pub fn scene_item(scene: u32, location: &str, action: &str) -> Value {
    json!({
        "scene": scene,
        "time": {"start": 0, "end": 5},
        "continuity_reference": format!("continues into {action}"),
        "environment": {
            "location": location,
            "weather": "clear",
            "ambient_sound": ["waves"]
        },
        "characters": [{
            "name": "Linh",
            "appearance": "long black hair",
            "outfit": "white linen dress",
            "emotion": "calm",
            "actions": {"body_movement": action}
        }],
        "camera": {"shot_type": "wide shot", "movement": "slow dolly"},
        "visual_style": {"style": "Cinematic", "lighting": "golden hour"},
        "dialogue": {"line": "", "language": "None"},
        "wishk_prompt": format!("Linh {action} at {location}")
    })
}

/// `count` well-formed items claiming scene numbers from `first`.
pub fn scene_items(first: u32, count: u32) -> Vec<Value> {
    (first..first + count)
        .map(|n| scene_item(n, &format!("spot {n}"), &format!("step {n}")))
        .collect()
}

/// Collects progress messages.
#[derive(Default)]
pub struct ProgressLog(Mutex<Vec<String>>);

impl ProgressLog {
    pub fn record(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}
