use crate::scene::normalize::clean_attribute;
use crate::scene::Scene;
use std::fmt;

const OPENING: &str = "Beginning of the video.";

/// Which run the fingerprint feeds. Fresh runs also carry the camera shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Fresh,
    Extension,
}

/// Short text describing how the previous scene ended, pasted verbatim into
/// the next batch's instruction. It steers the model and is not parsed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuityState(String);

impl ContinuityState {
    /// Sentinel for a run that has not produced any scene yet.
    pub fn opening() -> Self {
        Self(OPENING.to_string())
    }

    pub fn is_opening(&self) -> bool {
        self.0 == OPENING
    }

    /// Fingerprint of the ending state of `scene`, read from its structured
    /// payload. Only the first character contributes action and outfit.
    pub fn from_scene(scene: &Scene, kind: RunKind) -> Self {
        let payload = scene.payload();
        let location = payload
            .environment
            .as_ref()
            .and_then(|env| env.location.as_deref());
        let lead = payload.characters.first();

        let mut lines = vec![
            format!("LAST SCENE NUMBER: {}", scene.scene_number),
            format!("LAST LOCATION: {}", clean_attribute(location)),
            format!(
                "LAST ACTION: {}",
                clean_attribute(lead.and_then(|c| c.body_movement()))
            ),
            format!(
                "LAST OUTFIT: {}",
                clean_attribute(lead.and_then(|c| c.outfit.as_deref()))
            ),
        ];
        if kind == RunKind::Fresh {
            let shot = payload
                .camera
                .as_ref()
                .and_then(|camera| camera.shot_type.as_deref());
            lines.push(format!("LAST CAMERA: {}", clean_attribute(shot)));
        }
        Self(lines.join("\n"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
