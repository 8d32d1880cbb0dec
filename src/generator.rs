//! Drives batches until a script reaches its target length.
//!
//! Batches run strictly one after another: each instruction embeds the
//! fingerprint of the previous batch's last scene, so there is nothing to
//! parallelize.

use crate::api::TextModel;
use crate::batch::{request_batch, BatchOutput, BatchRequest, MAX_BATCH_SIZE};
use crate::continuity::{ContinuityState, RunKind};
use crate::error::{Result, ScriptError};
use crate::retry::{with_retry, OnProgress, RetryPolicy};
use crate::scene::normalize::normalize_batch;
use crate::scene::{GenerationOptions, Scene, Script};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Running summary handed to every extension batch.
pub const EXTENSION_SUMMARY: &str = "Continuing seamlessly...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Scenes per batch, capped at [`MAX_BATCH_SIZE`].
    pub batch_size: u32,
    /// Consecutive failed batches tolerated before the run gives up.
    pub failure_budget: u32,
    /// Pause between successful batches.
    pub batch_pause: Duration,
    /// Pause after a batch that raised an error.
    pub failure_pause: Duration,
    pub retry: RetryPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            failure_budget: 5,
            batch_pause: Duration::from_millis(1500),
            failure_pause: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

/// State owned by a single generation call.
#[derive(Debug)]
struct RunState {
    kind: RunKind,
    target_count: usize,
    first_scene_number: u32,
    core_idea: String,
    accumulated: Vec<Scene>,
    continuity: ContinuityState,
    story_summary: String,
    consecutive_failures: u32,
}

impl RunState {
    fn remaining(&self) -> usize {
        self.target_count - self.accumulated.len()
    }

    fn next_scene_number(&self) -> u32 {
        self.first_scene_number + self.accumulated.len() as u32
    }

    fn is_done(&self) -> bool {
        self.accumulated.len() >= self.target_count
    }

    /// Folds one successful batch into the run. A batch that yields no
    /// usable scene counts as a failure.
    fn accept(&mut self, batch: BatchOutput, start: u32, remaining: usize) {
        if self.kind == RunKind::Fresh && self.story_summary.is_empty() {
            self.story_summary = batch.summary;
        }

        if batch.scenes.len() > remaining {
            warn!(
                "Model returned {} scenes, keeping the first {}",
                batch.scenes.len(),
                remaining
            );
        }
        let usable = &batch.scenes[..batch.scenes.len().min(remaining)];
        let scenes = match normalize_batch(usable, start) {
            Ok(scenes) => scenes,
            Err(e) => {
                warn!("Could not normalize batch: {}", e);
                Vec::new()
            }
        };

        let Some(last) = scenes.last() else {
            self.consecutive_failures += 1;
            warn!(
                failures = self.consecutive_failures,
                "Batch returned 0 usable scenes"
            );
            return;
        };

        let last_number = last.scene_number;
        self.continuity = ContinuityState::from_scene(last, self.kind);
        self.accumulated.extend(scenes);
        self.consecutive_failures = 0;
        info!(
            "Accepted scenes up to {} ({}/{})",
            last_number,
            self.accumulated.len(),
            self.target_count
        );
    }
}

pub struct ScriptGenerator<M> {
    model: M,
    config: GeneratorConfig,
}

impl<M: TextModel> ScriptGenerator<M> {
    pub fn new(model: M) -> Self {
        Self::with_config(model, GeneratorConfig::default())
    }

    pub fn with_config(model: M, config: GeneratorConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates a fresh script of `options.prompt_count` scenes numbered
    /// from 1.
    #[instrument(skip_all)]
    pub async fn generate_script(
        &self,
        options: &GenerationOptions,
        on_progress: OnProgress<'_>,
    ) -> Result<Script> {
        if options.idea.trim().is_empty() {
            return Err(ScriptError::InvalidInput(
                "the video idea must not be empty".to_string(),
            ));
        }

        let state = RunState {
            kind: RunKind::Fresh,
            target_count: options.target_count(),
            first_scene_number: 1,
            core_idea: options.idea.clone(),
            accumulated: Vec::new(),
            continuity: ContinuityState::opening(),
            story_summary: String::new(),
            consecutive_failures: 0,
        };
        info!(count = state.target_count, "Starting fresh script");

        let state = self.run(state, options, on_progress).await?;
        Ok(Script {
            story_summary: state.story_summary,
            scenes: state.accumulated,
        })
    }

    /// Generates `count` scenes that continue seamlessly from `last_scene`,
    /// numbered from `last_scene.scene_number + 1`.
    #[instrument(skip_all, fields(anchor = last_scene.scene_number, count = count))]
    pub async fn extend_script(
        &self,
        last_scene: &Scene,
        extension_idea: &str,
        count: u32,
        options: &GenerationOptions,
        on_progress: OnProgress<'_>,
    ) -> Result<Vec<Scene>> {
        if count == 0 {
            return Err(ScriptError::InvalidInput(
                "the number of scenes to add must be positive".to_string(),
            ));
        }
        if last_scene.scene_number == 0 {
            return Err(ScriptError::InvalidInput(
                "the anchor scene has no valid scene number".to_string(),
            ));
        }
        let first_scene_number = last_scene
            .scene_number
            .checked_add(1)
            .filter(|first| first.checked_add(count - 1).is_some())
            .ok_or_else(|| {
                ScriptError::InvalidInput(format!(
                    "{} more scenes after scene {} exceed the largest scene number",
                    count, last_scene.scene_number
                ))
            })?;

        let core_idea = merge_ideas(&options.idea, extension_idea);
        if core_idea.is_empty() {
            return Err(ScriptError::InvalidInput(
                "an idea is required to extend a script".to_string(),
            ));
        }

        let state = RunState {
            kind: RunKind::Extension,
            target_count: count as usize,
            first_scene_number,
            core_idea,
            accumulated: Vec::new(),
            continuity: ContinuityState::from_scene(last_scene, RunKind::Extension),
            story_summary: EXTENSION_SUMMARY.to_string(),
            consecutive_failures: 0,
        };
        info!("Extending script after scene {}", last_scene.scene_number);

        let state = self.run(state, options, on_progress).await?;
        Ok(state.accumulated)
    }

    async fn run(
        &self,
        mut state: RunState,
        options: &GenerationOptions,
        on_progress: OnProgress<'_>,
    ) -> Result<RunState> {
        let batch_limit = self.config.batch_size.clamp(1, MAX_BATCH_SIZE) as usize;

        while !state.is_done() {
            if state.consecutive_failures >= self.config.failure_budget {
                error!(
                    failures = state.consecutive_failures,
                    produced = state.accumulated.len(),
                    "Giving up on generation"
                );
                return Err(ScriptError::GenerationExhausted {
                    target: state.target_count,
                    produced: state.accumulated.len(),
                    failures: state.consecutive_failures,
                });
            }

            let remaining = state.remaining();
            let batch_size = batch_limit.min(remaining);
            let start = state.next_scene_number();

            let message = format!(
                "Generating the next {} scenes seamlessly ({}/{} done)...",
                batch_size,
                state.accumulated.len(),
                state.target_count
            );
            debug!("{}", message);
            on_progress(&message);

            let request = BatchRequest {
                options,
                core_idea: &state.core_idea,
                start_scene_number: start,
                batch_size: batch_size as u32,
                continuity: &state.continuity,
                story_summary: &state.story_summary,
            };
            let result = with_retry(&self.config.retry, on_progress, || {
                request_batch(&self.model, &request)
            })
            .await;

            match result {
                Ok(batch) => {
                    state.accept(batch, start, remaining);
                    if !state.is_done() {
                        tokio::time::sleep(self.config.batch_pause).await;
                    }
                }
                Err(e @ ScriptError::InvalidInput(_)) => return Err(e),
                Err(e) => {
                    state.consecutive_failures += 1;
                    error!(failures = state.consecutive_failures, "Batch error: {}", e);
                    on_progress(&format!("Connection error: {}. Retrying...", e));
                    tokio::time::sleep(self.config.failure_pause).await;
                }
            }
        }

        info!(scenes = state.accumulated.len(), "Generation finished");
        Ok(state)
    }
}

fn merge_ideas(idea: &str, extension_idea: &str) -> String {
    let idea = idea.trim();
    let extension_idea = extension_idea.trim();
    match (idea.is_empty(), extension_idea.is_empty()) {
        (_, true) => idea.to_string(),
        (true, false) => format!("EXTENSION IDEA: {}", extension_idea),
        (false, false) => format!("{}. EXTENSION IDEA: {}", idea, extension_idea),
    }
}
