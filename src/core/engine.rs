//! The recursive expansion engine: turns a story premise into a full tree.
//!
//! Strictly sequential and depth-first — one generation call in flight at
//! a time, publishing a fresh snapshot after every step so pollers can
//! watch the tree grow. Malformed model output is retried in place with
//! corrective context; transport failures abort the run.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::events::{EventSink, StoryEvent};
use crate::core::generator::{complete_json, Generator, GeneratorError, PayloadError};
use crate::core::sampler::{FanoutSampler, FanoutWeights};
use crate::core::snapshot::{Cursor, SnapshotPublisher};
use crate::core::transcript::reconstruct;
use crate::schema::metadata::StoryMetadata;
use crate::schema::story::{ChoiceId, ChoiceSpec, SceneId, ScenePayload, StoryTree, TreeError};

/// Scenes at depths below this are generated with the primary model;
/// deeper ones fall back to the light model. Quality matters most early,
/// where every branch shares the prefix.
const PRIMARY_MODEL_DEPTH: usize = 3;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("generation failed: {0}")]
    Generator(#[from] GeneratorError),
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("scene count must be at least 1, got {0}")]
    BadSceneCount(usize),
    #[error("engine requires a generator")]
    MissingGenerator,
    #[error("expansion exceeded the configured depth of {0}")]
    DepthExceeded(usize),
}

/// The top-level story generator. Built via `StoryEngine::builder()`.
pub struct StoryEngine {
    tree: StoryTree,
    metadata: StoryMetadata,
    n_scenes: usize,
    sampler: FanoutSampler,
    publisher: SnapshotPublisher,
    events: Option<EventSink>,
    primary: Arc<dyn Generator>,
    light: Arc<dyn Generator>,
    rng: StdRng,
    retry_pause: Duration,
    last_added: Option<u64>,
}

/// Builder for constructing a `StoryEngine`.
pub struct StoryEngineBuilder {
    metadata: StoryMetadata,
    n_scenes: usize,
    weights: FanoutWeights,
    state_path: String,
    events: Option<EventSink>,
    primary: Option<Arc<dyn Generator>>,
    light: Option<Arc<dyn Generator>>,
    seed: Option<u64>,
    retry_pause: Duration,
}

impl StoryEngine {
    pub fn builder(metadata: StoryMetadata) -> StoryEngineBuilder {
        StoryEngineBuilder {
            metadata,
            n_scenes: 5,
            weights: FanoutWeights::default(),
            state_path: "story_state.json".to_string(),
            events: None,
            primary: None,
            light: None,
            seed: None,
            retry_pause: Duration::from_millis(500),
        }
    }

    /// Run a full expansion: build the root from the premise, then expand
    /// every branch depth-first until all reach `n_scenes`. Returns the
    /// root scene id.
    pub fn run(&mut self) -> Result<SceneId, EngineError> {
        let first = self.metadata.first_introduction_scene.clone();
        let root = self.tree.build_scene(
            first.text,
            None,
            &[ChoiceSpec { text: first.choice }],
        )?;
        info!(scene = root.0, n_scenes = self.n_scenes, "root scene created");
        self.publish(Some(root.0));

        self.expand(root, 1)?;

        if let Some(ref events) = self.events {
            events.emit(StoryEvent::RunCompleted {
                scene_count: self.tree.scene_count(),
            });
        }
        info!(
            scenes = self.tree.scene_count(),
            choices = self.tree.choice_count(),
            "story expansion complete"
        );
        Ok(root)
    }

    /// Access the finished tree after `run`.
    pub fn tree(&self) -> &StoryTree {
        &self.tree
    }

    fn expand(&mut self, scene: SceneId, depth: usize) -> Result<(), EngineError> {
        // Recursion is bounded by configuration, never by the call stack.
        if depth > self.n_scenes {
            return Err(EngineError::DepthExceeded(self.n_scenes));
        }
        if depth == self.n_scenes {
            self.publish(Some(scene.0));
            return Ok(());
        }

        let frontier = self.tree.scene(scene)?.child_choices.clone();
        for choice in frontier {
            self.expand_choice(choice, depth)?;
        }
        Ok(())
    }

    /// Resolve one frontier choice: announce it, sample the child's
    /// fan-out, rebuild the transcript, generate until valid, attach the
    /// child scene, and recurse into it.
    fn expand_choice(&mut self, choice: ChoiceId, depth: usize) -> Result<(), EngineError> {
        if let Some(ref events) = self.events {
            events.emit(StoryEvent::ChoiceEntered { choice_id: choice.0 });
        }
        self.publish(Some(choice.0));

        let child_depth = depth + 1;
        let branch_count = if child_depth == self.n_scenes {
            1
        } else {
            self.sampler.sample(&mut self.rng)
        };

        let mut transcript = reconstruct(
            &self.tree,
            &self.metadata,
            choice,
            self.n_scenes,
            branch_count,
        )?;

        let generator = if child_depth < PRIMARY_MODEL_DEPTH {
            Arc::clone(&self.primary)
        } else {
            Arc::clone(&self.light)
        };

        let expected = branch_count as usize;
        let payload: ScenePayload = complete_json(
            generator.as_ref(),
            &mut transcript,
            self.retry_pause,
            move |payload: &ScenePayload| {
                if payload.choices.is_empty() {
                    return Err(PayloadError::NoChoices);
                }
                if payload.choices.len() != expected {
                    return Err(PayloadError::ChoiceCount {
                        expected,
                        got: payload.choices.len(),
                    });
                }
                Ok(())
            },
        )?;

        let child = self
            .tree
            .build_scene(payload.text, Some(choice), &payload.choices)?;
        self.last_added = Some(child.0);
        info!(
            scene = child.0,
            depth = child_depth,
            choices = payload.choices.len(),
            "scene attached"
        );
        if let Some(ref events) = self.events {
            events.emit(StoryEvent::SceneAdded {
                choice_id: choice.0,
                scene_id: child.0,
            });
        }
        self.publish(Some(choice.0));

        self.expand(child, child_depth)
    }

    /// Best-effort snapshot publish; failures keep the run alive.
    fn publish(&self, current_id: Option<u64>) {
        let cursor = Cursor::now(current_id, self.last_added);
        if let Err(e) = self.publisher.publish(&self.tree, cursor) {
            warn!(error = %e, "snapshot publish failed, continuing");
        }
    }
}

impl StoryEngineBuilder {
    pub fn n_scenes(mut self, n_scenes: usize) -> Self {
        self.n_scenes = n_scenes;
        self
    }

    pub fn weights(mut self, weights: FanoutWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn state_path(mut self, path: impl Into<String>) -> Self {
        self.state_path = path.into();
        self
    }

    pub fn events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Generator used for early scenes (and, unless a light generator is
    /// set, for every scene).
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.primary = Some(generator);
        self
    }

    /// Cheaper generator for scenes at depth 3 and beyond.
    pub fn light_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.light = Some(generator);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    pub fn build(self) -> Result<StoryEngine, EngineError> {
        if self.n_scenes == 0 {
            return Err(EngineError::BadSceneCount(0));
        }
        let primary = self.primary.ok_or(EngineError::MissingGenerator)?;
        let light = self.light.unwrap_or_else(|| Arc::clone(&primary));
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(StoryEngine {
            tree: StoryTree::new(),
            metadata: self.metadata,
            n_scenes: self.n_scenes,
            sampler: FanoutSampler::new(&self.weights),
            publisher: SnapshotPublisher::new(self.state_path),
            events: self.events,
            primary,
            light,
            rng,
            retry_pause: self.retry_pause,
            last_added: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::metadata::{FirstScene, Worldview};
    use std::sync::Mutex;

    fn test_metadata() -> StoryMetadata {
        StoryMetadata {
            title: "Test".to_string(),
            description: "d".to_string(),
            characters: vec![],
            worldview: Worldview {
                setting: "s".to_string(),
                time_period: "t".to_string(),
                technology_level: "t".to_string(),
                magic_system: "m".to_string(),
            },
            themes: vec![],
            first_introduction_scene: FirstScene {
                text: "Opening.".to_string(),
                choice: "Begin".to_string(),
            },
        }
    }

    struct FixedReply(Mutex<Vec<String>>);

    impl Generator for FixedReply {
        fn generate(
            &self,
            _messages: &[crate::schema::message::ChatMessage],
        ) -> Result<String, GeneratorError> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| GeneratorError::Api("script exhausted".to_string()))
        }
    }

    #[test]
    fn builder_rejects_zero_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let gen: Arc<dyn Generator> = Arc::new(FixedReply(Mutex::new(vec![])));
        let result = StoryEngine::builder(test_metadata())
            .n_scenes(0)
            .generator(gen)
            .state_path(dir.path().join("s.json").to_string_lossy().into_owned())
            .build();
        assert!(matches!(result, Err(EngineError::BadSceneCount(0))));
    }

    #[test]
    fn builder_requires_generator() {
        let result = StoryEngine::builder(test_metadata()).build();
        assert!(matches!(result, Err(EngineError::MissingGenerator)));
    }

    #[test]
    fn single_scene_run_is_terminal_at_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let gen: Arc<dyn Generator> = Arc::new(FixedReply(Mutex::new(vec![])));

        let mut engine = StoryEngine::builder(test_metadata())
            .n_scenes(1)
            .generator(gen)
            .state_path(path.to_string_lossy().into_owned())
            .retry_pause(Duration::ZERO)
            .build()
            .unwrap();

        // No generation calls happen: the root is already the final scene.
        engine.run().unwrap();
        assert_eq!(engine.tree().scene_count(), 1);
        assert_eq!(engine.tree().choice_count(), 1);
        assert!(path.exists());
    }
}
