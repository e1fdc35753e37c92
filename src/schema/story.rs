//! The story tree: scenes, choices, and the arena that owns them.
//!
//! Scenes and choices reference each other only by id; the `StoryTree`
//! arena owns every node. Parent links are plain lookups, which keeps the
//! parent/child cycle out of the ownership graph entirely. Growth is
//! append-only: nodes are created during expansion and never removed or
//! structurally rewritten afterwards.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("tree already has a root scene")]
    RootExists,
    #[error("tree has no root scene yet")]
    NoRoot,
    #[error("unknown scene id: {0:?}")]
    UnknownScene(SceneId),
    #[error("unknown choice id: {0:?}")]
    UnknownChoice(ChoiceId),
    #[error("choice {0:?} already leads to a scene")]
    ChoiceResolved(ChoiceId),
    #[error("scene must offer at least one choice")]
    NoChoices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChoiceId(pub u64);

/// Creation-time description of a choice: just its player-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSpec {
    pub text: String,
}

/// The shape a scene takes on the model side of the conversation, both as
/// parsed generator output and as the replayed assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenePayload {
    pub text: String,
    pub choices: Vec<ChoiceSpec>,
}

/// One narrative beat. `child_choices` is fixed at creation; insertion
/// order is display order.
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: SceneId,
    pub text: String,
    pub parent_choice: Option<ChoiceId>,
    pub child_choices: Vec<ChoiceId>,
}

/// One player-facing option. `child_scene` is absent until the choice is
/// expanded, then set exactly once. A choice with no child scene is a
/// pending leaf of the generation frontier.
#[derive(Debug, Clone)]
pub struct Choice {
    pub id: ChoiceId,
    pub text: String,
    pub parent_scene: SceneId,
    pub child_scene: Option<SceneId>,
}

/// Serialized form of a scene subtree, mirroring the snapshot file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub id: u64,
    pub text: String,
    #[serde(rename = "childChoices")]
    pub child_choices: Vec<ChoiceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSnapshot {
    pub id: u64,
    pub text: String,
    #[serde(rename = "childScene")]
    pub child_scene: Option<SceneSnapshot>,
}

/// Arena holding every scene and choice of one story run.
///
/// Ids are allocated from a single counter, so they are unique across both
/// node kinds for the lifetime of the tree.
#[derive(Debug, Default)]
pub struct StoryTree {
    scenes: FxHashMap<SceneId, Scene>,
    choices: FxHashMap<ChoiceId, Choice>,
    root: Option<SceneId>,
    next_id: u64,
}

impl StoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<SceneId> {
        self.root
    }

    pub fn scene(&self, id: SceneId) -> Result<&Scene, TreeError> {
        self.scenes.get(&id).ok_or(TreeError::UnknownScene(id))
    }

    pub fn choice(&self, id: ChoiceId) -> Result<&Choice, TreeError> {
        self.choices.get(&id).ok_or(TreeError::UnknownChoice(id))
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Create a scene with one choice per spec, all parented to it.
    ///
    /// A `None` parent is only legal for the very first scene (the root).
    /// A `Some` parent must name an unresolved choice; the new scene is
    /// attached as that choice's child, write-once.
    pub fn build_scene(
        &mut self,
        text: impl Into<String>,
        parent_choice: Option<ChoiceId>,
        choice_specs: &[ChoiceSpec],
    ) -> Result<SceneId, TreeError> {
        if choice_specs.is_empty() {
            return Err(TreeError::NoChoices);
        }
        match parent_choice {
            None => {
                if self.root.is_some() {
                    return Err(TreeError::RootExists);
                }
            }
            Some(cid) => {
                let choice = self.choices.get(&cid).ok_or(TreeError::UnknownChoice(cid))?;
                if choice.child_scene.is_some() {
                    return Err(TreeError::ChoiceResolved(cid));
                }
            }
        }

        let scene_id = SceneId(self.alloc_id());
        let mut child_choices = Vec::with_capacity(choice_specs.len());
        for spec in choice_specs {
            let choice_id = ChoiceId(self.alloc_id());
            self.choices.insert(
                choice_id,
                Choice {
                    id: choice_id,
                    text: spec.text.clone(),
                    parent_scene: scene_id,
                    child_scene: None,
                },
            );
            child_choices.push(choice_id);
        }

        self.scenes.insert(
            scene_id,
            Scene {
                id: scene_id,
                text: text.into(),
                parent_choice,
                child_choices,
            },
        );

        match parent_choice {
            None => self.root = Some(scene_id),
            Some(cid) => {
                // Checked unresolved above; the map entry is known to exist.
                if let Some(choice) = self.choices.get_mut(&cid) {
                    choice.child_scene = Some(scene_id);
                }
            }
        }

        Ok(scene_id)
    }

    /// Canonical stringification of a scene for assistant-turn replay:
    /// `{"text": ..., "choices": [{"text": ...}]}`.
    pub fn prompt_json(&self, id: SceneId) -> Result<String, TreeError> {
        let scene = self.scene(id)?;
        let mut choices = Vec::with_capacity(scene.child_choices.len());
        for cid in &scene.child_choices {
            choices.push(ChoiceSpec {
                text: self.choice(*cid)?.text.clone(),
            });
        }
        let payload = ScenePayload {
            text: scene.text.clone(),
            choices,
        };
        // Serialization of a plain struct cannot fail.
        Ok(serde_json::to_string(&payload).unwrap_or_default())
    }

    /// Recursively serialize the subtree under `id`, depth-first, choice
    /// order preserved. Pure projection; no side effects.
    pub fn snapshot_node(&self, id: SceneId) -> Result<SceneSnapshot, TreeError> {
        let scene = self.scene(id)?;
        let mut child_choices = Vec::with_capacity(scene.child_choices.len());
        for cid in &scene.child_choices {
            let choice = self.choice(*cid)?;
            let child_scene = match choice.child_scene {
                Some(sid) => Some(self.snapshot_node(sid)?),
                None => None,
            };
            child_choices.push(ChoiceSnapshot {
                id: choice.id.0,
                text: choice.text.clone(),
                child_scene,
            });
        }
        Ok(SceneSnapshot {
            id: scene.id.0,
            text: scene.text.clone(),
            child_choices,
        })
    }

    /// Depth of a scene, 1-based (root = 1).
    pub fn depth(&self, id: SceneId) -> Result<usize, TreeError> {
        let mut depth = 1;
        let mut scene = self.scene(id)?;
        while let Some(cid) = scene.parent_choice {
            scene = self.scene(self.choice(cid)?.parent_scene)?;
            depth += 1;
        }
        Ok(depth)
    }
}
