//! Transcript reconstruction: rebuilding the chat history that leads to a
//! frontier choice.
//!
//! The tree is the only persistent record of the conversation, so every
//! generation call re-derives its prompt from ancestry: walk from the
//! target choice up to the root, then replay the path in chronological
//! order as alternating user/assistant turns. Scene indices are assigned
//! only after the chain is flattened, by position of each user turn.

use crate::schema::message::ChatMessage;
use crate::schema::metadata::StoryMetadata;
use crate::schema::story::{ChoiceId, SceneId, StoryTree, TreeError};

/// Fixed opening instruction; the root scene is replayed as its reply.
const FIRST_SCENE_INSTRUCTION: &str = "Generate the first scene of the story.";

/// System persona plus the per-run contract the model must follow.
fn system_message(metadata: &StoryMetadata, n_scenes: usize) -> ChatMessage {
    let metadata_json = serde_json::to_string(metadata).unwrap_or_default();
    ChatMessage::system(format!(
        "You are a master storyteller running an interactive branching quest. \
         Story metadata: {metadata_json}. \
         The complete story spans exactly {n_scenes} scenes from start to finish. \
         Always answer with a single JSON object of the form \
         {{\"text\": \"scene description\", \"choices\": [{{\"text\": \"choice description\"}}]}} \
         and no other text."
    ))
}

/// Instruction for taking `choice_text` and generating scene
/// `scene_index`/`n_scenes` with `branch_count` choices. Switches to the
/// closing variant for the final scene.
fn proceed_instruction(
    choice_text: &str,
    scene_index: usize,
    n_scenes: usize,
    branch_count: u32,
) -> String {
    if scene_index == n_scenes {
        format!(
            "The player proceeds with the choice: \"{choice_text}\". \
             Generate the final scene {scene_index}/{n_scenes}, bringing the story \
             to a close, with exactly 1 closing choice."
        )
    } else {
        format!(
            "The player proceeds with the choice: \"{choice_text}\". \
             Generate scene {scene_index}/{n_scenes} with {branch_count} choice(s)."
        )
    }
}

/// Rebuild the full transcript needed to generate the scene behind
/// `choice`, requesting `branch_count` choices for it.
pub fn reconstruct(
    tree: &StoryTree,
    metadata: &StoryMetadata,
    choice: ChoiceId,
    n_scenes: usize,
    branch_count: u32,
) -> Result<Vec<ChatMessage>, TreeError> {
    let target = tree.choice(choice)?;

    // Ancestor scenes, collected leaf-to-root then reversed.
    let mut ancestry: Vec<SceneId> = Vec::new();
    let mut scene_id = target.parent_scene;
    loop {
        ancestry.push(scene_id);
        match tree.scene(scene_id)?.parent_choice {
            Some(parent) => scene_id = tree.choice(parent)?.parent_scene,
            None => break,
        }
    }
    ancestry.reverse();

    let mut messages = Vec::with_capacity(2 * ancestry.len() + 2);
    messages.push(system_message(metadata, n_scenes));

    // The k-th user turn (1-based) always requests scene k; the index falls
    // out of the flattened order rather than being stored on the node.
    for (position, &scene_id) in ancestry.iter().enumerate() {
        let scene_index = position + 1;
        let scene = tree.scene(scene_id)?;
        let instruction = match scene.parent_choice {
            None => FIRST_SCENE_INSTRUCTION.to_string(),
            Some(taken) => proceed_instruction(
                &tree.choice(taken)?.text,
                scene_index,
                n_scenes,
                scene.child_choices.len() as u32,
            ),
        };
        messages.push(ChatMessage::user(instruction));
        messages.push(ChatMessage::assistant(tree.prompt_json(scene_id)?));
    }

    messages.push(ChatMessage::user(proceed_instruction(
        &target.text,
        ancestry.len() + 1,
        n_scenes,
        branch_count,
    )));

    Ok(messages)
}
