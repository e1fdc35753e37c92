//! Premise bootstrap: producing a story description and full metadata
//! before any scene is generated.
//!
//! Both prompts are few-shot: the model is shown one complete example
//! exchange, then asked for another of the same shape. The metadata
//! example below is the canonical fixture the model imitates, so its JSON
//! key spelling is load-bearing.

use std::time::Duration;

use crate::core::generator::{complete_json, Generator, GeneratorError};
use crate::schema::message::ChatMessage;
use crate::schema::metadata::{Character, FirstScene, StoryMetadata, Worldview};

const EXAMPLE_DESCRIPTION: &str = "High above a cloud-drowned world, salvager Wren \
Calloway boards a derelict sky-fortress said to hold the last map of the sunken \
lands. Hunted by a rival guild and aided by a clockwork navigator with a stolen \
soul, she must outwit ancient wardens and her own crew to claim it.";

/// The complete example story shown to the model as a one-shot.
pub fn example_metadata() -> StoryMetadata {
    StoryMetadata {
        title: "The Last Map of the Sunken Lands".to_string(),
        description: EXAMPLE_DESCRIPTION.to_string(),
        characters: vec![
            Character {
                name: "Wren Calloway".to_string(),
                role: "Sky salvager".to_string(),
                traits: vec![
                    "resourceful".to_string(),
                    "stubborn".to_string(),
                    "sharp-tongued".to_string(),
                ],
                description: "A salvager who climbs wrecks no one else dares to, \
                              chasing the one find that could buy back her family's ship."
                    .to_string(),
                is_main: true,
            },
            Character {
                name: "Cog".to_string(),
                role: "Clockwork navigator".to_string(),
                traits: vec![
                    "loyal".to_string(),
                    "literal-minded".to_string(),
                    "haunted".to_string(),
                ],
                description: "An automaton carrying the stolen soul of a long-dead \
                              cartographer, who remembers routes nobody has flown in a century."
                    .to_string(),
                is_main: false,
            },
            Character {
                name: "Captain Ilsa Dray".to_string(),
                role: "Rival guild captain".to_string(),
                traits: vec![
                    "ruthless".to_string(),
                    "charismatic".to_string(),
                    "patient".to_string(),
                ],
                description: "Leader of the Brasswake Guild, who wants the map for \
                              reasons she has never told even her own crew."
                    .to_string(),
                is_main: false,
            },
            Character {
                name: "The Warden of the Fortress".to_string(),
                role: "Guardian".to_string(),
                traits: vec![
                    "ancient".to_string(),
                    "implacable".to_string(),
                    "bound".to_string(),
                ],
                description: "A storm-bound sentinel woven into the fortress itself, \
                              sworn to keep the map from every living hand."
                    .to_string(),
                is_main: false,
            },
        ],
        worldview: Worldview {
            setting: "Chains of floating islands and drifting wrecks above an endless \
                      sea of cloud that swallowed the old world."
                .to_string(),
            time_period: "Generations after the Drowning, in a fraying age of salvage."
                .to_string(),
            technology_level: "Brass-and-canvas airships and clockwork automata, built \
                               from scavenged relics nobody can make anymore."
                .to_string(),
            magic_system: "Old-world soulbinding: memories and spirits can be sealed \
                           into machines, at a price paid by the binder."
                .to_string(),
        },
        themes: vec![
            "Salvage".to_string(),
            "Betrayal".to_string(),
            "Memory".to_string(),
            "Freedom".to_string(),
        ],
        first_introduction_scene: FirstScene {
            text: "Wren's skiff bumps against the hull of the derelict fortress, its \
                   gun ports dark and its anchor chains trailing into the cloud sea. \
                   Somewhere below, Brasswake engines are already droning closer."
                .to_string(),
            choice: "Board the fortress".to_string(),
        },
    }
}

/// Ask the model for a fresh 2-3 sentence story description.
pub fn generate_description(generator: &dyn Generator) -> Result<String, GeneratorError> {
    let reply = generator.generate(&[
        ChatMessage::system("You are the best storyteller."),
        ChatMessage::user("Give me a 2-3 sentence story description."),
        ChatMessage::assistant(EXAMPLE_DESCRIPTION),
        ChatMessage::user("Give me another 2-3 sentence story description."),
    ])?;
    Ok(reply.trim().to_string())
}

/// Expand a description into full story metadata, retrying until the model
/// produces a parseable document.
pub fn generate_metadata(
    generator: &dyn Generator,
    description: &str,
    retry_pause: Duration,
) -> Result<StoryMetadata, GeneratorError> {
    let example = serde_json::to_string(&example_metadata()).unwrap_or_default();
    let mut transcript = vec![
        ChatMessage::system("You only output valid JSON."),
        ChatMessage::user(format!(
            "Output the complete json (ONLY JSON) for an interactive story quest \
             with the following description: {EXAMPLE_DESCRIPTION}"
        )),
        ChatMessage::assistant(example),
        ChatMessage::user(format!(
            "Output the complete json for an interactive story quest with the \
             following description: {description}"
        )),
    ];
    complete_json(generator, &mut transcript, retry_pause, |_: &StoryMetadata| Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<String>>);

    impl Scripted {
        fn new(replies: &[&str]) -> Self {
            let mut list: Vec<String> = replies.iter().map(|s| s.to_string()).collect();
            list.reverse();
            Self(Mutex::new(list))
        }
    }

    impl Generator for Scripted {
        fn generate(&self, _messages: &[ChatMessage]) -> Result<String, GeneratorError> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| GeneratorError::Api("script exhausted".to_string()))
        }
    }

    #[test]
    fn example_metadata_round_trips_as_json() {
        let json = serde_json::to_string(&example_metadata()).unwrap();
        let back: StoryMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, example_metadata());
        assert!(json.contains("\"isMain\":true"));
    }

    #[test]
    fn description_is_trimmed() {
        let gen = Scripted::new(&["  A story about a lighthouse.  \n"]);
        assert_eq!(
            generate_description(&gen).unwrap(),
            "A story about a lighthouse."
        );
    }

    #[test]
    fn metadata_generation_retries_until_valid() {
        let valid = serde_json::to_string(&example_metadata()).unwrap();
        let gen = Scripted::new(&["I cannot output JSON, sorry", valid.as_str()]);

        let meta = generate_metadata(&gen, "any description", Duration::ZERO).unwrap();
        assert_eq!(meta.title, example_metadata().title);
    }
}
