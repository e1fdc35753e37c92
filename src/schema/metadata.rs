//! Story metadata produced by the bootstrap prompt.
//!
//! Field renames follow the JSON key spelling the model is shown in the
//! one-shot example, so the parsed document and the prompt-embedded copy
//! stay byte-compatible.

use serde::{Deserialize, Serialize};

/// One character of the story world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub role: String,
    pub traits: Vec<String>,
    pub description: String,
    #[serde(rename = "isMain")]
    pub is_main: bool,
}

/// Setting, era, and the rules the story world runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worldview {
    pub setting: String,
    #[serde(rename = "timePeriod")]
    pub time_period: String,
    #[serde(rename = "technologyLevel")]
    pub technology_level: String,
    #[serde(rename = "magicSystem")]
    pub magic_system: String,
}

/// The opening beat: root scene text plus its single starting choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstScene {
    pub text: String,
    pub choice: String,
}

/// Everything the model needs to keep a story coherent across scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryMetadata {
    pub title: String,
    pub description: String,
    pub characters: Vec<Character>,
    pub worldview: Worldview,
    pub themes: Vec<String>,
    pub first_introduction_scene: FirstScene,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_shaped_json() {
        let raw = r#"{
            "title": "Deep under ocean",
            "description": "A diver finds a lost city.",
            "characters": [
                {
                    "name": "Iroh the Diver",
                    "role": "Diver",
                    "traits": ["brave", "curious"],
                    "description": "A skilled diver.",
                    "isMain": true
                }
            ],
            "worldview": {
                "setting": "The ocean floor.",
                "timePeriod": "Modern day",
                "technologyLevel": "Advanced diving gear.",
                "magicSystem": "Ancient ocean magic."
            },
            "themes": ["Exploration", "Mystery"],
            "first_introduction_scene": {
                "text": "Iroh checks his gear one last time.",
                "choice": "Dive into the ocean"
            }
        }"#;

        let meta: StoryMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.title, "Deep under ocean");
        assert!(meta.characters[0].is_main);
        assert_eq!(meta.worldview.time_period, "Modern day");
        assert_eq!(meta.first_introduction_scene.choice, "Dive into the ocean");
    }

    #[test]
    fn camel_case_keys_survive_round_trip() {
        let meta = StoryMetadata {
            title: "t".to_string(),
            description: "d".to_string(),
            characters: vec![Character {
                name: "n".to_string(),
                role: "r".to_string(),
                traits: vec![],
                description: "c".to_string(),
                is_main: false,
            }],
            worldview: Worldview {
                setting: "s".to_string(),
                time_period: "tp".to_string(),
                technology_level: "tl".to_string(),
                magic_system: "ms".to_string(),
            },
            themes: vec![],
            first_introduction_scene: FirstScene {
                text: "x".to_string(),
                choice: "y".to_string(),
            },
        };

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains(r#""isMain":false"#));
        assert!(json.contains(r#""timePeriod":"tp""#));
        assert!(json.contains(r#""first_introduction_scene""#));
        let back: StoryMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
