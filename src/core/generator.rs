//! Generation seam: the `Generator` trait, an OpenAI-compatible chat
//! client, and the retry-until-valid JSON completion loop.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::schema::message::ChatMessage;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation API error: {0}")]
    Api(String),
    #[error("generation returned no content")]
    EmptyResponse,
}

/// Why a model reply could not be accepted as a payload.
///
/// These are the recoverable failures of the retry loop; the text of each
/// variant is fed back to the model as the corrective instruction.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("the reply contains no JSON object")]
    NoJsonObject,
    #[error("the reply is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("the \"choices\" array must not be empty")]
    NoChoices,
    #[error("expected exactly {expected} choice(s), got {got}")]
    ChoiceCount { expected: usize, got: usize },
}

/// An opaque text-generation capability over a role-tagged transcript.
///
/// Implementations are assumed reliable in availability but unreliable in
/// output format; format recovery is the caller's job (`complete_json`).
pub trait Generator {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String, GeneratorError>;
}

/// Slice out the JSON object embedded in a model reply: everything from the
/// first `{` to the last `}`. Models routinely wrap the object in prose or
/// code fences.
pub fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&reply[start..=end])
}

/// Call the generator until it yields a payload that parses and passes
/// `check`.
///
/// Every failed attempt stays in the transcript: the raw reply is replayed
/// as an assistant turn, followed by a user turn describing the failure.
/// Retries are unbounded — format slips are expected to be transient — with
/// `retry_pause` between attempts. Transport errors propagate.
pub fn complete_json<T, F>(
    generator: &dyn Generator,
    transcript: &mut Vec<ChatMessage>,
    retry_pause: Duration,
    check: F,
) -> Result<T, GeneratorError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Result<(), PayloadError>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let reply = generator.generate(transcript)?;

        let failure = match parse_payload(&reply, &check) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        warn!(attempt, %failure, "malformed generation output, retrying");
        transcript.push(ChatMessage::assistant(reply));
        transcript.push(ChatMessage::user(format!(
            "Your previous reply was rejected: {failure}. \
             Respond again with only the JSON object, no other text."
        )));
        std::thread::sleep(retry_pause);
    }
}

fn parse_payload<T, F>(reply: &str, check: &F) -> Result<T, PayloadError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Result<(), PayloadError>,
{
    let raw = extract_json(reply).ok_or(PayloadError::NoJsonObject)?;
    let value: T = serde_json::from_str(raw)?;
    check(&value)?;
    Ok(value)
}

// --- OpenAI-compatible chat-completions client ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

/// Blocking client for any `/chat/completions`-shaped endpoint (OpenAI,
/// Ollama, vLLM, llama.cpp server).
pub struct OpenAiChatClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChatClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            temperature: 0.8,
            max_tokens: 2048,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl Generator for OpenAiChatClient {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String, GeneratorError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send()?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(GeneratorError::Api(format!("{status}: {text}")));
        }

        let parsed: ChatResponse = response.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(GeneratorError::EmptyResponse)
    }
}
