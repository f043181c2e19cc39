use crate::error::{Result, SncError};
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const FINISH_STOP: &str = "stop";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl GenerationParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(SncError::InvalidRequest(format!(
                "temperature {} is outside 0.0..={MAX_TEMPERATURE}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(SncError::InvalidRequest(
                "max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Bare catalog key, namespace prefix already stripped.
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
        stream: bool,
    ) -> Result<Self> {
        if messages.is_empty() {
            return Err(SncError::InvalidRequest(
                "at least one message is required".to_string(),
            ));
        }
        params.validate()?;
        Ok(Self {
            model: model.into(),
            messages,
            params,
            stream,
        })
    }

    /// Whitespace-delimited word count over every message, used where the
    /// upstream does not report usage.
    pub fn prompt_words(&self) -> u64 {
        self.messages
            .iter()
            .map(|message| word_count(&message.content))
            .sum()
    }
}

/// Body posted to an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionPayload<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// Counts come from upstream bodies, so the total saturates instead of
    /// overflowing.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Recompute `total_tokens` from its parts.
    pub fn normalized(self) -> Self {
        Self::new(self.prompt_tokens, self.completion_tokens)
    }
}

/// A message as an upstream returned it. Unlike [`ChatMessage`] the role is
/// kept verbatim, so replies from providers with their own role names decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    #[serde(default = "assistant_role")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

impl ReplyMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: assistant_role(),
            content: content.into(),
        }
    }
}

fn assistant_role() -> String {
    "assistant".to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ReplyMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Provider-independent shape of a finished completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    #[serde(default = "completion_id")]
    pub id: String,
    #[serde(default = "completion_object")]
    pub object: String,
    #[serde(default = "now_epoch")]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

impl CompletionResult {
    /// Single-choice result with a `stop` finish reason.
    pub fn single(
        id: impl Into<String>,
        model: impl Into<String>,
        content: impl Into<String>,
        usage: Usage,
    ) -> Self {
        Self {
            id: id.into(),
            object: completion_object(),
            created: now_epoch(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: ReplyMessage::assistant(content),
                finish_reason: Some(FINISH_STOP.to_string()),
            }],
            usage: usage.normalized(),
        }
    }

    /// Text of the first choice, or empty when there is none.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .unwrap_or_default()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }
}

/// One increment of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseChunk {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub delta: String,
    pub finish_reason: Option<String>,
}

impl ResponseChunk {
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

pub(crate) fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

pub(crate) fn completion_id() -> String {
    format!("chatcmpl-snowcell-{}", Uuid::new_v4().simple())
}

fn completion_object() -> String {
    "chat.completion".to_string()
}

pub(crate) fn now_epoch() -> i64 {
    Utc::now().timestamp()
}
