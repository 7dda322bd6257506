//! Request/response metadata, token accounting, and message history types
//! for the inference client (§3, §4.3.3).

use serde::{Deserialize, Serialize};

/// A reference to a specific model, e.g. `"claude-sonnet-4-5"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub model_id: String,
}

impl ModelRef {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self { model_id: model_id.into() }
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model_id)
    }
}

/// Token counts for one request/response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self { prompt_tokens, completion_tokens }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
    }
}

/// Metadata about an outgoing request, used to correlate a streamed
/// response back to its caller and measure latency (§4.9).
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub request_id: String,
    pub model: ModelRef,
    pub created_at: std::time::Instant,
}

impl RequestMeta {
    pub fn new(request_id: impl Into<String>, model: ModelRef) -> Self {
        Self { request_id: request_id.into(), model, created_at: std::time::Instant::now() }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }
}

/// Metadata about a completed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub model_id: String,
    pub usage: Option<TokenUsage>,
    pub latency_ms: u64,
    pub finish_reason: super::events::FinishReason,
}

impl ResponseMeta {
    pub fn new(
        request_id: impl Into<String>,
        model_id: impl Into<String>,
        finish_reason: super::events::FinishReason,
        latency_ms: u64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            model_id: model_id.into(),
            usage: None,
            latency_ms,
            finish_reason,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Role of one message in the history sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block within a message's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// A base64-encoded screenshot. Older images are replaced with
    /// [`ContentBlock::omitted`] to respect the §3 trim invariant.
    Image { media_type: String, data: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    ToolResult { tool_use_id: String, content: Vec<ContentBlock> },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image { media_type: media_type.into(), data: data.into() }
    }

    /// Placeholder that replaces a trimmed-out image (§4.3.1 step 1).
    pub fn omitted() -> Self {
        Self::Text { text: "[screenshot omitted]".to_string() }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

/// One turn in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::User, content }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, content }
    }
}

/// Maximum number of images retained across the whole history (§3, §4.3.1).
pub const MAX_SCREENSHOTS: usize = 3;

/// Replace all but the most recent [`MAX_SCREENSHOTS`] images across
/// `history` with the omitted-image placeholder, preserving every other
/// block untouched.
pub fn trim_history_images(history: &mut [Message]) {
    let total_images: usize = history
        .iter()
        .flat_map(|m| m.content.iter())
        .filter(|b| b.is_image())
        .count();
    if total_images <= MAX_SCREENSHOTS {
        return;
    }

    let mut to_drop = total_images - MAX_SCREENSHOTS;
    'outer: for message in history.iter_mut() {
        for block in message.content.iter_mut() {
            if to_drop == 0 {
                break 'outer;
            }
            if block.is_image() {
                *block = ContentBlock::omitted();
                to_drop -= 1;
            }
        }
    }
}
