//! Streaming chat-completion client for the inference backend (§4.3.3, §6).

pub mod client;
pub mod events;
pub mod sse;
pub mod types;

pub use client::InferenceClient;
pub use events::{FinishReason, LlmEvent};
pub use sse::{SseEvent, SseLineParser};
pub use types::{RequestMeta, ResponseMeta, TokenUsage};
