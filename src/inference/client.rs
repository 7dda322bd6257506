//! Streaming chat-completion client for the inference backend (§4.3.3, §6).
//!
//! Requests are built Anthropic-Messages-API-shaped: `system` at the top
//! level with an ephemeral cache marker, `tools`, `stream: true`. The
//! response is decoded off [`SseLineParser`] into the normalized
//! [`LlmEvent`] stream, buffering each `tool_use` block's partial-JSON
//! argument fragments until its `content_block_stop`.
//!
//! Connection failures are retried with [`RetryPolicy`]'s exponential
//! backoff and gated by a [`CircuitBreaker`], mirroring the agent loop's
//! `send_with_retry` discipline.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde_json::json;

use crate::error::{Result, VoxError};

use super::events::{FinishReason, LlmEvent};
use super::sse::SseLineParser;
use super::types::{ContentBlock, Message, ModelRef, RequestMeta, Role};

pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 32000;
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
pub const DEFAULT_CIRCUIT_BREAKER_COOLDOWN_SECS: u64 = 60;

/// Exponential backoff with jitter for retrying a failed connection attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_RETRY_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// `min(base * multiplier^(attempt-1), max) + jitter(0-10%)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }
        let base = self.base_delay_ms as f64;
        let exp = self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay = (base * exp).min(self.max_delay_ms as f64);
        let jitter = delay * (rand::random::<f64>() * 0.1);
        Duration::from_millis((delay + jitter) as u64)
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    #[default]
    Closed,
    Open { retry_after_secs: u64 },
    HalfOpen,
}

/// Protects the inference backend from cascading retries after repeated failures.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            failure_threshold: DEFAULT_CIRCUIT_BREAKER_THRESHOLD,
            cooldown_secs: DEFAULT_CIRCUIT_BREAKER_COOLDOWN_SECS,
        }
    }
}

impl CircuitBreaker {
    pub fn is_request_allowed(&self) -> bool {
        !matches!(self.state, CircuitState::Open { .. })
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        match self.state {
            CircuitState::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.state = CircuitState::Open { retry_after_secs: self.cooldown_secs };
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open { retry_after_secs: self.cooldown_secs };
            }
            _ => {}
        }
    }

    pub fn attempt_recovery(&mut self) -> bool {
        if let CircuitState::Open { retry_after_secs } = self.state
            && retry_after_secs == 0
        {
            self.state = CircuitState::HalfOpen;
            return true;
        }
        false
    }

    pub fn tick(&mut self) {
        if let CircuitState::Open { retry_after_secs } = &mut self.state
            && *retry_after_secs > 0
        {
            *retry_after_secs -= 1;
        }
    }

    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
    }
}

/// A tool definition advertised to the model (the computer-control tool's
/// JSON schema lives in [`crate::action`]).
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Build the Anthropic-Messages-API-shaped request body, with the system
/// prompt carrying an ephemeral cache marker (§4.3.3).
pub fn build_request_body(
    model: &str,
    system_prompt: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> serde_json::Value {
    let mut body = json!({
        "model": model,
        "max_tokens": 4096,
        "stream": true,
        "system": [
            { "type": "text", "text": system_prompt, "cache_control": { "type": "ephemeral" } }
        ],
        "messages": messages.iter().map(message_to_json).collect::<Vec<_>>(),
    });

    if !tools.is_empty() {
        body["tools"] = serde_json::Value::Array(
            tools
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description, "input_schema": t.parameters }))
                .collect(),
        );
    }

    body
}

fn message_to_json(message: &Message) -> serde_json::Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    json!({ "role": role, "content": message.content.iter().map(content_block_to_json).collect::<Vec<_>>() })
}

fn content_block_to_json(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
        ContentBlock::Image { media_type, data } => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data },
        }),
        ContentBlock::ToolUse { id, name, input } => {
            json!({ "type": "tool_use", "id": id, "name": name, "input": input })
        }
        ContentBlock::ToolResult { tool_use_id, content } => json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content.iter().map(content_block_to_json).collect::<Vec<_>>(),
        }),
    }
}

/// Streaming chat-completion client.
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    api_version: String,
    retry_policy: RetryPolicy,
    circuit_breaker: Mutex<CircuitBreaker>,
}

impl InferenceClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key: api_key.into(),
            model: model.into(),
            api_version: "2023-06-01".to_string(),
            retry_policy: RetryPolicy::default(),
            circuit_breaker: Mutex::new(CircuitBreaker::default()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model_ref(&self) -> ModelRef {
        ModelRef::new(self.model.clone())
    }

    /// Stream one chat completion, retrying connection attempts per
    /// [`RetryPolicy`] while the circuit breaker allows requests.
    pub fn stream_chat(
        &self,
        request_id: String,
        system_prompt: String,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Pin<Box<dyn Stream<Item = Result<LlmEvent>> + Send + '_>> {
        let body = build_request_body(&self.model, &system_prompt, &messages, &tools);
        let meta = RequestMeta::new(request_id.clone(), self.model_ref());

        Box::pin(try_stream! {
            let request_allowed = {
                let breaker = self.circuit_breaker.lock().expect("circuit breaker mutex poisoned");
                breaker.is_request_allowed()
            };
            if !request_allowed {
                Err(VoxError::NetworkTransient("circuit breaker open".into()))?;
            }

            let response = self.send_with_retry(&body).await?;
            yield LlmEvent::StreamStart { request_id: request_id.clone(), model: self.model.clone() };

            let mut byte_stream = response.bytes_stream();
            let mut parser = SseLineParser::new();
            let mut tool_names: HashMap<String, String> = HashMap::new();
            let mut tool_args: HashMap<String, String> = HashMap::new();
            let mut block_index_to_id: HashMap<u64, String> = HashMap::new();
            let mut finish_reason = FinishReason::Stop;

            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| VoxError::NetworkTransient(e.to_string()))?;
                for event in parser.push(&chunk) {
                    if event.is_done() {
                        continue;
                    }
                    for decoded in decode_event(&event, &mut tool_names, &mut tool_args, &mut block_index_to_id, &mut finish_reason)? {
                        yield decoded;
                    }
                }
            }
            if let Some(event) = parser.flush() {
                for decoded in decode_event(&event, &mut tool_names, &mut tool_args, &mut block_index_to_id, &mut finish_reason)? {
                    yield decoded;
                }
            }

            let _ = meta.elapsed_ms();
            yield LlmEvent::StreamEnd { finish_reason };
        })
    }

    async fn send_with_retry(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                tokio::time::sleep(self.retry_policy.delay_for_attempt(attempt)).await;
            }

            let result = self
                .http
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", &self.api_version)
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    self.circuit_breaker.lock().expect("circuit breaker mutex poisoned").record_success();
                    return Ok(response);
                }
                Ok(response) => {
                    self.circuit_breaker.lock().expect("circuit breaker mutex poisoned").record_failure();
                    let status = response.status();
                    if attempt + 1 >= self.retry_policy.max_attempts || !status.is_server_error() {
                        return Err(VoxError::NetworkTransient(format!("inference backend returned {status}")));
                    }
                }
                Err(e) => {
                    self.circuit_breaker.lock().expect("circuit breaker mutex poisoned").record_failure();
                    if attempt + 1 >= self.retry_policy.max_attempts {
                        return Err(VoxError::NetworkTransient(crate::observability::redact_all(&e.to_string())));
                    }
                }
            }

            attempt += 1;
        }
    }
}

fn decode_event(
    event: &super::sse::SseEvent,
    tool_names: &mut HashMap<String, String>,
    tool_args: &mut HashMap<String, String>,
    block_index_to_id: &mut HashMap<u64, String>,
    finish_reason: &mut FinishReason,
) -> Result<Vec<LlmEvent>> {
    let payload: serde_json::Value = serde_json::from_str(&event.data)
        .map_err(|e| VoxError::ParseError(format!("malformed SSE payload: {e}")))?;

    let event_type = event
        .event_type
        .as_deref()
        .or_else(|| payload.get("type").and_then(|v| v.as_str()))
        .unwrap_or("");

    let mut out = Vec::new();

    match event_type {
        "content_block_start" => {
            let index = payload["index"].as_u64().unwrap_or(0);
            if let Some(block) = payload.get("content_block")
                && block["type"] == "tool_use"
            {
                let id = block["id"].as_str().unwrap_or_default().to_string();
                let name = block["name"].as_str().unwrap_or_default().to_string();
                block_index_to_id.insert(index, id.clone());
                tool_names.insert(id.clone(), name.clone());
                tool_args.insert(id.clone(), String::new());
                out.push(LlmEvent::ToolCallStart { call_id: id, function_name: name });
            }
        }
        "content_block_delta" => {
            let index = payload["index"].as_u64().unwrap_or(0);
            let delta = &payload["delta"];
            match delta["type"].as_str() {
                Some("text_delta") => {
                    if let Some(text) = delta["text"].as_str() {
                        out.push(LlmEvent::TextDelta { text: text.to_string() });
                    }
                }
                Some("input_json_delta") => {
                    if let Some(id) = block_index_to_id.get(&index) {
                        let fragment = delta["partial_json"].as_str().unwrap_or_default();
                        tool_args.entry(id.clone()).or_default().push_str(fragment);
                        out.push(LlmEvent::ToolCallArgsDelta { call_id: id.clone(), args_fragment: fragment.to_string() });
                    }
                }
                _ => {}
            }
        }
        "content_block_stop" => {
            let index = payload["index"].as_u64().unwrap_or(0);
            if let Some(id) = block_index_to_id.remove(&index) {
                out.push(LlmEvent::ToolCallEnd { call_id: id });
            }
        }
        "message_delta" => {
            if let Some(raw) = payload["delta"]["stop_reason"].as_str() {
                *finish_reason = FinishReason::from_stop_reason(raw);
            }
        }
        "error" => {
            let message = payload["error"]["message"].as_str().unwrap_or("unknown error").to_string();
            out.push(LlmEvent::StreamError { error: message });
        }
        _ => {}
    }

    Ok(out)
}
