//! Direct-execution loop: the fast path of the two-model pipeline
//! (§4.3.1). Streams the executor model, reacts to `GUIDE:`/`NARRATE:`/
//! `DONE:`/`CLARIFY:` as they form, and otherwise dispatches whatever
//! tool-use blocks the model returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::action::{ActionSink, ComputerAction, Point};
use crate::error::{Result, VoxError};
use crate::inference::client::{InferenceClient, ToolDefinition};
use crate::inference::events::{FinishReason, LlmEvent};
use crate::inference::types::{ContentBlock, Message, trim_history_images};
use crate::narration::NarrationQueue;
use crate::observability::SessionLog;
use crate::perf::PerfTracker;
use crate::screen::{ScreenSource, Screenshot};
use crate::{inference_request_span, pipeline_round_span, tool_execute_span};

use super::repeat_click::RepeatClickTracker;
use super::types::LoopOutcome;

/// Shows the `GUIDE:` highlight on the on-screen overlay. The overlay
/// widget itself is out of scope; this is the narrow call surface the
/// executor needs from it.
#[async_trait]
pub trait OverlaySink: Send + Sync {
    async fn show_highlight(&self, at: Point, instruction: &str);
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_direct_iterations: usize,
    pub max_screenshots: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_direct_iterations: 8, max_screenshots: crate::inference::types::MAX_SCREENSHOTS }
    }
}

pub struct ExecutorDeps<'a> {
    pub inference: &'a InferenceClient,
    pub narration: &'a NarrationQueue,
    pub action_sink: &'a dyn ActionSink,
    pub screen: &'a dyn ScreenSource,
    pub overlay: &'a dyn OverlaySink,
    pub max_model_width: u32,
    /// Idempotent per-session flag: maximize the foreground window once,
    /// after the first successful tool-call batch (§4.3.1 step 5).
    pub window_maximized: &'a AtomicBool,
    /// Checked at each iteration boundary and suspension point (§5). A new
    /// utterance or a spoken "stop" cancels this token; the loop returns a
    /// "Cancelled." summary rather than running another round.
    pub cancel: &'a CancellationToken,
    /// Ring buffer of round timings (§4.8); one slot per direct-execution
    /// round, whether or not it produced an action.
    pub perf: &'a PerfTracker,
    /// Plain-text session log; receives one line per inference request,
    /// pipeline round, and tool execution (§4.9).
    pub session_log: &'a AsyncMutex<SessionLog>,
}

const SYSTEM_PROMPT: &str = "You control the user's computer via the computer tool. \
Narrate briefly as you act. Use GUIDE: (x, y) instruction to point something out without acting. \
Use DONE: summary when finished, or CLARIFY: question when you need more information.";

const POST_ACTION_SLEEP: Duration = Duration::from_millis(200);
const BATCH_SETTLE: Duration = Duration::from_millis(300);
const GUIDE_WAIT: Duration = Duration::from_millis(1500);

/// Run the direct-execution loop for one user request (§4.3.1). Returns
/// the terminal outcome plus the number of rounds it took, so callers
/// like `evaluate_block` (§4.3.2) can report whether the iteration cap
/// was hit.
pub async fn run_direct_loop(
    user_message: String,
    initial_screenshot: Screenshot,
    history: &mut Vec<Message>,
    deps: &ExecutorDeps<'_>,
    config: &ExecutorConfig,
) -> Result<(LoopOutcome, usize)> {
    let mut current_dimensions = initial_screenshot.dimensions;
    history.push(user_turn(&user_message, Some(&initial_screenshot)));

    let mut click_tracker = RepeatClickTracker::new();

    for iteration in 0..config.max_direct_iterations {
        if deps.cancel.is_cancelled() {
            return Ok((LoopOutcome::Done("Cancelled.".to_string()), iteration + 1));
        }

        let round_span = pipeline_round_span!(iteration as u32 + 1);
        let _round_enter = round_span.enter();
        let mut perf_guard = deps.perf.start();
        log_line(deps, &format!("pipeline round {} starting", iteration + 1)).await;

        trim_history_images(history);

        let request_id = uuid::Uuid::new_v4().to_string();
        let tools = vec![computer_tool_definition()];

        let mut text_buffer = String::new();
        let mut narrated_first_sentence = false;
        let mut tool_names: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        let mut tool_args: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        let mut tool_order: Vec<String> = Vec::new();
        let mut finish_reason = FinishReason::Stop;

        {
            let inference_span = inference_request_span!("anthropic", request_id.as_str());
            let _inference_enter = inference_span.enter();
            log_line(deps, &format!("inference request {request_id}")).await;
            let mut stream =
                deps.inference.stream_chat(request_id, SYSTEM_PROMPT.to_string(), history.clone(), tools);

            loop {
                let event = tokio::select! {
                    biased;
                    _ = deps.cancel.cancelled() => return Ok((LoopOutcome::Done("Cancelled.".to_string()), iteration + 1)),
                    event = stream.next() => event,
                };
                let Some(event) = event else { break };
                match event? {
                    LlmEvent::TextDelta { text } => {
                        text_buffer.push_str(&text);
                        if !narrated_first_sentence
                            && prefix_kind(&text_buffer).is_none()
                            && let Some(sentence) = first_sentence(&text_buffer)
                        {
                            deps.narration.enqueue(sentence.to_string()).await;
                            narrated_first_sentence = true;
                        }
                    }
                    LlmEvent::ToolCallStart { call_id, function_name } => {
                        tool_names.insert(call_id.clone(), function_name);
                        tool_args.insert(call_id.clone(), String::new());
                        tool_order.push(call_id);
                    }
                    LlmEvent::ToolCallArgsDelta { call_id, args_fragment } => {
                        tool_args.entry(call_id).or_default().push_str(&args_fragment);
                    }
                    LlmEvent::ToolCallEnd { .. } => {}
                    LlmEvent::StreamEnd { finish_reason: reason } => finish_reason = reason,
                    LlmEvent::StreamError { error } => return Err(VoxError::NetworkTransient(error)),
                    LlmEvent::StreamStart { .. } => {}
                }
            }
        }

        if let Some(outcome) = resolve_prefix_outcome(&text_buffer) {
            match outcome {
                PrefixOutcome::Done(summary) => {
                    perf_guard.emit_no_action();
                    return Ok((LoopOutcome::Done(summary), iteration + 1));
                }
                PrefixOutcome::Clarify(question) => {
                    perf_guard.emit_no_action();
                    return Ok((LoopOutcome::Clarify(question), iteration + 1));
                }
                PrefixOutcome::Guide(at, instruction) => {
                    deps.overlay.show_highlight(at, &instruction).await;
                    deps.narration.enqueue(instruction).await;
                    tokio::time::sleep(GUIDE_WAIT).await;
                    let screenshot = deps.screen.capture(deps.max_model_width).await?;
                    current_dimensions = screenshot.dimensions;
                    history.push(Message::assistant(vec![ContentBlock::text(text_buffer.clone())]));
                    history.push(user_turn(
                        "The user was guided. Here is the current screen. Continue helping.",
                        Some(&screenshot),
                    ));
                    perf_guard.emit_no_action();
                    continue;
                }
            }
        }

        let tool_calls: Vec<(String, String, serde_json::Value)> = tool_order
            .into_iter()
            .filter_map(|call_id| {
                let name = tool_names.remove(&call_id)?;
                let raw = tool_args.remove(&call_id).unwrap_or_default();
                match serde_json::from_str::<serde_json::Value>(&raw) {
                    Ok(value) => Some((call_id, name, value)),
                    Err(_) => {
                        warn!(call_id, "dropping tool call with incomplete argument JSON");
                        None
                    }
                }
            })
            .collect();

        if tool_calls.is_empty() {
            perf_guard.emit_no_action();
            if text_buffer.contains('?') {
                return Ok((LoopOutcome::Clarify(text_buffer), iteration + 1));
            }
            return Ok((LoopOutcome::Done(text_buffer), iteration + 1));
        }

        let mut assistant_content = vec![ContentBlock::text(text_buffer.clone())];
        for (id, name, input) in &tool_calls {
            assistant_content.push(ContentBlock::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() });
        }
        history.push(Message::assistant(assistant_content));

        let mut warning = None;
        for (_, _, input) in &tool_calls {
            if let Some(action_name) = input.get("action").and_then(|v| v.as_str())
                && let Some(raw_action) = ComputerAction::from_tool_input(action_name, input)
            {
                let action = current_dimensions.rescale(&raw_action);
                let tool_span = tool_execute_span!(action_name);
                let _tool_enter = tool_span.enter();
                log_line(deps, &format!("tool execute {action_name}")).await;
                deps.action_sink.dispatch(&action).await?;
                if let Some(w) = click_tracker.record(&action) {
                    warning = Some(w);
                }
                tokio::time::sleep(POST_ACTION_SLEEP).await;
            } else {
                warn!("unknown or malformed tool action, skipping");
            }
        }
        tokio::time::sleep(BATCH_SETTLE).await;
        let screenshot = deps.screen.capture(deps.max_model_width).await?;
        current_dimensions = screenshot.dimensions;

        if deps
            .window_maximized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            deps.action_sink.maximize_foreground_window().await?;
        }

        let last_index = tool_calls.len() - 1;
        let mut result_content = Vec::new();
        for (i, (id, name, _)) in tool_calls.iter().enumerate() {
            let mut content = vec![ContentBlock::text(format!("{name} executed."))];
            if i == last_index {
                content.push(ContentBlock::image(screenshot.media_type.clone(), screenshot.data.clone()));
                if let Some(w) = &warning {
                    content.push(ContentBlock::text(w.clone()));
                }
            }
            result_content.push(ContentBlock::ToolResult { tool_use_id: id.clone(), content });
        }
        history.push(Message::user(result_content));
        perf_guard.emit_action();

        if finish_reason != FinishReason::ToolCalls {
            return Ok((LoopOutcome::Done(text_buffer), iteration + 1));
        }
    }

    Ok((LoopOutcome::Escalate, config.max_direct_iterations))
}

/// Best-effort append to the per-session log (§4.9). A write failure here
/// must never abort the pipeline round it is annotating.
async fn log_line(deps: &ExecutorDeps<'_>, line: &str) {
    if let Err(err) = deps.session_log.lock().await.write_line(line) {
        warn!(%err, "failed to write session log line");
    }
}

fn user_turn(text: &str, screenshot: Option<&Screenshot>) -> Message {
    let mut content = vec![ContentBlock::text(text)];
    if let Some(shot) = screenshot {
        content.push(ContentBlock::image(shot.media_type.clone(), shot.data.clone()));
    }
    Message::user(content)
}

fn computer_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: "computer".to_string(),
        description: "Control the mouse and keyboard on the user's screen.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["left_click", "right_click", "double_click", "middle_click", "type", "key", "scroll", "mouse_move", "left_click_drag"],
                },
                "coordinate": { "type": "array", "items": { "type": "number" }, "minItems": 2, "maxItems": 2 },
                "start_coordinate": { "type": "array", "items": { "type": "number" }, "minItems": 2, "maxItems": 2 },
                "text": { "type": "string" },
                "key": { "type": "string" },
                "scroll_direction": { "type": "string", "enum": ["up", "down", "left", "right"] },
                "scroll_amount": { "type": "integer", "default": 3 },
            },
            "required": ["action"],
        }),
    }
}

enum PrefixOutcome {
    Done(String),
    Clarify(String),
    Guide(Point, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrefixKind {
    Guide,
    Narrate,
    Done,
    Clarify,
}

/// Whether `text`'s current content starts with one of the four
/// protocol prefixes, used during streaming to decide whether the
/// sentence-by-sentence narration path applies (§4.3.1 step 2).
fn prefix_kind(text: &str) -> Option<PrefixKind> {
    let trimmed = text.trim_start();
    if trimmed.starts_with("GUIDE:") {
        Some(PrefixKind::Guide)
    } else if trimmed.starts_with("NARRATE:") {
        Some(PrefixKind::Narrate)
    } else if trimmed.starts_with("DONE:") {
        Some(PrefixKind::Done)
    } else if trimmed.starts_with("CLARIFY:") {
        Some(PrefixKind::Clarify)
    } else {
        None
    }
}

/// The first sentence of `text` (up to and including its terminal
/// punctuation), or `None` if no sentence boundary has streamed in yet.
fn first_sentence(text: &str) -> Option<&str> {
    let end = text.find(['.', '!', '?'])?;
    Some(&text[..=end])
}

fn line_after(text: &str, pos: usize, prefix_len: usize) -> String {
    let rest = &text[pos + prefix_len..];
    let line_end = rest.find('\n').unwrap_or(rest.len());
    rest[..line_end].trim().to_string()
}

/// Resolve the completed response's protocol prefix, honoring precedence:
/// `DONE:`/`CLARIFY:` win over `GUIDE:`; the last `GUIDE:` wins among
/// multiple (§4.3.1 step 3, §6).
fn resolve_prefix_outcome(text: &str) -> Option<PrefixOutcome> {
    if let Some(pos) = text.find("DONE:") {
        return Some(PrefixOutcome::Done(line_after(text, pos, "DONE:".len())));
    }
    if let Some(pos) = text.find("CLARIFY:") {
        return Some(PrefixOutcome::Clarify(line_after(text, pos, "CLARIFY:".len())));
    }
    if let Some(pos) = text.rfind("GUIDE:") {
        let rest = &text[pos + "GUIDE:".len()..];
        let rest = rest.trim_start();
        if let Some((point, instruction)) = parse_guide_coordinate(rest) {
            return Some(PrefixOutcome::Guide(point, instruction));
        }
    }
    None
}

fn parse_guide_coordinate(rest: &str) -> Option<(Point, String)> {
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    let inside = &rest[open + 1..close];
    let mut parts = inside.split(',');
    let x: f64 = parts.next()?.trim().parse().ok()?;
    let y: f64 = parts.next()?.trim().parse().ok()?;
    let instruction = rest[close + 1..].trim().trim_start_matches('-').trim().to_string();
    Some((Point { x, y }, instruction))
}
