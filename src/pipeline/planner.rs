//! Planner pipeline: decomposes a hard request into work blocks,
//! evaluates their outcomes against the screen, and replans on failure
//! (§4.3.2, §6).

use futures_util::StreamExt;

use crate::error::{Result, VoxError};
use crate::inference::client::InferenceClient;
use crate::inference::events::LlmEvent;
use crate::inference::types::{ContentBlock, Message};
use crate::screen::Screenshot;

use super::types::{EvaluateStatus, PipelineResponse, WorkBlock};

const PLANNER_SYSTEM_PROMPT: &str = "You are a planner. Reply with JSON only, no prose, \
matching the schema the caller describes. Never call tools.";

/// Break `user_request` into 1-4 work blocks, with up to 2 clarification
/// questions if the request is underspecified (§4.3.2 step 1).
pub async fn plan_pipeline(
    inference: &InferenceClient,
    user_request: &str,
    screenshot: &Screenshot,
) -> Result<PipelineResponse> {
    let prompt = format!(
        "Plan how to accomplish this request on the current screen: \"{user_request}\". \
         Reply with JSON: {{\"blocks\": [{{\"directive\": string, \"expected_outcome\": string}}, ...], \
         \"clarifications\": [string, ...]}}."
    );
    let message = user_turn(&prompt, Some(screenshot));
    let raw = run_planner_prompt(inference, message).await?;
    parse_pipeline_response(&raw)
}

/// Ask the planner whether a completed block's expected outcome is
/// visible on `current_screenshot` (§4.3.2 step 2).
pub async fn evaluate_block(
    inference: &InferenceClient,
    expected_outcome: &str,
    current_screenshot: &Screenshot,
    iterations: usize,
    hit_iteration_limit: bool,
    block_index: usize,
    total: usize,
) -> Result<EvaluateStatus> {
    let prompt = format!(
        "Block {}/{} ran for {} iteration(s) (iteration limit hit: {}). \
         Expected outcome: \"{}\". Does the current screen show this outcome? \
         Reply with JSON: {{\"status\": \"ok\" | \"failed\", \"summary\": string}}.",
        block_index + 1,
        total,
        iterations,
        hit_iteration_limit,
        expected_outcome
    );
    let message = user_turn(&prompt, Some(current_screenshot));
    let raw = run_planner_prompt(inference, message).await?;
    parse_evaluate_status(&raw)
}

/// Produce a fresh 1-3 block plan after a block failed evaluation
/// (§4.3.2 step 2).
pub async fn replan(
    inference: &InferenceClient,
    user_request: &str,
    accomplished_so_far: &str,
    screenshot: &Screenshot,
) -> Result<PipelineResponse> {
    let prompt = format!(
        "The original request was: \"{user_request}\". So far: \"{accomplished_so_far}\". \
         Propose a fresh plan (1-3 blocks) to finish the request from the current screen. \
         Reply with JSON: {{\"blocks\": [{{\"directive\": string, \"expected_outcome\": string}}, ...]}}."
    );
    let message = user_turn(&prompt, Some(screenshot));
    let raw = run_planner_prompt(inference, message).await?;
    parse_pipeline_response(&raw)
}

/// Produce follow-up blocks once a deferred clarification question has
/// been answered (§4.3.2 step 3).
pub async fn replan_with_clarification(
    inference: &InferenceClient,
    original_request: &str,
    answer: &str,
    accomplished_so_far: &str,
    screenshot: &Screenshot,
) -> Result<PipelineResponse> {
    let prompt = format!(
        "The original request was: \"{original_request}\". The user answered: \"{answer}\". \
         So far: \"{accomplished_so_far}\". Propose the remaining blocks to finish the request. \
         Reply with JSON: {{\"blocks\": [{{\"directive\": string, \"expected_outcome\": string}}, ...]}}."
    );
    let message = user_turn(&prompt, Some(screenshot));
    let raw = run_planner_prompt(inference, message).await?;
    parse_pipeline_response(&raw)
}

fn user_turn(text: &str, screenshot: Option<&Screenshot>) -> Message {
    let mut content = vec![ContentBlock::text(text)];
    if let Some(shot) = screenshot {
        content.push(ContentBlock::image(shot.media_type.clone(), shot.data.clone()));
    }
    Message::user(content)
}

async fn run_planner_prompt(inference: &InferenceClient, message: Message) -> Result<String> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut stream =
        inference.stream_chat(request_id, PLANNER_SYSTEM_PROMPT.to_string(), vec![message], Vec::new());

    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            LlmEvent::TextDelta { text: delta } => text.push_str(&delta),
            LlmEvent::StreamError { error } => return Err(VoxError::NetworkTransient(error)),
            _ => {}
        }
    }
    Ok(text)
}

/// Extract a JSON object from a planner reply that may be wrapped in
/// markdown fences or surrounded by prose (§4.3.2, §6).
fn extract_json_object(raw: &str) -> Result<serde_json::Value> {
    let start = raw.find('{').ok_or_else(|| VoxError::ParseError("planner reply contained no JSON object".into()))?;
    let end = raw.rfind('}').ok_or_else(|| VoxError::ParseError("planner reply contained no JSON object".into()))?;
    if end < start {
        return Err(VoxError::ParseError("planner reply had mismatched braces".into()));
    }
    serde_json::from_str(&raw[start..=end]).map_err(|e| VoxError::ParseError(format!("malformed planner JSON: {e}")))
}

fn parse_pipeline_response(raw: &str) -> Result<PipelineResponse> {
    let value = extract_json_object(raw)?;
    let blocks = value["blocks"]
        .as_array()
        .ok_or_else(|| VoxError::ParseError("planner JSON missing 'blocks' array".into()))?
        .iter()
        .map(|b| WorkBlock {
            directive: b["directive"].as_str().unwrap_or_default().to_string(),
            expected_outcome: b["expected_outcome"].as_str().unwrap_or_default().to_string(),
        })
        .collect();
    let clarifications = value["clarifications"]
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    Ok(PipelineResponse { blocks, clarifications })
}

fn parse_evaluate_status(raw: &str) -> Result<EvaluateStatus> {
    let value = extract_json_object(raw)?;
    let summary = value["summary"].as_str().unwrap_or_default().to_string();
    match value["status"].as_str() {
        Some("ok") => Ok(EvaluateStatus::Ok { summary }),
        Some("failed") => Ok(EvaluateStatus::Failed { summary }),
        _ => Err(VoxError::ParseError("planner JSON had unrecognized 'status'".into())),
    }
}
