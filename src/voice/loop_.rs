//! The voice loop: owns one [`Utterance`](super::utterance::Utterance) at a
//! time, routes it to the fast or planner path, and drives the
//! clarification bridge and wait-for-done polling (§4.5).

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::action::ActionSink;
use crate::error::{Result, VoxError};
use crate::inference::client::InferenceClient;
use crate::inference::events::LlmEvent;
use crate::inference::types::{ContentBlock, Message};
use crate::narration::NarrationQueue;
use crate::observability::SessionLog;
use crate::perf::PerfTracker;
use crate::pipeline::executor::{ExecutorConfig, ExecutorDeps, OverlaySink, run_direct_loop};
use crate::pipeline::planner::{plan_pipeline, replan_with_clarification};
use crate::pipeline::types::LoopOutcome;
use crate::pipeline::{BlockRunOutcome, ReplanBudget, run_blocks};
use crate::screen::ScreenSource;
use crate::session::context::SessionContext;
use crate::session::memory::MemoryStore;
use crate::speculative::SpeculativeDispatcher;
use crate::stt::{SttProvider, fix_email_whitespace};

use super::clarification::ClarificationBridge;
use super::routing::is_simple_command;

/// Interval at which [`run_until_done`] polls the completion box without
/// opening the microphone (§4.5 wait-for-done).
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Ceiling on how long the loop holds after a task completes, letting the
/// narration queue finish speaking the summary (§4.5).
const POST_COMPLETION_HOLD: Duration = Duration::from_secs(5);

const FILLERS: &[&str] = &["On it.", "Sure.", "Let me do that.", "Got it.", "One moment."];

/// Pick one of the filler acknowledgements at random (§4.5 Simple path).
pub fn random_filler() -> &'static str {
    FILLERS[rand::random::<usize>() % FILLERS.len()]
}

/// The two kinds of immediate, non-LLM transcript that short-circuit
/// normal routing (§4.5 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialToken {
    /// `quit|goodbye|exit`.
    Quit,
    /// `stop|cancel|never mind`.
    StopCurrentTask,
}

/// Classify a cleaned transcript as a special token, if it is one. Match
/// is whole-word, case-insensitive, against the transcript as a whole
/// (§4.5 step 4).
pub fn classify_special_token(transcript: &str) -> Option<SpecialToken> {
    let words: Vec<String> = transcript
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let lowered = transcript.to_lowercase();

    if words.iter().any(|w| w == "quit" || w == "goodbye" || w == "exit") {
        return Some(SpecialToken::Quit);
    }
    if words.iter().any(|w| w == "stop" || w == "cancel") || lowered.contains("never mind") {
        return Some(SpecialToken::StopCurrentTask);
    }
    None
}

/// Holds the terminal outcome of the in-flight action task so the voice
/// loop can poll for it without opening the microphone (§4.5).
#[derive(Default)]
pub struct TaskCompletionBox {
    outcome: Mutex<Option<LoopOutcomeSummary>>,
}

/// A flattened, speakable summary of a finished task, independent of
/// which path (simple, planner) produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcomeSummary {
    Done(String),
    Clarify(String),
    Escalated,
}

impl TaskCompletionBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn complete(&self, outcome: LoopOutcomeSummary) {
        *self.outcome.lock().await = Some(outcome);
    }

    /// Non-blocking check; does not consume the result.
    pub async fn is_done(&self) -> bool {
        self.outcome.lock().await.is_some()
    }

    /// Take the completed outcome, clearing the box for the next task.
    pub async fn take(&self) -> Option<LoopOutcomeSummary> {
        self.outcome.lock().await.take()
    }

    /// Poll at [`COMPLETION_POLL_INTERVAL`] until a result lands.
    pub async fn wait(&self) -> LoopOutcomeSummary {
        loop {
            if let Some(outcome) = self.take().await {
                return outcome;
            }
            tokio::time::sleep(COMPLETION_POLL_INTERVAL).await;
        }
    }
}

/// What the interpreter decided to do with a "complex" transcript
/// (§4.5 Complex path).
#[derive(Debug, Clone, PartialEq)]
pub enum InterpretedInput {
    Command { directive: String },
    Followup { directive: String },
    Interrupt { response: String },
    Chat { response: String },
    Memory { response: String, remember: String },
}

/// Everything a voice turn needs, gathered from the surrounding session
/// so `handle_transcript` stays a pure-ish dispatcher over traits.
pub struct VoiceLoopDeps<'a> {
    pub inference: &'a InferenceClient,
    pub narration: &'a NarrationQueue,
    pub action_sink: &'a dyn ActionSink,
    pub screen: &'a dyn ScreenSource,
    pub overlay: &'a dyn OverlaySink,
    pub clarification: &'a ClarificationBridge,
    pub speculative: &'a SpeculativeDispatcher<SpeculativePayload>,
    pub window_maximized: &'a AtomicBool,
    pub session_context: &'a Mutex<SessionContext>,
    pub memory: &'a Mutex<MemoryStore>,
    pub max_model_width: u32,
    /// Cancelled by the caller when a new utterance supersedes this one, or
    /// on a spoken "stop" (§5 Ordering guarantees, Cancellation).
    pub cancel: &'a CancellationToken,
    pub perf: &'a PerfTracker,
    pub session_log: &'a Mutex<SessionLog>,
}

/// What a claimed speculative slot carries forward: the narration text
/// to preempt the filler with, and whether it had at least one tool call
/// worth dispatching directly (§4.5 Simple path).
#[derive(Debug, Clone, PartialEq)]
pub struct SpeculativePayload {
    pub narration_text: String,
    pub has_tool_call: bool,
}

/// Result of processing one final transcript (§4.5 steps 3-6 onward).
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptOutcome {
    /// Transcript was empty; no utterance id consumed.
    Ignored,
    /// Handled a special token; caller should act on it (shut down, or
    /// cancel the running task and announce).
    Special(SpecialToken),
    /// Transcript was routed into the clarification bridge; no new task.
    RoutedToClarification,
    /// A new action task outcome, reached synchronously in this call.
    Finished(LoopOutcomeSummary),
}

/// Process one final STT transcript end to end (§4.5 steps 2-6, Simple
/// and Complex paths). Cancellation of a prior task is the caller's
/// responsibility, signalled by dropping/aborting its task handle before
/// calling this for the next utterance.
pub async fn handle_transcript(
    raw_transcript: &str,
    deps: &VoiceLoopDeps<'_>,
    replan_budget_max: usize,
) -> Result<TranscriptOutcome> {
    let cleaned = fix_email_whitespace(raw_transcript.trim());
    if cleaned.trim().is_empty() {
        return Ok(TranscriptOutcome::Ignored);
    }

    if let Some(special) = classify_special_token(&cleaned) {
        return Ok(TranscriptOutcome::Special(special));
    }

    if deps.clarification.is_pending().await {
        deps.clarification.provide_answer(cleaned).await;
        return Ok(TranscriptOutcome::RoutedToClarification);
    }

    deps.session_context.lock().await.push_user(&cleaned);

    let outcome = if is_simple_command(&cleaned) {
        run_simple_path(&cleaned, deps, replan_budget_max).await?
    } else {
        match interpret_voice_input(deps.inference, &cleaned, deps.session_context, deps.memory).await {
            Ok(interpreted) => run_complex_path(interpreted, deps, replan_budget_max).await?,
            Err(e) => {
                warn!(error = %e, "interpreter call failed, falling back to simple path");
                run_simple_path(&cleaned, deps, replan_budget_max).await?
            }
        }
    };

    let summary = match &outcome {
        LoopOutcomeSummary::Done(s) => s.clone(),
        LoopOutcomeSummary::Clarify(q) => q.clone(),
        LoopOutcomeSummary::Escalated => "escalated without finishing".to_string(),
    };
    deps.session_context.lock().await.push_agent(&summary);

    Ok(TranscriptOutcome::Finished(outcome))
}

/// §4.5 step 1: open the microphone for one utterance, firing speculative
/// dispatch on the first stable partial transcript so a guessed direct
/// loop is already resolved by the time the final transcript lands.
/// Resolves the fired slot (`complete`/`cancel`) before handing the final
/// transcript to [`handle_transcript`], so [`run_simple_path`]'s `claim`
/// sees a Ready slot rather than one stuck Inflight.
pub async fn listen_and_handle(
    stt: &dyn SttProvider,
    deps: &VoiceLoopDeps<'_>,
    replan_budget_max: usize,
) -> Result<TranscriptOutcome> {
    let utterance_id = super::utterance::next_utterance_id();
    let (fire_tx, mut fire_rx) = tokio::sync::mpsc::unbounded_channel::<(u64, String)>();

    let on_stable_partial = move |partial: &str| {
        if let Some(generation) = deps.speculative.fire(partial, utterance_id) {
            let _ = fire_tx.send((generation, partial.to_string()));
        }
    };

    let transcript = stt.listen(&on_stable_partial).await?;

    if let Ok((generation, partial)) = fire_rx.try_recv() {
        match run_loop_once(&partial, deps).await {
            Ok(outcome) => {
                let has_tool_call = !matches!(outcome, LoopOutcome::Escalate);
                let narration_text = match outcome {
                    LoopOutcome::Done(s) => s,
                    LoopOutcome::Clarify(q) => q,
                    LoopOutcome::Escalate => String::new(),
                };
                deps.speculative.complete(generation, SpeculativePayload { narration_text, has_tool_call });
            }
            Err(_) => deps.speculative.cancel(generation),
        }
    }

    let Some(transcript) = transcript else {
        return Ok(TranscriptOutcome::Ignored);
    };
    handle_transcript(&transcript, deps, replan_budget_max).await
}

/// Simple path (§4.5): preempt the filler with a claimed speculative
/// result if one matches, otherwise cancel the slot and run the direct
/// loop, escalating to the planner on `escalate` or a second `clarify`.
async fn run_simple_path(
    cleaned: &str,
    deps: &VoiceLoopDeps<'_>,
    replan_budget_max: usize,
) -> Result<LoopOutcomeSummary> {
    deps.narration.enqueue(random_filler()).await;

    let utterance_id = super::utterance::next_utterance_id();
    let claimed = deps.speculative.claim(cleaned, utterance_id, &is_simple_command);

    let first_outcome = match claimed {
        Some(payload) if payload.has_tool_call => {
            deps.narration.interrupt_and_enqueue(payload.narration_text);
            run_loop_once(cleaned, deps).await?
        }
        _ => run_loop_once(cleaned, deps).await?,
    };

    match first_outcome {
        LoopOutcome::Done(summary) => Ok(LoopOutcomeSummary::Done(summary)),
        LoopOutcome::Clarify(question) => Ok(LoopOutcomeSummary::Clarify(question)),
        LoopOutcome::Escalate => escalate_to_planner(cleaned, deps, replan_budget_max).await,
    }
}

async fn run_complex_path(
    interpreted: InterpretedInput,
    deps: &VoiceLoopDeps<'_>,
    replan_budget_max: usize,
) -> Result<LoopOutcomeSummary> {
    match interpreted {
        InterpretedInput::Command { directive } | InterpretedInput::Followup { directive } => {
            match run_loop_once(&directive, deps).await? {
                LoopOutcome::Done(summary) => Ok(LoopOutcomeSummary::Done(summary)),
                LoopOutcome::Clarify(question) => Ok(LoopOutcomeSummary::Clarify(question)),
                LoopOutcome::Escalate => escalate_to_planner(&directive, deps, replan_budget_max).await,
            }
        }
        InterpretedInput::Interrupt { response } | InterpretedInput::Chat { response } => {
            deps.narration.enqueue(response.clone()).await;
            Ok(LoopOutcomeSummary::Done(response))
        }
        InterpretedInput::Memory { response, remember } => {
            let _ = deps.memory.lock().await.add_fact(&remember)?;
            deps.narration.enqueue(response.clone()).await;
            Ok(LoopOutcomeSummary::Done(response))
        }
    }
}

async fn run_loop_once(directive: &str, deps: &VoiceLoopDeps<'_>) -> Result<LoopOutcome> {
    let screenshot = deps.screen.capture(deps.max_model_width).await?;
    let mut history = Vec::new();
    let executor_deps = ExecutorDeps {
        inference: deps.inference,
        narration: deps.narration,
        action_sink: deps.action_sink,
        screen: deps.screen,
        overlay: deps.overlay,
        max_model_width: deps.max_model_width,
        window_maximized: deps.window_maximized,
        cancel: deps.cancel,
        perf: deps.perf,
        session_log: deps.session_log,
    };
    let (outcome, _iterations) =
        run_direct_loop(directive.to_string(), screenshot, &mut history, &executor_deps, &ExecutorConfig::default())
            .await?;
    Ok(outcome)
}

fn summarize_block_outcome(outcome: BlockRunOutcome) -> LoopOutcomeSummary {
    match outcome {
        BlockRunOutcome::Finished(summary) => LoopOutcomeSummary::Done(summary),
        BlockRunOutcome::Clarify(question) => LoopOutcomeSummary::Clarify(question),
        BlockRunOutcome::ReplanCapReached(summary) => {
            warn!("replan cap reached, reporting partial progress");
            LoopOutcomeSummary::Done(summary)
        }
    }
}

/// Planner path (§4.3.2, §4.3.3): run the executable blocks, then if the
/// plan deferred a final block behind a clarification, ask it over the
/// clarification bridge, replan with the answer, and run what that
/// produces (§8 Scenario 3).
async fn escalate_to_planner(
    request: &str,
    deps: &VoiceLoopDeps<'_>,
    replan_budget_max: usize,
) -> Result<LoopOutcomeSummary> {
    let screenshot = deps.screen.capture(deps.max_model_width).await?;
    let plan = plan_pipeline(deps.inference, request, &screenshot).await?;
    let mut budget = ReplanBudget::new(replan_budget_max);
    let executor_deps = ExecutorDeps {
        inference: deps.inference,
        narration: deps.narration,
        action_sink: deps.action_sink,
        screen: deps.screen,
        overlay: deps.overlay,
        max_model_width: deps.max_model_width,
        window_maximized: deps.window_maximized,
        cancel: deps.cancel,
        perf: deps.perf,
        session_log: deps.session_log,
    };

    let blocks = plan.executable_blocks().to_vec();
    let outcome = run_blocks(request, blocks, &executor_deps, &mut budget).await?;

    let accomplished = match (&outcome, plan.clarifications.first()) {
        (BlockRunOutcome::Finished(summary), Some(_)) => summary.clone(),
        _ => return Ok(summarize_block_outcome(outcome)),
    };

    let question = plan.clarifications[0].clone();
    let rx = deps.clarification.mark_pending().await;
    deps.narration.enqueue(question).await;
    let Some(answer) = deps.clarification.wait_for_answer(rx).await else {
        return Ok(LoopOutcomeSummary::Done(accomplished));
    };

    let fresh_screenshot = deps.screen.capture(deps.max_model_width).await?;
    let fresh =
        replan_with_clarification(deps.inference, request, &answer, &accomplished, &fresh_screenshot).await?;
    let final_outcome =
        run_blocks(request, fresh.executable_blocks().to_vec(), &executor_deps, &mut budget).await?;
    Ok(summarize_block_outcome(final_outcome))
}

const INTERPRETER_SYSTEM_PROMPT: &str = "You classify a voice transcript against the current \
conversation. Reply with JSON only: {\"type\": \"command\"|\"followup\"|\"interrupt\"|\"chat\"|\"memory\", \
\"directive\": string, \"response\": string, \"remember\": string}.";

/// Classify a "complex" transcript against recent session context and
/// long-term memory (§4.5 Complex path).
async fn interpret_voice_input(
    inference: &InferenceClient,
    transcript: &str,
    session_context: &Mutex<SessionContext>,
    memory: &Mutex<MemoryStore>,
) -> Result<InterpretedInput> {
    let context_block = session_context.lock().await.render();
    let facts = memory.lock().await.facts().join("; ");
    let prompt = format!(
        "Recent conversation:\n{context_block}\n\nKnown facts: {facts}\n\nTranscript: \"{transcript}\"\n\
         Reply with the JSON described."
    );
    let message = Message::user(vec![ContentBlock::text(prompt)]);
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut stream =
        inference.stream_chat(request_id, INTERPRETER_SYSTEM_PROMPT.to_string(), vec![message], Vec::new());

    let mut raw = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            LlmEvent::TextDelta { text } => raw.push_str(&text),
            LlmEvent::StreamError { error } => return Err(VoxError::NetworkTransient(error)),
            _ => {}
        }
    }
    parse_interpreted_input(&raw)
}

fn parse_interpreted_input(raw: &str) -> Result<InterpretedInput> {
    let start = raw.find('{').ok_or_else(|| VoxError::ParseError("interpreter reply contained no JSON object".into()))?;
    let end = raw.rfind('}').ok_or_else(|| VoxError::ParseError("interpreter reply contained no JSON object".into()))?;
    let value: serde_json::Value = serde_json::from_str(&raw[start..=end])
        .map_err(|e| VoxError::ParseError(format!("malformed interpreter JSON: {e}")))?;

    let directive = value["directive"].as_str().unwrap_or_default().to_string();
    let response = value["response"].as_str().unwrap_or_default().to_string();
    let remember = value["remember"].as_str().unwrap_or_default().to_string();

    match value["type"].as_str() {
        Some("command") => Ok(InterpretedInput::Command { directive }),
        Some("followup") => Ok(InterpretedInput::Followup { directive }),
        Some("interrupt") => Ok(InterpretedInput::Interrupt { response }),
        Some("chat") => Ok(InterpretedInput::Chat { response }),
        Some("memory") => Ok(InterpretedInput::Memory { response, remember }),
        _ => Err(VoxError::ParseError("interpreter JSON had unrecognized 'type'".into())),
    }
}

/// After a task completes, hold briefly so its spoken summary finishes
/// before the next `listen()` mutes the narration queue (§4.5).
pub async fn hold_for_narration(narration: &NarrationQueue) {
    let deadline = tokio::time::Instant::now() + POST_COMPLETION_HOLD;
    while narration.is_active() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
