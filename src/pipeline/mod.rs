//! The two-model pipeline (§4.3): a fast streaming executor for most
//! requests, and a planner that decomposes harder requests into work
//! blocks, evaluates their outcomes, and replans on failure.

pub mod executor;
pub mod planner;
pub mod repeat_click;
pub mod types;

pub use executor::{ExecutorConfig, ExecutorDeps, run_direct_loop};
pub use planner::{evaluate_block, plan_pipeline, replan, replan_with_clarification};
pub use repeat_click::RepeatClickTracker;
pub use types::{EvaluateStatus, LoopOutcome, PipelineResponse, WorkBlock};

use crate::error::Result;

const MAX_ITERATIONS_PER_BLOCK: usize = 10;

/// Caps the number of replans a single turn may spend, shared across the
/// initial block sequence and any clarification-triggered continuation
/// (§4.3.2 step 2).
#[derive(Debug, Clone, Copy)]
pub struct ReplanBudget {
    used: usize,
    max: usize,
}

impl ReplanBudget {
    pub fn new(max: usize) -> Self {
        Self { used: 0, max }
    }

    /// Returns `true` and records a spend if the budget allows one more
    /// replan; `false` if the cap is already reached.
    pub fn try_spend(&mut self) -> bool {
        if self.used >= self.max {
            return false;
        }
        self.used += 1;
        true
    }
}

impl Default for ReplanBudget {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Outcome of running a sequence of work blocks to completion, a
/// mid-block clarification, or the replan cap (§4.3.2 step 2, §8.7).
#[derive(Debug, Clone, PartialEq)]
pub enum BlockRunOutcome {
    Finished(String),
    Clarify(String),
    ReplanCapReached(String),
}

/// Execute `blocks` sequentially (§4.3.2 step 2): each block's directive
/// drives one direct-execution loop, then `evaluate_block` judges the
/// result against a fresh screenshot. A `failed` judgement triggers
/// `replan`, restarting from block index 0 of the new plan, bounded by
/// `budget`.
pub async fn run_blocks(
    user_request: &str,
    mut blocks: Vec<WorkBlock>,
    deps: &ExecutorDeps<'_>,
    budget: &mut ReplanBudget,
) -> Result<BlockRunOutcome> {
    let block_config = ExecutorConfig { max_direct_iterations: MAX_ITERATIONS_PER_BLOCK, ..ExecutorConfig::default() };
    let mut accomplished = String::new();
    let mut index = 0;

    loop {
        if index >= blocks.len() {
            return Ok(BlockRunOutcome::Finished(accomplished));
        }
        let total = blocks.len();
        let block = blocks[index].clone();

        let screenshot = deps.screen.capture(deps.max_model_width).await?;
        let mut history = Vec::new();
        let (outcome, iterations) =
            run_direct_loop(block.directive.clone(), screenshot, &mut history, deps, &block_config).await?;

        match outcome {
            LoopOutcome::Clarify(question) => return Ok(BlockRunOutcome::Clarify(question)),
            LoopOutcome::Done(summary) => {
                accomplished.push_str(&summary);
                accomplished.push(' ');

                let hit_limit = iterations >= MAX_ITERATIONS_PER_BLOCK;
                let current_screenshot = deps.screen.capture(deps.max_model_width).await?;
                let verdict = evaluate_block(
                    deps.inference,
                    &block.expected_outcome,
                    &current_screenshot,
                    iterations,
                    hit_limit,
                    index,
                    total,
                )
                .await?;

                match verdict {
                    EvaluateStatus::Ok { .. } => index += 1,
                    EvaluateStatus::Failed { .. } => {
                        if !budget.try_spend() {
                            return Ok(BlockRunOutcome::ReplanCapReached(accomplished));
                        }
                        let fresh = replan(deps.inference, user_request, &accomplished, &current_screenshot).await?;
                        blocks = fresh.blocks;
                        index = 0;
                    }
                }
            }
            LoopOutcome::Escalate => {
                if !budget.try_spend() {
                    return Ok(BlockRunOutcome::ReplanCapReached(accomplished));
                }
                let current_screenshot = deps.screen.capture(deps.max_model_width).await?;
                let fresh = replan(deps.inference, user_request, &accomplished, &current_screenshot).await?;
                blocks = fresh.blocks;
                index = 0;
            }
        }
    }
}
