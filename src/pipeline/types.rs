//! Data model for the planner's work-block protocol (§3, §4.3.2).

/// A planner-issued unit of work (§3). Immutable once planned.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkBlock {
    pub directive: String,
    pub expected_outcome: String,
}

/// The planner's reply to an initial request (§3, §4.3.2).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineResponse {
    pub blocks: Vec<WorkBlock>,
    pub clarifications: Vec<String>,
}

impl PipelineResponse {
    /// A response with blocks and no questions is executable end-to-end;
    /// one with questions declares the last block(s) depend on answers
    /// and must not run until a clarification is resolved (§3, §4.3.2).
    pub fn executable_blocks(&self) -> &[WorkBlock] {
        if self.clarifications.is_empty() || self.blocks.is_empty() {
            &self.blocks
        } else {
            &self.blocks[..self.blocks.len() - 1]
        }
    }

    pub fn deferred_block(&self) -> Option<&WorkBlock> {
        if self.clarifications.is_empty() { None } else { self.blocks.last() }
    }
}

/// Outcome of one `evaluate_block` call (§4.3.2).
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluateStatus {
    Ok { summary: String },
    Failed { summary: String },
}

/// Terminal outcome of the direct-execution loop (§4.3.1 step 6).
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    Done(String),
    Clarify(String),
    Escalate,
}
