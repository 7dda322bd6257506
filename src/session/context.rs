//! A bounded ring of recent conversation lines (§3).
//!
//! `SessionContext` keeps only the most recent 10 lines, each prefixed
//! `User:` or `Agent:`, for inclusion in planner/executor prompts. It is not
//! persisted — it resets with the process.

const MAX_LINES: usize = 10;

/// Bounded ring buffer of the last [`MAX_LINES`] conversation lines.
#[derive(Debug, Default, Clone)]
pub struct SessionContext {
    lines: Vec<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self { lines: Vec::with_capacity(MAX_LINES) }
    }

    pub fn push_user(&mut self, text: &str) {
        self.push(format!("User: {text}"));
    }

    pub fn push_agent(&mut self, text: &str) {
        self.push(format!("Agent: {text}"));
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == MAX_LINES {
            self.lines.remove(0);
        }
        self.lines.push(line);
    }

    /// Render the ring as a single block of newline-joined lines, oldest first.
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}
