//! Speculative dispatcher: fire an inference call on a stable partial
//! transcript before STT finalizes, and claim it if it still matches (§4.2).

use std::time::{Duration, Instant};

/// Cooldown between fires.
const FIRE_COOLDOWN: Duration = Duration::from_millis(500);
/// Minimum age of a Ready result before it can be claimed.
const MIN_READY_AGE: Duration = Duration::from_millis(200);

const STOPWORDS: &[&str] = &["the", "a", "an", "please", "can", "you", "could", "would"];

const COMMAND_VERBS: &[&str] = &[
    "open", "go", "click", "search", "find", "type", "close", "switch", "tab", "run", "show",
    "hide", "scroll", "select", "copy", "paste", "delete", "send", "reply", "forward", "navigate",
    "maximize", "minimize",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Idle,
    Inflight,
    Ready,
    Claimed,
    Cancelled,
}

struct Slot<T> {
    state: SlotState,
    /// Which generation currently owns this slot. Compared against the
    /// dispatcher's monotonic counter, never reset on its own (§4.2 rule 1).
    generation: u64,
    partial_text: String,
    utterance_id: u64,
    fired_at: Option<Instant>,
    ready_at: Option<Instant>,
    payload: Option<T>,
}

impl<T> Slot<T> {
    fn idle(generation: u64) -> Self {
        Self {
            state: SlotState::Idle,
            generation,
            partial_text: String::new(),
            utterance_id: 0,
            fired_at: None,
            ready_at: None,
            payload: None,
        }
    }
}

#[derive(Default)]
struct Stats {
    total: u32,
    hits: u32,
    consecutive_misses: u32,
    disabled: bool,
}

/// Single-slot speculative dispatcher. `T` is whatever payload the caller's
/// inference call produces (a plan, a direct-execution result, etc).
pub struct SpeculativeDispatcher<T> {
    slot: std::sync::Mutex<Slot<T>>,
    stats: std::sync::Mutex<Stats>,
    last_fire_at: std::sync::Mutex<Option<Instant>>,
    /// Monotonic epoch counter, never reset across the dispatcher's
    /// lifetime so a late-arriving claim from a stale epoch can never
    /// alias a newer one (§4.2 rule 1).
    generation: std::sync::atomic::AtomicU64,
}

impl<T> Default for SpeculativeDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SpeculativeDispatcher<T> {
    pub fn new() -> Self {
        Self {
            slot: std::sync::Mutex::new(Slot::idle(0)),
            stats: std::sync::Mutex::new(Stats::default()),
            last_fire_at: std::sync::Mutex::new(None),
            generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.stats.lock().unwrap().disabled
    }

    /// Attempt to fire on a stable partial transcript. Returns the
    /// generation token on success, to be passed to [`complete`](Self::complete)
    /// or [`cancel`](Self::cancel) when the async call resolves.
    pub fn fire(&self, partial_text: &str, utterance_id: u64) -> Option<u64> {
        if self.is_disabled() {
            return None;
        }

        let word_count = partial_text.split_whitespace().count();
        if word_count < 2 {
            return None;
        }

        let mut last_fire = self.last_fire_at.lock().unwrap();
        if let Some(last) = *last_fire {
            if last.elapsed() < FIRE_COOLDOWN {
                return None;
            }
        }

        let mut slot = self.slot.lock().unwrap();
        if slot.state != SlotState::Idle {
            return None;
        }

        slot.generation = self.generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        slot.state = SlotState::Inflight;
        slot.partial_text = partial_text.to_string();
        slot.utterance_id = utterance_id;
        slot.fired_at = Some(Instant::now());
        slot.ready_at = None;
        slot.payload = None;
        *last_fire = Some(Instant::now());
        Some(slot.generation)
    }

    /// The speculative inference call succeeded. No-op if `generation` is stale.
    pub fn complete(&self, generation: u64, payload: T) {
        let mut slot = self.slot.lock().unwrap();
        if slot.generation != generation || slot.state != SlotState::Inflight {
            return;
        }
        slot.state = SlotState::Ready;
        slot.ready_at = Some(Instant::now());
        slot.payload = Some(payload);
    }

    /// The speculative inference call errored. No-op if `generation` is stale.
    pub fn cancel(&self, generation: u64) {
        let mut slot = self.slot.lock().unwrap();
        if slot.generation != generation {
            return;
        }
        slot.state = SlotState::Cancelled;
        slot.payload = None;
        self.reset_to_idle(&mut slot);
    }

    /// Attempt to claim the Ready slot against the final transcript.
    /// `is_simple` classifies a string as a "simple command" per §4.5.
    pub fn claim(
        &self,
        final_text: &str,
        utterance_id: u64,
        is_simple: &dyn Fn(&str) -> bool,
    ) -> Option<T> {
        let mut slot = self.slot.lock().unwrap();
        if slot.state != SlotState::Ready {
            return None;
        }
        if slot.utterance_id != utterance_id {
            self.record_outcome(false);
            self.reset_to_idle(&mut slot);
            return None;
        }
        let ready_at = slot.ready_at.unwrap_or_else(Instant::now);
        let fired_at = slot.fired_at.unwrap_or(ready_at);
        if ready_at.duration_since(fired_at) < MIN_READY_AGE {
            self.record_outcome(false);
            self.reset_to_idle(&mut slot);
            return None;
        }
        if !tokens_similar(&slot.partial_text, final_text, is_simple) {
            self.record_outcome(false);
            self.reset_to_idle(&mut slot);
            return None;
        }

        slot.state = SlotState::Claimed;
        let payload = slot.payload.take();
        self.record_outcome(true);
        self.reset_to_idle(&mut slot);
        payload
    }

    fn reset_to_idle(&self, slot: &mut Slot<T>) {
        *slot = Slot::idle(slot.generation);
    }

    fn record_outcome(&self, hit: bool) {
        let mut stats = self.stats.lock().unwrap();
        stats.total += 1;
        if hit {
            stats.hits += 1;
            stats.consecutive_misses = 0;
        } else {
            stats.consecutive_misses += 1;
        }

        if stats.total >= 10 && (stats.hits as f64 / stats.total as f64) < 0.30 {
            stats.disabled = true;
        }
        if stats.consecutive_misses > 5 && stats.hits == 0 {
            stats.disabled = true;
        }
    }
}

fn normalize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .filter(|s| !STOPWORDS.contains(s))
        .map(|s| s.to_string())
        .collect()
}

/// Token-based, order-preserving similarity predicate (§4.2 tiers A–D).
pub fn tokens_similar(partial: &str, final_text: &str, is_simple: &dyn Fn(&str) -> bool) -> bool {
    let partial_tokens = normalize(partial);
    let final_tokens = normalize(final_text);

    if final_tokens.len() < partial_tokens.len().saturating_sub(1).max(2) {
        return false;
    }

    if is_simple(partial) != is_simple(final_text) {
        return false;
    }

    if partial_tokens.len() <= 3 || final_tokens.len() <= 3 {
        let partial_first = partial_tokens.first();
        let final_first = final_tokens.first();
        let both_verbs = partial_first.is_some_and(|t| COMMAND_VERBS.contains(&t.as_str()))
            && final_first.is_some_and(|t| COMMAND_VERBS.contains(&t.as_str()));
        if partial_first != final_first || !both_verbs {
            return false;
        }
    }

    // Tier A: exact equality.
    if partial_tokens == final_tokens {
        return true;
    }

    // Tier B: partial is a prefix of final, at least 2 tokens.
    if partial_tokens.len() >= 2 && final_tokens.starts_with(&partial_tokens) {
        return true;
    }

    // Tier C: equal counts in {2,3}, first token matches, edit distance <= 1 elsewhere.
    if partial_tokens.len() == final_tokens.len()
        && (partial_tokens.len() == 2 || partial_tokens.len() == 3)
        && partial_tokens.first() == final_tokens.first()
    {
        let mismatches = partial_tokens
            .iter()
            .zip(final_tokens.iter())
            .filter(|(a, b)| levenshtein(a, b) > 0)
            .count();
        if mismatches <= 1 {
            return true;
        }
    }

    // Tier D: whitespace-joined Levenshtein distance < 15% of the longer length.
    let joined_partial = partial_tokens.join(" ");
    let joined_final = final_tokens.join(" ");
    let longer = joined_partial.len().max(joined_final.len());
    if longer > 0 {
        let distance = levenshtein(&joined_partial, &joined_final);
        if (distance as f64) < 0.15 * longer as f64 {
            return true;
        }
    }

    false
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
