//! Clarification bridge: a single-slot rendezvous that suspends an
//! in-flight action task while a question is spoken and answered through
//! the same microphone (§4.5).

use tokio::sync::{Mutex, oneshot};

/// A single pending question, if any.
struct Pending {
    respond_to: oneshot::Sender<Option<String>>,
}

/// Single-slot rendezvous between the action task (which asks) and the
/// voice loop (which routes the next transcript back as the answer).
#[derive(Default)]
pub struct ClarificationBridge {
    pending: Mutex<Option<Pending>>,
}

impl ClarificationBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// The action task announces it is about to ask a question, then
    /// calls [`Self::wait_for_answer`]. Returns the receiving half of
    /// the rendezvous.
    pub async fn mark_pending(&self) -> oneshot::Receiver<Option<String>> {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.pending.lock().await;
        *slot = Some(Pending { respond_to: tx });
        rx
    }

    /// Suspend until [`Self::provide_answer`] or [`Self::cancel`] wakes
    /// this task. `None` means the bridge was cancelled with no answer.
    pub async fn wait_for_answer(&self, rx: oneshot::Receiver<Option<String>>) -> Option<String> {
        rx.await.unwrap_or(None)
    }

    /// Whether a question is currently awaiting an answer.
    pub async fn is_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    /// Route the next transcript to the waiting task as its answer. A
    /// no-op (returns `false`) if nothing is pending.
    pub async fn provide_answer(&self, text: impl Into<String>) -> bool {
        let mut slot = self.pending.lock().await;
        match slot.take() {
            Some(pending) => {
                let _ = pending.respond_to.send(Some(text.into()));
                true
            }
            None => false,
        }
    }

    /// Wake the waiting task with no answer, so no continuation leaks
    /// across a cancellation (§5).
    pub async fn cancel(&self) {
        let mut slot = self.pending.lock().await;
        if let Some(pending) = slot.take() {
            let _ = pending.respond_to.send(None);
        }
    }
}
