//! Serialized FIFO TTS queue with mute, interrupt, stale-skip, and preempt
//! semantics (§4.1).
//!
//! A dedicated worker task owns playback so [`NarrationQueue::enqueue`] never
//! blocks the caller. Interrupting the in-progress utterance races a `watch`
//! signal against the backend's `speak` future — whichever resolves first
//! wins, mirroring the oneshot-rendezvous-with-timeout pattern used for tool
//! approval.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, oneshot, watch};

/// Debounce window between `interrupt()` and the deferred enqueue in
/// `interrupt_and_enqueue()`, letting the audio graph quiesce.
pub const INTERRUPT_DEBOUNCE: Duration = Duration::from_millis(50);

/// A pluggable speech backend. `speak` resolves when playback of `text`
/// completes naturally; the queue cancels it by racing a watch signal.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn speak(&self, text: &str);
}

struct Entry {
    text: String,
    waiter: Option<oneshot::Sender<()>>,
}

struct Inner {
    backend: Arc<dyn TtsBackend>,
    queue: Mutex<VecDeque<Entry>>,
    speaking: AtomicBool,
    muted: AtomicBool,
    debounce_active: AtomicBool,
    generation: AtomicU64,
    wake: Notify,
    interrupt: watch::Sender<u64>,
}

/// Serialized FIFO narration queue.
#[derive(Clone)]
pub struct NarrationQueue {
    inner: Arc<Inner>,
}

impl NarrationQueue {
    pub fn new(backend: Arc<dyn TtsBackend>) -> Self {
        let (interrupt_tx, interrupt_rx) = watch::channel(0u64);
        let inner = Arc::new(Inner {
            backend,
            queue: Mutex::new(VecDeque::new()),
            speaking: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            debounce_active: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            wake: Notify::new(),
            interrupt: interrupt_tx,
        });
        tokio::spawn(worker(Arc::clone(&inner), interrupt_rx));
        Self { inner }
    }

    /// Non-blocking. Dropped silently while muted.
    pub async fn enqueue(&self, text: impl Into<String>) {
        if self.inner.muted.load(Ordering::SeqCst) {
            return;
        }
        self.inner.queue.lock().await.push_back(Entry { text: text.into(), waiter: None });
        self.inner.wake.notify_one();
    }

    /// Enqueue and block until exactly that utterance finishes.
    pub async fn enqueue_and_wait(&self, text: impl Into<String>) {
        if self.inner.muted.load(Ordering::SeqCst) {
            return;
        }
        let (tx, rx) = oneshot::channel();
        self.inner.queue.lock().await.push_back(Entry { text: text.into(), waiter: Some(tx) });
        self.inner.wake.notify_one();
        let _ = rx.await;
    }

    /// Stop the current utterance immediately and clear the queue. Returns
    /// whether anything was playing or queued.
    pub async fn interrupt(&self) -> bool {
        let was_active = self.is_active();
        self.inner.queue.lock().await.clear();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let _ = self.inner.interrupt.send(generation);
        self.inner.speaking.store(false, Ordering::SeqCst);
        was_active
    }

    /// Interrupt, then schedule `text` after the debounce window. The queue
    /// reports `is_active() == true` throughout the debounce window.
    pub fn interrupt_and_enqueue(&self, text: impl Into<String> + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        let queue = self.clone();
        inner.debounce_active.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            queue.interrupt().await;
            tokio::time::sleep(INTERRUPT_DEBOUNCE).await;
            inner.debounce_active.store(false, Ordering::SeqCst);
            queue.enqueue(text).await;
        });
    }

    /// Stop current, clear queue, and reject further enqueues until `unmute()`.
    pub async fn mute(&self) {
        self.inner.muted.store(true, Ordering::SeqCst);
        self.interrupt().await;
    }

    pub fn unmute(&self) {
        self.inner.muted.store(false, Ordering::SeqCst);
    }

    /// Drop queued entries but let the in-progress utterance finish.
    pub async fn skip_stale(&self) {
        self.inner.queue.lock().await.clear();
    }

    /// True iff currently speaking, the queue is non-empty, or inside the
    /// `interrupt_and_enqueue` debounce window.
    pub fn is_active(&self) -> bool {
        self.inner.speaking.load(Ordering::SeqCst)
            || self.inner.debounce_active.load(Ordering::SeqCst)
            || !self.inner.queue.try_lock().map(|q| q.is_empty()).unwrap_or(false)
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }
}

async fn worker(inner: Arc<Inner>, mut interrupt_rx: watch::Receiver<u64>) {
    loop {
        inner.wake.notified().await;
        loop {
            if inner.muted.load(Ordering::SeqCst) {
                break;
            }
            let entry = inner.queue.lock().await.pop_front();
            let Some(entry) = entry else { break };

            inner.speaking.store(true, Ordering::SeqCst);
            let gen_before = inner.generation.load(Ordering::SeqCst);

            let speak_span = crate::narration_speak_span!();
            let _speak_enter = speak_span.enter();
            tokio::select! {
                _ = inner.backend.speak(&entry.text) => {}
                _ = interrupt_rx.changed() => {}
            }

            let interrupted = inner.generation.load(Ordering::SeqCst) != gen_before;
            if !interrupted {
                inner.speaking.store(false, Ordering::SeqCst);
                if let Some(tx) = entry.waiter {
                    let _ = tx.send(());
                }
            }
        }
    }
}
