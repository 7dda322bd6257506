//! CLI entry point: `--voice` selects voice mode, no flag starts the text
//! REPL (§6). Wires the orchestration core to the minimal demo backends
//! this crate ships so a clean checkout is runnable end to end; a real
//! deployment swaps these for concrete mouse/keyboard, screen-capture, and
//! speech backends.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use voxpilot::action::{ActionSink, ComputerAction, Point, ScreenDimensions};
use voxpilot::config::{self, VoxConfig};
use voxpilot::error::Result;
use voxpilot::inference::client::InferenceClient;
use voxpilot::narration::{NarrationQueue, TtsBackend};
use voxpilot::observability::{SessionLog, redact_all};
use voxpilot::perf::PerfTracker;
use voxpilot::pipeline::executor::OverlaySink;
use voxpilot::screen::{ScreenSource, Screenshot};
use voxpilot::session::context::SessionContext;
use voxpilot::session::memory::MemoryStore;
use voxpilot::speculative::SpeculativeDispatcher;
use voxpilot::stt::SttProvider;
use voxpilot::voice::{
    ClarificationBridge, SpeculativePayload, TranscriptOutcome, VoiceLoopDeps, listen_and_handle,
};

const REPLAN_BUDGET_MAX: usize = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv(Path::new(".env"));
    let config = VoxConfig::from_env();

    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let file_appender = tracing_appender::rolling::daily("./logs", "voxpilot.tracing.log");
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter()),
        )
        .init();

    let mut session_log = match SessionLog::open(Path::new("./logs"), chrono::Local::now()) {
        Ok(log) => log,
        Err(e) => {
            error!(error = %e, "could not open session log");
            std::process::exit(1);
        }
    };
    let _ = session_log.write_line("voxpilot starting");

    let voice_mode = std::env::args().skip(1).any(|arg| arg == "--voice");

    if let Err(e) = run(config, voice_mode, session_log).await {
        error!(error = %redact_all(&e.to_string()), "voxpilot exited with error");
        std::process::exit(1);
    }

    info!("voxpilot shut down cleanly");
    Ok(())
}

async fn run(config: VoxConfig, voice_mode: bool, session_log: SessionLog) -> Result<()> {
    let inference = InferenceClient::new(config.inference_api_key.clone(), "claude-sonnet-4-5");
    let narration = NarrationQueue::new(Arc::new(StdoutTts));
    let clarification = ClarificationBridge::new();
    let speculative: SpeculativeDispatcher<SpeculativePayload> = SpeculativeDispatcher::new();
    let action_sink = LoggingActionSink;
    let screen = DemoScreenSource;
    let overlay = LoggingOverlay;
    let window_maximized = AtomicBool::new(false);
    let session_context = Mutex::new(SessionContext::new());
    let memory = Mutex::new(MemoryStore::load()?);
    let cancel = CancellationToken::new();
    let perf = PerfTracker::new();
    let session_log = Mutex::new(session_log);

    if voice_mode {
        println!("Voice mode requested, but no microphone backend is wired into this checkout.");
        println!("Falling back to the text REPL. Type a command and press Enter.");
    } else {
        println!("voxpilot text REPL. Type a command and press Enter; \"quit\" to exit.");
    }
    let stt = StdinStt::new();
    stt.setup().await?;

    loop {
        print!("> ");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        // A fresh token per turn: cancelling a finished turn must not poison the next one.
        cancel.cancel();
        let cancel = CancellationToken::new();

        let deps = VoiceLoopDeps {
            inference: &inference,
            narration: &narration,
            action_sink: &action_sink,
            screen: &screen,
            overlay: &overlay,
            clarification: &clarification,
            speculative: &speculative,
            window_maximized: &window_maximized,
            session_context: &session_context,
            memory: &memory,
            max_model_width: config.max_model_width,
            cancel: &cancel,
            perf: &perf,
            session_log: &session_log,
        };

        let outcome = listen_and_handle(&stt, &deps, REPLAN_BUDGET_MAX).await;
        if stt.is_eof() {
            break;
        }

        match outcome {
            Ok(TranscriptOutcome::Ignored) => continue,
            Ok(TranscriptOutcome::Special(voxpilot::voice::SpecialToken::Quit)) => {
                narration.enqueue_and_wait("Goodbye.").await;
                break;
            }
            Ok(TranscriptOutcome::Special(voxpilot::voice::SpecialToken::StopCurrentTask)) => {
                cancel.cancel();
                narration.interrupt().await;
                clarification.cancel().await;
                println!("Stopped.");
            }
            Ok(TranscriptOutcome::RoutedToClarification) => continue,
            Ok(TranscriptOutcome::Finished(summary)) => {
                println!("{summary:?}");
            }
            Err(e) => {
                let redacted = redact_all(&e.to_string());
                error!(error = %redacted, "turn failed");
                println!("Error: {redacted}");
            }
        }
    }

    stt.stop_listening().await;
    Ok(())
}

struct StdoutTts;

#[async_trait]
impl TtsBackend for StdoutTts {
    async fn speak(&self, text: &str) {
        println!("[voxpilot] {text}");
    }
}

/// Demo STT backend: reads one line from stdin per `listen()` call instead of
/// a microphone. Simulates a stable partial by firing `on_stable_partial`
/// with the line's content before returning it as the final transcript, so
/// the speculative-dispatch path (§4.5 step 1) is exercised from a real
/// call site even without an actual streaming recognizer.
struct StdinStt {
    lines: Mutex<tokio::io::Lines<BufReader<tokio::io::Stdin>>>,
    eof: std::sync::atomic::AtomicBool,
}

impl StdinStt {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            eof: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn is_eof(&self) -> bool {
        self.eof.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SttProvider for StdinStt {
    async fn setup(&self) -> Result<bool> {
        Ok(true)
    }

    async fn listen(&self, on_stable_partial: &(dyn for<'a> Fn(&'a str) + Send + Sync)) -> Result<Option<String>> {
        let Some(line) = self.lines.lock().await.next_line().await? else {
            self.eof.store(true, std::sync::atomic::Ordering::SeqCst);
            return Ok(None);
        };
        if !line.trim().is_empty() {
            on_stable_partial(&line);
        }
        Ok(Some(line))
    }

    async fn stop_listening(&self) {}

    fn name(&self) -> &str {
        "stdin"
    }
}

struct LoggingActionSink;

#[async_trait]
impl ActionSink for LoggingActionSink {
    async fn dispatch(&self, action: &ComputerAction) -> Result<()> {
        info!(?action, "dispatch (no concrete input backend wired)");
        Ok(())
    }

    async fn maximize_foreground_window(&self) -> Result<()> {
        info!("maximize foreground window (no concrete window backend wired)");
        Ok(())
    }
}

struct DemoScreenSource;

#[async_trait]
impl ScreenSource for DemoScreenSource {
    async fn capture(&self, max_model_width: u32) -> Result<Screenshot> {
        Ok(Screenshot {
            data: String::new(),
            media_type: "image/png".to_string(),
            dimensions: ScreenDimensions {
                logical_w: 1920,
                logical_h: 1080,
                bitmap_w: max_model_width,
                bitmap_h: max_model_width * 1080 / 1920,
            },
        })
    }
}

struct LoggingOverlay;

#[async_trait]
impl OverlaySink for LoggingOverlay {
    async fn show_highlight(&self, at: Point, instruction: &str) {
        info!(x = at.x, y = at.y, instruction, "guide highlight (no concrete overlay backend wired)");
    }
}
