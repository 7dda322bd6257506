//! Configuration for the orchestration core (§6, §4.10).
//!
//! Configuration is resolved once at startup from process environment
//! variables, merged under a `.env` file in the working directory if one
//! exists. `.env` values never override a variable that is already set in
//! the process environment.

use std::collections::HashMap;
use std::path::Path;

/// Default cap on the model-facing bitmap width (§4.7).
pub const DEFAULT_MAX_MODEL_WIDTH: u32 = 1024;

/// Bundled credential used when `INFERENCE_API_KEY` is unset or blank, so a
/// clean checkout can run the text REPL against the demo inference backend
/// with no setup step (§6, §4.10).
pub const DEMO_INFERENCE_API_KEY: &str = "demo-key-voxpilot-unconfigured";

/// Resolved configuration for one process run.
#[derive(Debug, Clone)]
pub struct VoxConfig {
    /// Credentials for the inference backend. If empty, a bundled demo key
    /// is used (the demo key itself is an external concern, not modeled here).
    pub inference_api_key: String,
    /// Enable the speculative dispatcher (§4.2) at startup.
    pub use_speculative: bool,
    /// Prefer the on-device STT backend, falling back to cloud on setup failure.
    pub use_on_device_stt: bool,
    /// `tracing` env-filter override.
    pub log_level: String,
    /// Cap on the model-facing bitmap width (§4.7).
    pub max_model_width: u32,
    /// Opt out of the once-per-session foreground-window maximize (§9 open question).
    pub disable_auto_maximize: bool,
}

impl Default for VoxConfig {
    fn default() -> Self {
        Self {
            inference_api_key: String::new(),
            use_speculative: false,
            use_on_device_stt: false,
            log_level: "info".to_string(),
            max_model_width: DEFAULT_MAX_MODEL_WIDTH,
            disable_auto_maximize: false,
        }
    }
}

impl VoxConfig {
    /// Resolve configuration from the process environment, having already
    /// merged in a `.env` file via [`load_dotenv`].
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.inference_api_key = std::env::var("INFERENCE_API_KEY").unwrap_or_default();
        if config.inference_api_key.trim().is_empty() {
            config.inference_api_key = DEMO_INFERENCE_API_KEY.to_string();
        }
        if env_flag("USE_SPECULATIVE") {
            config.use_speculative = true;
        }
        if env_flag("USE_ON_DEVICE_STT") {
            config.use_on_device_stt = true;
        }
        if let Ok(level) = std::env::var("VOXPILOT_LOG_LEVEL") {
            if !level.trim().is_empty() {
                config.log_level = level;
            }
        }
        if let Some(width) = std::env::var("VOXPILOT_MAX_MODEL_WIDTH")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.max_model_width = width;
        }
        if env_flag("VOXPILOT_DISABLE_AUTO_MAXIMIZE") {
            config.disable_auto_maximize = true;
        }

        config
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

/// Parse a `.env` file (`KEY=VALUE`, `#` comments) and write its values into
/// the process environment, **never** overriding a variable that is already
/// set.
///
/// Missing files are not an error — the process environment alone is a
/// valid configuration source.
pub fn load_dotenv(path: &Path) {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&contents) {
        if std::env::var_os(&key).is_none() {
            // SAFETY: startup-only, single-threaded configuration step.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
}

/// Parse `.env`-file contents into an ordered list of `(key, value)` pairs.
///
/// Lines starting with `#` (after leading whitespace) are comments. Blank
/// lines are ignored. Values are not quote- or escape-aware beyond trimming
/// surrounding whitespace, matching a plain `KEY=VALUE` dotenv format.
pub fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
        if key.is_empty() {
            continue;
        }
        if let Some(&idx) = seen.get(&key) {
            pairs[idx] = (key, value);
        } else {
            seen.insert(key.clone(), pairs.len());
            pairs.push((key, value));
        }
    }

    pairs
}
