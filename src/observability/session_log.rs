//! Rolling per-session log file (§4.9, §6).
//!
//! One file per process run, `./logs/session_<yyyy-MM-dd_HH-mm-ss>.log`, with
//! lines timestamped relative to session start at `[%7.2fs]` resolution. Only
//! the 5 most recent session logs are retained; older ones are deleted when a
//! new session starts.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;

use crate::error::{Result, VoxError};

const RETAIN_COUNT: usize = 5;

/// A single rolling session log file.
pub struct SessionLog {
    file: File,
    started_at: Instant,
}

impl SessionLog {
    /// Open a new session log under `dir` (default `./logs`), pruning all
    /// but the `RETAIN_COUNT` most recent logs already there.
    pub fn open(dir: &Path, started_at: chrono::DateTime<Local>) -> Result<Self> {
        fs::create_dir_all(dir)?;
        prune_old_logs(dir)?;

        let stamp = started_at.format("%Y-%m-%d_%H-%M-%S");
        let path = dir.join(format!("session_{stamp}.log"));
        let file = File::create(&path)?;
        Ok(Self {
            file,
            started_at: Instant::now(),
        })
    }

    /// Append one line, prefixed with the elapsed time since the log opened.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        writeln!(self.file, "[{elapsed:7.2}s] {line}")?;
        Ok(())
    }
}

fn prune_old_logs(dir: &Path) -> Result<()> {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("session_") && name.ends_with(".log"))
        })
        .collect();

    logs.sort();

    if logs.len() + 1 > RETAIN_COUNT {
        let remove_count = logs.len() + 1 - RETAIN_COUNT;
        for path in logs.into_iter().take(remove_count) {
            fs::remove_file(&path).map_err(VoxError::Io)?;
        }
    }

    Ok(())
}
