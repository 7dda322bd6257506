//! De-duplicated long-term fact memory, persisted at `~/.cua/memory.json` (§3, §6).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxError};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct MemoryFile {
    facts: Vec<String>,
}

/// Holds de-duplicated facts in memory and flushes the whole file on every add.
pub struct MemoryStore {
    path: PathBuf,
    facts: Vec<String>,
}

impl MemoryStore {
    /// Load facts from `~/.cua/memory.json`, creating an empty store if the
    /// directory or file doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = default_memory_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let facts = match std::fs::read_to_string(path) {
            Ok(contents) => {
                let parsed: MemoryFile = serde_json::from_str(&contents)
                    .map_err(|e| VoxError::ParseError(format!("memory.json: {e}")))?;
                parsed.facts
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(VoxError::Io(e)),
        };
        Ok(Self { path: path.to_path_buf(), facts })
    }

    /// Add a fact if it is not already present (case-insensitive
    /// de-duplication), then flush to disk.
    ///
    /// Returns `true` if the fact was new.
    pub fn add_fact(&mut self, fact: &str) -> Result<bool> {
        if self.facts.iter().any(|f| f.eq_ignore_ascii_case(fact)) {
            return Ok(false);
        }
        self.facts.push(fact.to_string());
        self.flush()?;
        Ok(true)
    }

    pub fn facts(&self) -> &[String] {
        &self.facts
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = MemoryFile { facts: self.facts.clone() };
        let json = serde_json::to_string_pretty(&body)
            .map_err(|e| VoxError::ParseError(format!("serializing memory.json: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json.as_bytes())?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn default_memory_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| VoxError::ConfigError("could not resolve home directory".into()))?;
    Ok(home.join(".cua").join("memory.json"))
}
