//! Configuration management for Sotto
//!
//! Configuration is loaded from `~/.sotto/config.json` with environment
//! variable overrides following the pattern `SOTTO_SECTION_KEY`.

mod types;

pub use types::*;

use std::path::PathBuf;

use crate::error::Result;

impl Config {
    /// Returns the Sotto data/configuration directory path (~/.sotto)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sotto")
    }

    /// Returns the path to the config file (~/.sotto/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Resolved data directory: the configured override, or `Config::dir()`.
    pub fn data_dir(&self) -> PathBuf {
        self.memory
            .data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(Config::dir)
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: SOTTO_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SOTTO_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Ok(val) = std::env::var("SOTTO_AGENT_MAX_ROUNDS") {
            if let Ok(v) = val.parse() {
                self.agent.max_rounds = v;
            }
        }
        if let Ok(val) = std::env::var("SOTTO_AGENT_LOOP_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.agent.loop_timeout_secs = v;
            }
        }

        if let Ok(val) = std::env::var("SOTTO_COMPLETION_API_KEY") {
            self.completion.api_key = Some(val);
        }
        // The conventional provider variable works too.
        if self.completion.api_key.is_none() {
            if let Ok(val) = std::env::var("ANTHROPIC_API_KEY") {
                if !val.is_empty() {
                    self.completion.api_key = Some(val);
                }
            }
        }
        if let Ok(val) = std::env::var("SOTTO_COMPLETION_API_BASE") {
            self.completion.api_base = Some(val);
        }

        if let Ok(val) = std::env::var("SOTTO_VOICE_WAKE_PHRASE") {
            self.voice.wake_phrase = val;
        }
        if let Ok(val) = std::env::var("SOTTO_MEMORY_DATA_DIR") {
            self.memory.data_dir = Some(val);
        }
    }
}
