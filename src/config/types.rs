//! Configuration type definitions for Sotto
//!
//! This module defines all configuration structs used throughout the runtime.
//! All types implement serde traits for JSON serialization and have sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration struct for Sotto
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Agent loop configuration (model, rounds, timeouts)
    pub agent: AgentConfig,
    /// Completion service configuration (credentials, request timeout, retry)
    pub completion: CompletionConfig,
    /// Voice interaction configuration (wake phrase, transcription, speech output)
    pub voice: VoiceConfig,
    /// Memory configuration (data directory, distillation cadence)
    pub memory: MemoryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Agent loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum completion rounds per turn
    pub max_rounds: u32,
    /// Maximum wall-clock time (seconds) for a single turn
    pub loop_timeout_secs: u64,
    /// Maximum time (seconds) for a single capability invocation
    pub capability_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_rounds: 10,
            loop_timeout_secs: 300,
            capability_timeout_secs: 60,
        }
    }
}

// ============================================================================
// Completion Service Configuration
// ============================================================================

/// Completion service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// API key for the completion service
    pub api_key: Option<String>,
    /// Base URL override for the completion service
    pub api_base: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Backoff before the single retry of a failed request, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            request_timeout_secs: 300,
            retry_backoff_ms: 500,
        }
    }
}

// ============================================================================
// Voice Configuration
// ============================================================================

/// Voice interaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Wake phrase matched (case-insensitive substring) against the rolling
    /// transcript from the wake-word source
    pub wake_phrase: String,
    /// Hard cap on a single transcription attempt, in seconds
    pub transcription_timeout_secs: u64,
    /// Silence window that ends a transcription attempt, in seconds
    pub silence_timeout_secs: u64,
    /// External speech-synthesis command (e.g. `say` on macOS, `espeak` on Linux)
    pub speech_command: String,
    /// Optional voice name passed to the speech command via `-v`
    pub speech_voice: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            wake_phrase: "sotto".to_string(),
            transcription_timeout_secs: 30,
            silence_timeout_secs: 2,
            speech_command: "say".to_string(),
            speech_voice: None,
        }
    }
}

// ============================================================================
// Memory Configuration
// ============================================================================

/// Memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Data directory override. Defaults to `~/.sotto`.
    pub data_dir: Option<String>,
    /// Schedule a distillation pass every N appended messages
    pub distill_interval: usize,
    /// Bounded depth of the distillation job queue
    pub distill_queue_depth: usize,
    /// How long shutdown waits for an in-flight distillation pass, in seconds
    pub shutdown_grace_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            distill_interval: 5,
            distill_queue_depth: 8,
            shutdown_grace_secs: 5,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// tracing pretty-print (human-readable, coloured)
    Pretty,
    /// Compact text with a `component` field for per-subsystem filtering
    #[default]
    Component,
    /// Structured JSON lines for log aggregators
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Optional log file path (JSON format only); stderr otherwise
    pub file: Option<String>,
    /// Default level filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            file: None,
            level: "info".to_string(),
        }
    }
}
