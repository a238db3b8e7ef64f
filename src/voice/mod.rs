//! Voice module - the voice-interaction state machine.
//!
//! The controller arbitrates between the continuously-running wake detector
//! and a cancellable transcription task, fixes the input channel at the
//! moment an utterance is accepted, and routes the terminal reply to either
//! the speech sink or a silent completion.

mod controller;
mod output;
mod providers;

pub use controller::VoiceController;
pub use output::{ConsoleAdapter, OutputAdapter};
pub use providers::{
    CommandSpeechSink, NullTranscriber, NullWakeWordSource, SpeechSink, Transcriber,
    TranscriptionOutcome, WakeWordSource,
};

use serde::{Deserialize, Serialize};

/// The single interaction state of the controller.
///
/// Exactly one value exists at a time; transitions are serialized and only
/// the controller writes it. Output adapters observe transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceState {
    /// Waiting for the wake phrase or typed input
    Idle,
    /// Wake phrase heard, transcription in flight
    Listening,
    /// Turn handed to the agent loop
    Thinking,
    /// Voice turn: reply being spoken
    Speaking,
    /// Text turn: reply delivered silently
    Typing,
    /// Unrecoverable fault, pending external restart
    Error,
}

impl std::fmt::Display for VoiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceState::Idle => write!(f, "idle"),
            VoiceState::Listening => write!(f, "listening"),
            VoiceState::Thinking => write!(f, "thinking"),
            VoiceState::Speaking => write!(f, "speaking"),
            VoiceState::Typing => write!(f, "typing"),
            VoiceState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(VoiceState::Idle.to_string(), "idle");
        assert_eq!(VoiceState::Listening.to_string(), "listening");
        assert_eq!(VoiceState::Error.to_string(), "error");
    }

    #[test]
    fn test_state_serialize() {
        assert_eq!(
            serde_json::to_string(&VoiceState::Speaking).unwrap(),
            r#""speaking""#
        );
        let parsed: VoiceState = serde_json::from_str(r#""typing""#).unwrap();
        assert_eq!(parsed, VoiceState::Typing);
    }
}
