//! Provider interfaces for the black-box audio engines.
//!
//! The acoustic wake-word engine, the high-precision transcription engine,
//! and speech-synthesis playback all live behind traits. The runtime ships
//! null providers (no audio hardware required) and a command-backed speech
//! sink; real engines plug in without touching the controller.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SottoError};

/// Continuous low-power wake detection.
///
/// Implementations emit short rolling transcript fragments on the provided
/// channel; the controller matches the wake phrase against them. Must be
/// safe to start and stop repeatedly.
#[async_trait]
pub trait WakeWordSource: Send + Sync {
    /// Start emitting transcript fragments.
    async fn start(&self, fragments: mpsc::Sender<String>) -> Result<()>;

    /// Stop emitting and release the audio input.
    async fn stop(&self);
}

/// Outcome of a transcription attempt.
///
/// Timeout and cancellation are ordinary outcomes, not faults: both route
/// the controller back to idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionOutcome {
    /// Speech was captured and transcribed
    Text(String),
    /// The cancellation signal fired mid-capture; any partial transcript is
    /// discarded
    Cancelled,
    /// The silence window or the hard cap elapsed without usable speech
    TimedOut,
}

/// High-precision transcription, started only after a wake event.
///
/// Cancellation is cooperative: implementations check `cancel` at bounded
/// intervals and release the audio resource before returning.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        timeout: Duration,
        silence_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<TranscriptionOutcome>;
}

/// Speech-synthesis playback. `speak` resolves when playback has finished,
/// which drives the `speaking → idle` transition.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;
}

// ============================================================================
// Shipped providers
// ============================================================================

/// Wake source for installs without an acoustic engine: never emits.
pub struct NullWakeWordSource;

#[async_trait]
impl WakeWordSource for NullWakeWordSource {
    async fn start(&self, _fragments: mpsc::Sender<String>) -> Result<()> {
        info!("No wake-word engine configured; voice activation disabled");
        Ok(())
    }

    async fn stop(&self) {}
}

/// Transcriber for installs without a transcription engine: waits out the
/// timeout (or the cancellation signal) and reports no input.
pub struct NullTranscriber;

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn transcribe(
        &self,
        timeout: Duration,
        _silence_timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<TranscriptionOutcome> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(TranscriptionOutcome::Cancelled),
            _ = tokio::time::sleep(timeout) => Ok(TranscriptionOutcome::TimedOut),
        }
    }
}

/// Speech sink backed by an external synthesis command (`say` on macOS,
/// `espeak` elsewhere).
pub struct CommandSpeechSink {
    command: String,
    voice: Option<String>,
}

impl CommandSpeechSink {
    pub fn new(command: &str, voice: Option<String>) -> Self {
        Self {
            command: command.to_string(),
            voice,
        }
    }
}

#[async_trait]
impl SpeechSink for CommandSpeechSink {
    async fn speak(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            warn!("Empty text handed to the speech sink");
            return Ok(());
        }
        debug!(command = %self.command, chars = text.len(), "Speaking reply");

        let mut cmd = tokio::process::Command::new(&self.command);
        if let Some(voice) = &self.voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg(text).stdout(Stdio::null()).stderr(Stdio::null());

        let status = cmd.status().await?;
        if !status.success() {
            return Err(SottoError::Io(std::io::Error::other(format!(
                "speech command '{}' exited with {}",
                self.command, status
            ))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_wake_source_start_stop() {
        let source = NullWakeWordSource;
        let (tx, mut rx) = mpsc::channel(4);
        source.start(tx).await.unwrap();
        source.stop().await;
        // Sender dropped by start(); the stream just ends.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_null_transcriber_times_out() {
        let outcome = NullTranscriber
            .transcribe(
                Duration::from_millis(10),
                Duration::from_millis(5),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TranscriptionOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_null_transcriber_cancels() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = NullTranscriber
            .transcribe(
                Duration::from_secs(30),
                Duration::from_secs(2),
                cancel,
            )
            .await
            .unwrap();
        assert_eq!(outcome, TranscriptionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_command_sink_skips_empty_text() {
        let sink = CommandSpeechSink::new("definitely-not-a-command", None);
        // Empty text never reaches the command.
        assert!(sink.speak("   ").await.is_ok());
    }

    #[tokio::test]
    async fn test_command_sink_missing_command_errors() {
        let sink = CommandSpeechSink::new("definitely-not-a-command-xyz", None);
        let err = sink.speak("hello").await.unwrap_err();
        assert!(!err.is_unrecoverable());
    }
}
