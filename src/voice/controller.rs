//! Voice interaction controller.
//!
//! Owns the wake-detection task and the (at most one) transcription task,
//! fixes the input channel for each turn, and routes the terminal reply to
//! the speech sink or a silent completion.
//!
//! Turn arbitration: the transcription-success path and the typed-input path
//! contend on a single gate mutex. Whichever locks it first wins the turn;
//! the loser sees either a cancelled token or a claimed turn and discards
//! its input. Once a token has been cancelled, the transcription task never
//! touches the gate again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::AgentLoop;
use crate::config::VoiceConfig;
use crate::error::{Result, SottoError};
use crate::session::{Channel, Message};

use super::output::OutputAdapter;
use super::providers::{SpeechSink, Transcriber, TranscriptionOutcome, WakeWordSource};
use super::VoiceState;

/// Shared turn state. `busy` marks a claimed turn; `transcription_cancel`
/// holds the cancel token while a transcription is the turn's only activity.
struct TurnGate {
    busy: bool,
    transcription_cancel: Option<CancellationToken>,
}

/// Orchestrates wake detection, transcription, the agent loop, and reply
/// routing. One instance per process.
pub struct VoiceController {
    agent: Arc<AgentLoop>,
    wake_source: Arc<dyn WakeWordSource>,
    transcriber: Arc<dyn Transcriber>,
    speech: Arc<dyn SpeechSink>,
    adapters: Vec<Arc<dyn OutputAdapter>>,
    config: VoiceConfig,
    state_tx: watch::Sender<VoiceState>,
    gate: Mutex<TurnGate>,
    wake_task: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceController {
    pub fn new(
        agent: Arc<AgentLoop>,
        wake_source: Arc<dyn WakeWordSource>,
        transcriber: Arc<dyn Transcriber>,
        speech: Arc<dyn SpeechSink>,
        adapters: Vec<Arc<dyn OutputAdapter>>,
        config: VoiceConfig,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(VoiceState::Idle);
        Arc::new(Self {
            agent,
            wake_source,
            transcriber,
            speech,
            adapters,
            config,
            state_tx,
            gate: Mutex::new(TurnGate {
                busy: false,
                transcription_cancel: None,
            }),
            wake_task: Mutex::new(None),
        })
    }

    /// Current controller state.
    pub fn state(&self) -> VoiceState {
        *self.state_tx.borrow()
    }

    /// Watch channel for output surfaces that poll rather than implement
    /// `OutputAdapter`.
    pub fn subscribe_state(&self) -> watch::Receiver<VoiceState> {
        self.state_tx.subscribe()
    }

    /// Whether a turn is currently in flight.
    pub async fn is_processing(&self) -> bool {
        self.gate.lock().await.busy
    }

    /// Start the wake-detection task: fragments from the wake source are
    /// matched (case-insensitive substring) against the configured phrase.
    pub async fn start_listening(self: &Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<String>(16);
        self.wake_source.start(tx).await?;

        let controller = Arc::clone(self);
        let wake_phrase = self.config.wake_phrase.to_lowercase();
        let handle = tokio::spawn(async move {
            while let Some(fragment) = rx.recv().await {
                if fragment.to_lowercase().contains(&wake_phrase) {
                    debug!(fragment = %fragment, "Wake phrase matched");
                    controller.handle_wake().await;
                }
            }
            debug!("Wake fragment stream closed");
        });
        *self.wake_task.lock().await = Some(handle);
        self.set_state(VoiceState::Idle, "Listening for wake phrase");
        info!(wake_phrase = %self.config.wake_phrase, "Wake detection started");
        Ok(())
    }

    /// Wake event: claim the turn and start the transcription task.
    ///
    /// Ignored while a turn is in flight or the controller is faulted.
    pub async fn handle_wake(self: &Arc<Self>) {
        if self.state() == VoiceState::Error {
            debug!("Controller faulted, ignoring wake event");
            return;
        }
        let cancel = CancellationToken::new();
        {
            let mut gate = self.gate.lock().await;
            if gate.busy {
                debug!("Already processing, ignoring wake event");
                return;
            }
            gate.busy = true;
            gate.transcription_cancel = Some(cancel.clone());
        }
        self.set_state(VoiceState::Listening, "Listening...");

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.run_transcription(cancel).await;
        });
    }

    /// Typed input. Cancels any in-flight transcription and takes over the
    /// turn; ignored if a turn is already past the transcription stage.
    pub async fn submit_text(self: &Arc<Self>, text: &str) {
        if text.trim().is_empty() {
            warn!("Empty typed input ignored");
            return;
        }
        if self.state() == VoiceState::Error {
            debug!("Controller faulted, ignoring typed input");
            return;
        }
        {
            let mut gate = self.gate.lock().await;
            if gate.busy {
                match gate.transcription_cancel.take() {
                    Some(token) => {
                        // Typed input arrived first: the transcription's
                        // eventual result is discarded.
                        info!("Typed input cancels in-flight transcription");
                        token.cancel();
                    }
                    None => {
                        info!("A turn is already in progress, ignoring typed input");
                        return;
                    }
                }
            } else {
                gate.busy = true;
            }
        }
        self.process_input(text, Channel::Text).await;
    }

    /// The transcription side of the turn race.
    async fn run_transcription(self: Arc<Self>, cancel: CancellationToken) {
        let timeout = Duration::from_secs(self.config.transcription_timeout_secs);
        let silence = Duration::from_secs(self.config.silence_timeout_secs);
        let outcome = self
            .transcriber
            .transcribe(timeout, silence, cancel.clone())
            .await;

        match outcome {
            Ok(TranscriptionOutcome::Text(text)) if !text.trim().is_empty() => {
                {
                    let mut gate = self.gate.lock().await;
                    if cancel.is_cancelled() {
                        debug!("Transcript arrived after cancellation, discarding");
                        return;
                    }
                    // Turn confirmed for the voice path; no longer cancellable.
                    gate.transcription_cancel = None;
                }
                self.process_input(&text, Channel::Voice).await;
            }
            Ok(TranscriptionOutcome::Text(_)) | Ok(TranscriptionOutcome::TimedOut) => {
                let mut gate = self.gate.lock().await;
                if cancel.is_cancelled() {
                    return;
                }
                gate.transcription_cancel = None;
                gate.busy = false;
                drop(gate);
                self.set_state(VoiceState::Idle, "No speech detected");
            }
            Ok(TranscriptionOutcome::Cancelled) => {
                // The canceller owns the turn (or released it at shutdown).
                debug!("Transcription cancelled");
            }
            Err(e) => {
                let mut gate = self.gate.lock().await;
                if cancel.is_cancelled() {
                    return;
                }
                gate.transcription_cancel = None;
                gate.busy = false;
                drop(gate);
                self.report_fault(&e);
            }
        }
    }

    /// Run one turn through the agent loop and route the reply by channel.
    async fn process_input(&self, text: &str, channel: Channel) {
        let user_preview = Message::user(text, channel);
        for adapter in &self.adapters {
            adapter.report_message(&user_preview);
        }

        self.set_state(VoiceState::Thinking, "Processing...");
        let result = self.agent.handle_turn(text, channel).await;

        match result {
            Ok(reply) => {
                let reply_msg = Message::assistant(&reply, channel);
                for adapter in &self.adapters {
                    adapter.report_message(&reply_msg);
                }

                match channel {
                    Channel::Voice => {
                        self.set_state(VoiceState::Speaking, "Speaking...");
                        let spoken = self.speech.speak(&reply).await;
                        self.release_turn().await;
                        match spoken {
                            Ok(()) => {
                                self.set_state(VoiceState::Idle, "Listening for wake phrase")
                            }
                            Err(e) => self.report_fault(&e),
                        }
                    }
                    Channel::Text => {
                        self.set_state(VoiceState::Typing, "Replied silently");
                        self.release_turn().await;
                        self.set_state(VoiceState::Idle, "Listening for wake phrase");
                    }
                }
            }
            Err(e) => {
                self.release_turn().await;
                self.report_fault(&e);
            }
        }
    }

    async fn release_turn(&self) {
        let mut gate = self.gate.lock().await;
        gate.busy = false;
        gate.transcription_cancel = None;
    }

    /// Recoverable faults report and auto-return to idle; unrecoverable
    /// faults park the controller in the error state.
    fn report_fault(&self, e: &SottoError) {
        if e.is_unrecoverable() {
            error!(error = %e, "Unrecoverable fault, controller halted");
            self.set_state(VoiceState::Error, &e.to_string());
        } else {
            warn!(error = %e, "Recoverable fault");
            self.set_state(VoiceState::Error, &e.to_string());
            self.set_state(VoiceState::Idle, "Recovered");
        }
    }

    /// Stop wake detection, cancel any in-flight transcription, and wait a
    /// bounded grace for the current turn to finish.
    pub async fn shutdown(&self, grace: Duration) {
        info!("Voice controller shutting down");
        self.wake_source.stop().await;
        if let Some(handle) = self.wake_task.lock().await.take() {
            handle.abort();
        }

        {
            let mut gate = self.gate.lock().await;
            if let Some(token) = gate.transcription_cancel.take() {
                // Turn was only a transcription; release it outright.
                token.cancel();
                gate.busy = false;
            }
        }

        let deadline = Instant::now() + grace;
        loop {
            if !self.gate.lock().await.busy {
                break;
            }
            if Instant::now() >= deadline {
                warn!("Turn still in flight at the shutdown deadline");
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.set_state(VoiceState::Idle, "Stopped");
    }

    fn set_state(&self, state: VoiceState, detail: &str) {
        debug!(state = %state, detail, "State change");
        self.state_tx.send_replace(state);
        for adapter in &self.adapters {
            adapter.report_state(state, detail);
        }
    }
}
