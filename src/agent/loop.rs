//! Agent loop implementation
//!
//! Drives one user turn through repeated rounds of completion and capability
//! execution until the reasoning service returns a terminal text reply.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::capabilities::{CapabilityOutput, CapabilityRegistry, InvocationContext};
use crate::completion::{CapabilitySchema, CompletionClient, CompletionReply};
use crate::config::Config;
use crate::error::{Result, SottoError};
use crate::memory::MemoryManager;
use crate::session::{CapabilityCall, Channel, Message};

use super::context::ContextBuilder;

/// The capability-invocation loop.
///
/// Every message the loop produces or consumes goes through the memory
/// manager before the next round starts, so a crash mid-loop loses at most
/// the in-flight append.
pub struct AgentLoop {
    model_settings: crate::config::AgentConfig,
    retry_backoff: Duration,
    memory: Arc<MemoryManager>,
    client: Arc<dyn CompletionClient>,
    registry: Arc<CapabilityRegistry>,
    context_builder: ContextBuilder,
}

impl AgentLoop {
    /// Create a new loop over an open memory manager, a completion client,
    /// and a populated capability registry.
    pub fn new(
        config: &Config,
        memory: Arc<MemoryManager>,
        client: Arc<dyn CompletionClient>,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        Self {
            model_settings: config.agent.clone(),
            retry_backoff: Duration::from_millis(config.completion.retry_backoff_ms),
            memory,
            client,
            registry,
            context_builder: ContextBuilder::new(),
        }
    }

    /// Replace the default context builder.
    pub fn with_context_builder(mut self, context_builder: ContextBuilder) -> Self {
        self.context_builder = context_builder;
        self
    }

    /// Process one user utterance to its terminal reply.
    ///
    /// # Errors
    /// - `Persistence` if any message cannot be recorded durably
    /// - `LoopTimeout` if the turn exceeds its wall-clock budget
    /// - `RoundLimitExceeded` if the service keeps requesting invocations
    /// - `Unrecoverable` if a capability reports a fault the runtime cannot
    ///   continue from
    pub async fn handle_turn(&self, utterance: &str, channel: Channel) -> Result<String> {
        let started = Instant::now();
        let budget = Duration::from_secs(self.model_settings.loop_timeout_secs);
        let deadline = started + budget;

        self.memory
            .append_message(Message::user(utterance, channel))
            .await?;

        for round in 1..=self.model_settings.max_rounds {
            if Instant::now() >= deadline {
                return Err(SottoError::LoopTimeout(
                    self.model_settings.loop_timeout_secs,
                ));
            }

            let transcript = self.memory.transcript().await?;
            let fact_context = self.memory.fact_context().await;
            let messages = self
                .context_builder
                .build_messages(transcript, fact_context.as_deref());
            let schemas = self.registry.schemas();

            debug!(round, messages = messages.len(), "Requesting completion");
            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = match tokio::time::timeout(
                remaining,
                self.complete_with_retry(messages, schemas),
            )
            .await
            {
                Err(_) => {
                    return Err(SottoError::LoopTimeout(
                        self.model_settings.loop_timeout_secs,
                    ))
                }
                Ok(Ok(reply)) => reply,
                Ok(Err(e @ SottoError::Completion(_))) => {
                    // Already retried once; the failure becomes the terminal
                    // reply so the user hears something.
                    let text = format!("I couldn't reach the completion service. {}", e);
                    self.memory
                        .append_message(Message::assistant(&text, channel))
                        .await?;
                    return Ok(text);
                }
                Ok(Err(e)) => return Err(e),
            };

            if !reply.has_invocations() {
                let text = if reply.text.trim().is_empty() {
                    "(no reply)".to_string()
                } else {
                    reply.text.clone()
                };
                self.memory
                    .append_message(Message::assistant(&text, channel))
                    .await?;
                info!(
                    rounds = round,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Turn complete"
                );
                return Ok(text);
            }

            self.run_invocations(&reply, channel, deadline).await?;
        }

        Err(SottoError::RoundLimitExceeded(self.model_settings.max_rounds))
    }

    /// Record the requesting assistant message, then execute each invocation
    /// under the per-invocation timeout and record its result.
    async fn run_invocations(
        &self,
        reply: &CompletionReply,
        channel: Channel,
        deadline: Instant,
    ) -> Result<()> {
        let calls: Vec<CapabilityCall> = reply
            .invocations
            .iter()
            .map(|inv| CapabilityCall::new(&inv.id, &inv.name, inv.arguments.clone()))
            .collect();
        self.memory
            .append_message(Message::assistant_with_calls(&reply.text, calls, channel))
            .await?;

        let ctx = InvocationContext::new().with_channel(channel);
        let invocation_budget = Duration::from_secs(self.model_settings.capability_timeout_secs);

        for invocation in &reply.invocations {
            if Instant::now() >= deadline {
                return Err(SottoError::LoopTimeout(
                    self.model_settings.loop_timeout_secs,
                ));
            }

            info!(capability = %invocation.name, id = %invocation.id, "Executing capability");
            let result = match tokio::time::timeout(
                invocation_budget,
                self.registry
                    .invoke(&invocation.name, invocation.arguments.clone(), &ctx),
            )
            .await
            {
                Err(_) => CapabilityOutput::error(format!(
                    "Capability '{}' timed out after {}s",
                    invocation.name, self.model_settings.capability_timeout_secs
                )),
                Ok(Ok(output)) => output,
                Ok(Err(e)) if e.is_unrecoverable() => return Err(e),
                // Execution failure is captured as a result message and fed
                // back so the service can adapt.
                Ok(Err(e)) => CapabilityOutput::error(format!("Error: {}", e)),
            };

            if result.is_error {
                warn!(capability = %invocation.name, "Capability reported failure");
            }
            self.memory
                .append_message(Message::capability_result(
                    &invocation.id,
                    &result.content,
                    channel,
                ))
                .await?;
        }
        Ok(())
    }

    /// One completion request, retried once with backoff on service failure.
    async fn complete_with_retry(
        &self,
        messages: Vec<Message>,
        schemas: Vec<CapabilitySchema>,
    ) -> Result<CompletionReply> {
        match self.client.send(messages.clone(), schemas.clone()).await {
            Ok(reply) => Ok(reply),
            Err(e @ SottoError::Completion(_)) | Err(e @ SottoError::Http(_)) => {
                warn!(error = %e, "Completion request failed, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                self.client
                    .send(messages, schemas)
                    .await
                    .map_err(|e2| SottoError::Completion(e2.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// The memory manager this loop appends through.
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::EchoCapability;
    use crate::completion::Invocation;
    use crate::config::MemoryConfig;
    use crate::session::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    /// Completion client that plays back a scripted reply sequence.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<CompletionReply>>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<CompletionReply>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn send(
            &self,
            _transcript: Vec<Message>,
            _capabilities: Vec<CapabilitySchema>,
        ) -> Result<CompletionReply> {
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionReply::text("(script exhausted)")))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    async fn make_loop(
        dir: &TempDir,
        replies: Vec<Result<CompletionReply>>,
        config: Config,
    ) -> (AgentLoop, Arc<MemoryManager>) {
        let memory = Arc::new(MemoryManager::open(dir.path(), &MemoryConfig::default()).unwrap());
        memory.start_session().await.unwrap();

        let mut registry = CapabilityRegistry::new();
        registry.register(Box::new(EchoCapability));

        let agent = AgentLoop::new(
            &config,
            memory.clone(),
            Arc::new(ScriptedClient::new(replies)),
            Arc::new(registry),
        );
        (agent, memory)
    }

    fn echo_invocation(id: &str) -> Invocation {
        Invocation::new(id, "echo", serde_json::json!({"message": "hi"}))
    }

    #[tokio::test]
    async fn test_text_only_turn() {
        let dir = TempDir::new().unwrap();
        let (agent, memory) =
            make_loop(&dir, vec![Ok(CompletionReply::text("four"))], Config::default()).await;

        let reply = agent.handle_turn("what's two plus two", Channel::Voice).await.unwrap();
        assert_eq!(reply, "four");

        let transcript = memory.transcript().await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].channel, Channel::Voice);
    }

    #[tokio::test]
    async fn test_invocation_round_then_text() {
        let dir = TempDir::new().unwrap();
        let (agent, memory) = make_loop(
            &dir,
            vec![
                Ok(CompletionReply::with_invocations(
                    "Echoing.",
                    vec![echo_invocation("call_1")],
                )),
                Ok(CompletionReply::text("It said hi")),
            ],
            Config::default(),
        )
        .await;

        let reply = agent.handle_turn("echo hi", Channel::Text).await.unwrap();
        assert_eq!(reply, "It said hi");

        // user + assistant(with calls) + capability result + final assistant
        let transcript = memory.transcript().await.unwrap();
        assert_eq!(transcript.len(), 4);
        assert!(transcript[1].has_capability_calls());
        assert!(transcript[2].is_capability_result());
        assert_eq!(transcript[2].content, "hi");
        assert_eq!(transcript[3].content, "It said hi");
    }

    #[tokio::test]
    async fn test_k_rounds_message_accounting() {
        // Two invocation rounds before the terminal text: k = 3 completions.
        let dir = TempDir::new().unwrap();
        let (agent, memory) = make_loop(
            &dir,
            vec![
                Ok(CompletionReply::with_invocations(
                    "",
                    vec![echo_invocation("call_1")],
                )),
                Ok(CompletionReply::with_invocations(
                    "",
                    vec![echo_invocation("call_2")],
                )),
                Ok(CompletionReply::text("done")),
            ],
            Config::default(),
        )
        .await;

        let reply = agent.handle_turn("go", Channel::Text).await.unwrap();
        assert_eq!(reply, "done");

        // 1 user + 2 * (assistant + result) + 1 final assistant = 6
        let transcript = memory.transcript().await.unwrap();
        assert_eq!(transcript.len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_capability_feeds_back_and_continues() {
        let dir = TempDir::new().unwrap();
        let (agent, memory) = make_loop(
            &dir,
            vec![
                Ok(CompletionReply::with_invocations(
                    "",
                    vec![Invocation::new("call_1", "teleport", serde_json::json!({}))],
                )),
                Ok(CompletionReply::text("I can't do that")),
            ],
            Config::default(),
        )
        .await;

        let reply = agent.handle_turn("beam me up", Channel::Text).await.unwrap();
        assert_eq!(reply, "I can't do that");

        let transcript = memory.transcript().await.unwrap();
        let result = transcript.iter().find(|m| m.is_capability_result()).unwrap();
        assert!(result.content.contains("Unknown capability: teleport"));
    }

    #[tokio::test]
    async fn test_round_limit_exceeded() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.agent.max_rounds = 3;
        let replies = (0..4)
            .map(|i| {
                Ok(CompletionReply::with_invocations(
                    "",
                    vec![echo_invocation(&format!("call_{}", i))],
                ))
            })
            .collect();
        let (agent, _memory) = make_loop(&dir, replies, config).await;

        let err = agent.handle_turn("loop forever", Channel::Text).await.unwrap_err();
        assert!(matches!(err, SottoError::RoundLimitExceeded(3)));
    }

    #[tokio::test]
    async fn test_loop_timeout() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.agent.loop_timeout_secs = 0;
        let (agent, _memory) =
            make_loop(&dir, vec![Ok(CompletionReply::text("late"))], config).await;

        let err = agent.handle_turn("anything", Channel::Text).await.unwrap_err();
        assert!(matches!(err, SottoError::LoopTimeout(0)));
    }

    #[tokio::test]
    async fn test_completion_retry_then_success() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.completion.retry_backoff_ms = 1;
        let (agent, _memory) = make_loop(
            &dir,
            vec![
                Err(SottoError::Completion("HTTP 503".into())),
                Ok(CompletionReply::text("recovered")),
            ],
            config,
        )
        .await;

        let reply = agent.handle_turn("hello", Channel::Text).await.unwrap();
        assert_eq!(reply, "recovered");
    }

    #[tokio::test]
    async fn test_completion_failure_surfaces_as_terminal_text() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.completion.retry_backoff_ms = 1;
        let (agent, memory) = make_loop(
            &dir,
            vec![
                Err(SottoError::Completion("HTTP 503".into())),
                Err(SottoError::Completion("HTTP 503".into())),
            ],
            config,
        )
        .await;

        let reply = agent.handle_turn("hello", Channel::Text).await.unwrap();
        assert!(reply.contains("completion service"));

        // The failure reply is still recorded durably.
        let transcript = memory.transcript().await.unwrap();
        assert_eq!(transcript.last().unwrap().role, Role::Assistant);
        assert!(transcript.last().unwrap().content.contains("completion service"));
    }

    #[tokio::test]
    async fn test_unrecoverable_capability_fault_terminates() {
        use crate::capabilities::{Capability, CapabilityOutput as Output, InvocationContext as Ctx};

        struct FaultyCapability;

        #[async_trait]
        impl Capability for FaultyCapability {
            fn name(&self) -> &str {
                "faulty"
            }
            fn description(&self) -> &str {
                "Always faults"
            }
            fn input_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object", "properties": {}})
            }
            async fn invoke(&self, _args: serde_json::Value, _ctx: &Ctx) -> Result<Output> {
                Err(SottoError::Unrecoverable("device lost".into()))
            }
        }

        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryManager::open(dir.path(), &MemoryConfig::default()).unwrap());
        memory.start_session().await.unwrap();
        let mut registry = CapabilityRegistry::new();
        registry.register(Box::new(FaultyCapability));

        let agent = AgentLoop::new(
            &Config::default(),
            memory,
            Arc::new(ScriptedClient::new(vec![Ok(
                CompletionReply::with_invocations(
                    "",
                    vec![Invocation::new("call_1", "faulty", serde_json::json!({}))],
                ),
            )])),
            Arc::new(registry),
        );

        let err = agent.handle_turn("go", Channel::Text).await.unwrap_err();
        assert!(err.is_unrecoverable());
    }

    #[tokio::test]
    async fn test_empty_text_reply_normalized() {
        let dir = TempDir::new().unwrap();
        let (agent, _memory) =
            make_loop(&dir, vec![Ok(CompletionReply::text("  "))], Config::default()).await;
        let reply = agent.handle_turn("hm", Channel::Text).await.unwrap();
        assert_eq!(reply, "(no reply)");
    }
}
