//! Shared CLI helpers used across command handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use sotto::agent::AgentLoop;
use sotto::capabilities::{CapabilityRegistry, EchoCapability, RecallCapability};
use sotto::completion::AnthropicClient;
use sotto::config::Config;
use sotto::memory::MemoryManager;
use sotto::utils::logging::init_logging;

/// The wired-up runtime shared by `run` and `ask`.
pub(crate) struct Runtime {
    pub config: Config,
    pub memory: Arc<MemoryManager>,
    pub agent: Arc<AgentLoop>,
}

/// Load config, initialize logging, open memory (offering recovery), and
/// build the agent loop with the builtin capabilities.
pub(crate) async fn build_runtime(fresh: bool) -> Result<Runtime> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    init_logging(&config.logging);

    let memory = Arc::new(
        MemoryManager::open(config.data_dir(), &config.memory)
            .with_context(|| "Failed to open the memory store")?,
    );

    open_session(&memory, fresh).await?;

    let client = AnthropicClient::from_config(
        &config.completion,
        &config.agent.model,
        config.agent.max_tokens,
        config.agent.temperature,
    )
    .with_context(|| {
        format!(
            "No completion API key configured. Set ANTHROPIC_API_KEY or add it to {:?}",
            Config::path()
        )
    })?;

    let mut registry = CapabilityRegistry::new();
    registry.register(Box::new(EchoCapability));
    registry.register(Box::new(RecallCapability::new(memory.facts())));

    let agent = Arc::new(AgentLoop::new(
        &config,
        memory.clone(),
        Arc::new(client),
        Arc::new(registry),
    ));

    Ok(Runtime {
        config,
        memory,
        agent,
    })
}

/// A crash-recovery mirror on disk is offered before a new session starts:
/// by default the uncommitted session is resumed; `--fresh` folds it into
/// the archive and starts clean.
async fn open_session(memory: &Arc<MemoryManager>, fresh: bool) -> Result<()> {
    if memory.has_recovery() {
        if fresh {
            memory.recover_session().await?;
            memory.commit_session().await?;
            memory.start_session().await?;
            info!("Previous uncommitted session archived; starting fresh");
        } else {
            memory.recover_session().await?;
            eprintln!("Recovered an uncommitted session from a previous run (use --fresh to start clean).");
        }
    } else {
        memory.start_session().await?;
    }
    Ok(())
}

/// Graceful teardown: bounded distillation grace, then commit.
pub(crate) async fn teardown(runtime: &Runtime) -> Result<()> {
    runtime
        .memory
        .shutdown(std::time::Duration::from_secs(
            runtime.config.memory.shutdown_grace_secs,
        ))
        .await;
    runtime.memory.commit_session().await?;
    Ok(())
}
