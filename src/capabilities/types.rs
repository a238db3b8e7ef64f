//! Capability types for Sotto
//!
//! Defines the `Capability` trait implemented by every executable action,
//! the `InvocationContext` passed to handlers, and the `CapabilityOutput`
//! result record.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::session::Channel;

/// Result of a capability invocation.
///
/// Failures that the reasoning service should see and adapt to are returned
/// as `is_error: true` outputs, not as `Err` — only faults the runtime
/// cannot continue from come back as errors.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityOutput {
    /// Content fed back into the conversation as a capability-result message
    pub content: String,
    /// Whether this result represents a failure
    pub is_error: bool,
}

impl CapabilityOutput {
    /// Successful result.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Failure descriptor. Non-fatal: fed back for the next round.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait that all capabilities must implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use sotto::capabilities::{Capability, CapabilityOutput, InvocationContext};
/// use sotto::error::Result;
///
/// struct Ping;
///
/// #[async_trait]
/// impl Capability for Ping {
///     fn name(&self) -> &str { "ping" }
///     fn description(&self) -> &str { "Replies with pong" }
///     fn input_schema(&self) -> Value {
///         serde_json::json!({"type": "object", "properties": {}, "required": []})
///     }
///     async fn invoke(&self, _args: Value, _ctx: &InvocationContext) -> Result<CapabilityOutput> {
///         Ok(CapabilityOutput::ok("pong"))
///     }
/// }
/// ```
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name the reasoning service uses to request this capability.
    fn name(&self) -> &str;

    /// Description sent to the reasoning service.
    fn description(&self) -> &str;

    /// JSON Schema describing the accepted argument shape.
    fn input_schema(&self) -> Value;

    /// Execute with the given structured arguments.
    async fn invoke(&self, args: Value, ctx: &InvocationContext) -> Result<CapabilityOutput>;
}

/// Context provided to capabilities during invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// The input channel of the turn that requested this invocation
    pub channel: Option<Channel>,
    /// The workspace directory for file-adjacent capabilities
    pub workspace: Option<String>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_constructors() {
        let out = CapabilityOutput::ok("done");
        assert_eq!(out.content, "done");
        assert!(!out.is_error);

        let out = CapabilityOutput::error("bad arguments");
        assert!(out.is_error);
    }

    #[test]
    fn test_context_builder() {
        let ctx = InvocationContext::new()
            .with_channel(Channel::Voice)
            .with_workspace("/tmp/ws");
        assert_eq!(ctx.channel, Some(Channel::Voice));
        assert_eq!(ctx.workspace.as_deref(), Some("/tmp/ws"));
    }

    #[test]
    fn test_context_default_empty() {
        let ctx = InvocationContext::default();
        assert!(ctx.channel.is_none());
        assert!(ctx.workspace.is_none());
    }
}
