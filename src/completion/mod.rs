//! Completion module - the narrow interface to the remote reasoning service.
//!
//! The loop hands the full transcript plus the registered capability schemas
//! to a `CompletionClient` and gets back text and/or capability-invocation
//! requests. The shipped implementation speaks the Anthropic Messages API;
//! tests script their own clients.

pub mod anthropic;

pub use anthropic::AnthropicClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::Message;

/// Schema advertised to the reasoning service for one capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitySchema {
    /// Unique capability name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for the accepted arguments
    pub input_schema: serde_json::Value,
}

impl CapabilitySchema {
    pub fn new(name: &str, description: &str, input_schema: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// A capability invocation requested by the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Identifier assigned by the service, echoed back with the result
    pub id: String,
    /// Capability name
    pub name: String,
    /// Structured arguments
    pub arguments: serde_json::Value,
}

impl Invocation {
    pub fn new(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }
}

/// Token usage reported by the service, when available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A structured reply from the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReply {
    /// Text segments, joined
    pub text: String,
    /// Zero or more capability-invocation requests
    pub invocations: Vec<Invocation>,
    /// Token usage, if reported
    pub usage: Option<Usage>,
}

impl CompletionReply {
    /// A terminal, text-only reply.
    pub fn text(content: &str) -> Self {
        Self {
            text: content.to_string(),
            invocations: vec![],
            usage: None,
        }
    }

    /// A reply requesting capability invocations.
    pub fn with_invocations(content: &str, invocations: Vec<Invocation>) -> Self {
        Self {
            text: content.to_string(),
            invocations,
            usage: None,
        }
    }

    /// Whether the reply requests any invocations. A reply with none is the
    /// terminal reply of the turn.
    pub fn has_invocations(&self) -> bool {
        !self.invocations.is_empty()
    }
}

/// The request/response interface to the remote reasoning service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the conversation transcript and available capability schemas;
    /// returns the service's structured reply.
    async fn send(
        &self,
        transcript: Vec<Message>,
        capabilities: Vec<CapabilitySchema>,
    ) -> Result<CompletionReply>;

    /// Client name for logging.
    fn name(&self) -> &str;
}
