//! Session types for Sotto
//!
//! This module defines the core types for the shared dialogue session:
//! messages, roles, input channels, and capability calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The input channel that produced a turn.
///
/// Fixed at the moment an utterance is accepted and carried through every
/// message of the turn; the voice controller routes the terminal reply by
/// this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Spoken input via wake word + transcription
    Voice,
    /// Typed input
    Text,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Voice => write!(f, "voice"),
            Channel::Text => write!(f, "text"),
        }
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the assistant
    Assistant,
    /// Results from capability invocations
    Capability,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Capability => write!(f, "capability"),
        }
    }
}

/// A capability invocation requested by the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCall {
    /// Unique identifier for this call, assigned by the completion service
    pub id: String,
    /// Name of the capability to invoke
    pub name: String,
    /// Structured arguments for the capability
    pub arguments: serde_json::Value,
}

impl CapabilityCall {
    pub fn new(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }
}

/// A single message in the dialogue session.
///
/// Immutable once appended; ordering is append-only and defines conversation
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content (or capability-result payload)
    pub content: String,
    /// The input channel of the turn this message belongs to
    pub channel: Channel,
    /// When this message was created
    pub timestamp: DateTime<Utc>,
    /// Capability calls requested by the assistant (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_calls: Option<Vec<CapabilityCall>>,
    /// ID of the capability call this message is the result of
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_call_id: Option<String>,
}

impl Message {
    fn base(role: Role, content: &str, channel: Channel) -> Self {
        Self {
            role,
            content: content.to_string(),
            channel,
            timestamp: Utc::now(),
            capability_calls: None,
            capability_call_id: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: &str, channel: Channel) -> Self {
        Self::base(Role::User, content, channel)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str, channel: Channel) -> Self {
        Self::base(Role::Assistant, content, channel)
    }

    /// Create a new system message. System text is channel-neutral; the tag
    /// defaults to `Text`.
    pub fn system(content: &str) -> Self {
        Self::base(Role::System, content, Channel::Text)
    }

    /// Create an assistant message carrying capability-invocation requests.
    pub fn assistant_with_calls(
        content: &str,
        calls: Vec<CapabilityCall>,
        channel: Channel,
    ) -> Self {
        let mut msg = Self::base(Role::Assistant, content, channel);
        msg.capability_calls = Some(calls);
        msg
    }

    /// Create a capability-result message.
    pub fn capability_result(call_id: &str, content: &str, channel: Channel) -> Self {
        let mut msg = Self::base(Role::Capability, content, channel);
        msg.capability_call_id = Some(call_id.to_string());
        msg
    }

    /// Check if this message carries capability-invocation requests.
    pub fn has_capability_calls(&self) -> bool {
        self.capability_calls
            .as_ref()
            .map(|c| !c.is_empty())
            .unwrap_or(false)
    }

    /// Check if this is a capability-result message.
    pub fn is_capability_result(&self) -> bool {
        self.role == Role::Capability && self.capability_call_id.is_some()
    }
}

/// The shared dialogue session: an ordered sequence of messages plus identity.
///
/// Exactly one session is open for writing at a time; it is mutated only
/// through the memory manager's append path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session
    pub id: Uuid,
    /// When this session was started
    pub started_at: DateTime<Utc>,
    /// Ordered list of messages
    pub messages: Vec<Message>,
}

impl Session {
    /// Create a new empty session with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Append a message. Order is never rewritten.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get the number of messages in this session.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if this session is empty (no messages).
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the last message in this session, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
