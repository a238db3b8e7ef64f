//! Context builder for completion requests.
//!
//! Assembles the system prompt — base instructions plus the fact context
//! distilled from earlier conversations — and prepends it to the transcript.

use crate::session::Message;

/// Default system prompt for the Sotto assistant.
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Sotto, a capable personal AI assistant reachable by voice and by keyboard.

You have access to capabilities to help accomplish tasks. Use them when needed.

Spoken replies are read aloud, so keep them short and natural. Be concise but helpful."#;

/// Builds the message list sent to the completion service.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    /// Create a builder with the default system prompt.
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Override the base system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Build the system message, injecting the fact context when present.
    pub fn build_system_message(&self, fact_context: Option<&str>) -> Message {
        match fact_context {
            Some(context) if !context.is_empty() => {
                Message::system(&format!("{}\n\n{}", self.system_prompt, context))
            }
            _ => Message::system(&self.system_prompt),
        }
    }

    /// Prepend the system message to the transcript.
    pub fn build_messages(
        &self,
        transcript: Vec<Message>,
        fact_context: Option<&str>,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(self.build_system_message(fact_context));
        messages.extend(transcript);
        messages
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
