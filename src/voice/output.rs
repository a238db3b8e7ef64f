//! Output adapters - the rendering surfaces that observe the controller.
//!
//! The controller and loop depend only on this interface; the console
//! variant covers CLI use, and richer surfaces (menu bars, overlays)
//! implement the same two calls.

use crate::session::{Message, Role};

use super::VoiceState;

/// A surface that renders state transitions and conversation messages.
pub trait OutputAdapter: Send + Sync {
    /// Observe a state transition with a short human-readable detail.
    fn report_state(&self, state: VoiceState, detail: &str);

    /// Observe a message entering the conversation.
    fn report_message(&self, message: &Message);
}

/// Console rendering: conversation to stdout, transitions to the log.
pub struct ConsoleAdapter;

impl OutputAdapter for ConsoleAdapter {
    fn report_state(&self, state: VoiceState, detail: &str) {
        tracing::debug!(state = %state, detail, "Controller state");
    }

    fn report_message(&self, message: &Message) {
        match message.role {
            Role::User => println!("you ({})> {}", message.channel, message.content),
            Role::Assistant => println!("sotto> {}", message.content),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Channel;

    #[test]
    fn test_console_adapter_does_not_panic() {
        let adapter = ConsoleAdapter;
        adapter.report_state(VoiceState::Thinking, "Processing...");
        adapter.report_message(&Message::user("hello", Channel::Text));
        adapter.report_message(&Message::assistant("hi", Channel::Text));
        adapter.report_message(&Message::system("ignored"));
    }
}
