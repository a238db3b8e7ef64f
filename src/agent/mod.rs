//! Agent module - the capability-invocation loop.
//!
//! One turn flows through `AgentLoop::handle_turn`: the utterance is appended
//! durably, then the loop alternates completion rounds and capability
//! executions until the reasoning service returns a reply with no pending
//! invocations.
//!
//! ```text
//! ┌──────────────────┐     ┌───────────┐     ┌──────────────────┐
//! │ VoiceController  │────>│ AgentLoop │────>│ CompletionClient │
//! └──────────────────┘     └───────────┘     └──────────────────┘
//!                             │       │
//!                             ▼       ▼
//!                   ┌───────────┐   ┌─────────────────────┐
//!                   │  Memory   │   │ CapabilityRegistry  │
//!                   │  Manager  │   └─────────────────────┘
//!                   └───────────┘
//! ```

mod context;
mod r#loop;

pub use context::ContextBuilder;
pub use r#loop::AgentLoop;
