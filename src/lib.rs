//! Sotto - crash-safe voice-and-text personal AI assistant runtime

pub mod agent;
pub mod capabilities;
pub mod completion;
pub mod config;
pub mod error;
pub mod memory;
pub mod session;
pub mod utils;
pub mod voice;

pub use agent::{AgentLoop, ContextBuilder};
pub use capabilities::{Capability, CapabilityOutput, CapabilityRegistry, InvocationContext};
pub use completion::{
    AnthropicClient, CapabilitySchema, CompletionClient, CompletionReply, Invocation,
};
pub use config::Config;
pub use error::{Result, SottoError};
pub use memory::{FactStore, MemoryManager};
pub use session::{CapabilityCall, Channel, Message, Role, Session};
pub use voice::{VoiceController, VoiceState};
