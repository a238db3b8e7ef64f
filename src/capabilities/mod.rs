//! Capabilities module - named, schema-described actions the reasoning
//! service may request.
//!
//! - `Capability` trait: the interface every capability implements
//! - `InvocationContext`: execution context (channel, workspace)
//! - `CapabilityRegistry`: registry populated once at startup, read-only after
//! - Builtins: `echo` (infrastructure check), `recall` (fact-store search)

mod builtin;
mod registry;
mod types;

pub use builtin::{EchoCapability, RecallCapability};
pub use registry::CapabilityRegistry;
pub use types::{Capability, CapabilityOutput, InvocationContext};
