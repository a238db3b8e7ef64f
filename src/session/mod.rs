//! Session module - the shared dialogue session data model
//!
//! Persistence for sessions lives in the `memory` module; this module holds
//! only the immutable message/session types that flow through the runtime.

pub mod types;

pub use types::{CapabilityCall, Channel, Message, Role, Session};
