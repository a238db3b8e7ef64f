//! Capability registry for Sotto
//!
//! Holds the process-wide set of capabilities. Populated once at startup and
//! read-only afterward; lookups and invocations are by name.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use crate::completion::CapabilitySchema;
use crate::error::Result;

use super::{Capability, CapabilityOutput, InvocationContext};

/// A registry that holds capabilities and invokes them by name.
///
/// # Example
///
/// ```rust
/// use sotto::capabilities::{CapabilityRegistry, EchoCapability, InvocationContext};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = CapabilityRegistry::new();
/// registry.register(Box::new(EchoCapability));
///
/// assert!(registry.has("echo"));
///
/// let ctx = InvocationContext::new();
/// let out = registry.invoke("echo", json!({"message": "hello"}), &ctx).await.unwrap();
/// assert_eq!(out.content, "hello");
/// # });
/// ```
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Box<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability. A duplicate name replaces the earlier entry.
    pub fn register(&mut self, capability: Box<dyn Capability>) {
        let name = capability.name().to_string();
        info!(capability = %name, "Registering capability");
        self.capabilities.insert(name, capability);
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<&dyn Capability> {
        self.capabilities.get(name).map(|c| c.as_ref())
    }

    /// Invoke a capability by name.
    ///
    /// An unknown name returns `Ok(CapabilityOutput::error(...))` — the
    /// reasoning service asked for something we don't have, which it should
    /// see and adapt to rather than abort the turn.
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        ctx: &InvocationContext,
    ) -> Result<CapabilityOutput> {
        let capability = match self.capabilities.get(name) {
            Some(c) => c,
            None => {
                return Ok(CapabilityOutput::error(format!(
                    "Unknown capability: {}",
                    name
                )));
            }
        };

        let start = Instant::now();
        match capability.invoke(args, ctx).await {
            Ok(output) => {
                info!(
                    capability = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    is_error = output.is_error,
                    "Capability invoked"
                );
                Ok(output)
            }
            Err(e) => {
                error!(
                    capability = name,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Capability invocation failed"
                );
                Err(e)
            }
        }
    }

    /// Schemas for every registered capability, for the completion request.
    pub fn schemas(&self) -> Vec<CapabilitySchema> {
        self.capabilities
            .values()
            .map(|c| CapabilitySchema {
                name: c.name().to_string(),
                description: c.description().to_string(),
                input_schema: c.input_schema(),
            })
            .collect()
    }

    /// Names of all registered capabilities.
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(|s| s.as_str()).collect()
    }

    /// Check whether a capability is registered.
    pub fn has(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
