//! Built-in capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::memory::FactStore;

use super::{Capability, CapabilityOutput, InvocationContext};

/// Echoes back the provided message. Exercises the invocation plumbing
/// without touching anything external.
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                }
            },
            "required": ["message"]
        })
    }

    async fn invoke(&self, args: Value, _ctx: &InvocationContext) -> Result<CapabilityOutput> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(CapabilityOutput::ok(message))
    }
}

/// Searches the long-term fact store for previously remembered information
/// about the user.
pub struct RecallCapability {
    facts: Arc<RwLock<FactStore>>,
}

impl RecallCapability {
    pub fn new(facts: Arc<RwLock<FactStore>>) -> Self {
        Self { facts }
    }
}

#[async_trait]
impl Capability for RecallCapability {
    fn name(&self) -> &str {
        "recall"
    }

    fn description(&self) -> &str {
        "Search remembered facts about the user. Use this when you need something learned in a previous conversation."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query (e.g. 'name', 'project', 'preferences')"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value, _ctx: &InvocationContext) -> Result<CapabilityOutput> {
        let query = match args.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q.to_string(),
            _ => return Ok(CapabilityOutput::error("Missing required argument: query")),
        };

        let store = self.facts.read().await;
        let hits = store.search(&query);
        if hits.is_empty() {
            return Ok(CapabilityOutput::ok("No matching memories found."));
        }
        let lines: Vec<String> = hits
            .iter()
            .map(|e| format!("[fact] {}: {}", e.key, e.value))
            .collect();
        Ok(CapabilityOutput::ok(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FactProvenance;
    use serde_json::json;
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_echo() {
        let out = EchoCapability
            .invoke(json!({"message": "hi"}), &InvocationContext::new())
            .await
            .unwrap();
        assert_eq!(out.content, "hi");
    }

    #[tokio::test]
    async fn test_echo_missing_message() {
        let out = EchoCapability
            .invoke(json!({}), &InvocationContext::new())
            .await
            .unwrap();
        assert_eq!(out.content, "(no message)");
    }

    fn fact_store_with_name(dir: &TempDir) -> Arc<RwLock<FactStore>> {
        let mut store = FactStore::open(dir.path().join("facts.json")).unwrap();
        store
            .merge(
                vec![("name".to_string(), "Ada".to_string())],
                FactProvenance {
                    session_id: Uuid::new_v4(),
                    span: (0, 0),
                },
            )
            .unwrap();
        Arc::new(RwLock::new(store))
    }

    #[tokio::test]
    async fn test_recall_finds_fact() {
        let dir = TempDir::new().unwrap();
        let recall = RecallCapability::new(fact_store_with_name(&dir));
        let out = recall
            .invoke(json!({"query": "name"}), &InvocationContext::new())
            .await
            .unwrap();
        assert!(out.content.contains("name: Ada"));
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn test_recall_no_match() {
        let dir = TempDir::new().unwrap();
        let recall = RecallCapability::new(fact_store_with_name(&dir));
        let out = recall
            .invoke(json!({"query": "spaceship"}), &InvocationContext::new())
            .await
            .unwrap();
        assert_eq!(out.content, "No matching memories found.");
    }

    #[tokio::test]
    async fn test_recall_missing_query() {
        let dir = TempDir::new().unwrap();
        let recall = RecallCapability::new(fact_store_with_name(&dir));
        let out = recall
            .invoke(json!({}), &InvocationContext::new())
            .await
            .unwrap();
        assert!(out.is_error);
    }
}
