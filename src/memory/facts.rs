//! Long-term fact store for Sotto.
//!
//! Persistent key-value facts about the user that survive across sessions,
//! stored as a single JSON file in the data directory. Mutated only by the
//! background distillation worker; read by the agent loop to build context
//! and by the `recall` capability.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SottoError};

/// Which message range of which session a fact was derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactProvenance {
    /// Session the fact was distilled from
    pub session_id: Uuid,
    /// Inclusive index range of the source messages within that session
    pub span: (usize, usize),
}

/// A single remembered fact with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEntry {
    /// Unique key (e.g., "name", "location", "interest:climbing")
    pub key: String,
    /// The fact content
    pub value: String,
    /// Where this fact came from
    pub provenance: FactProvenance,
    /// When this fact was last written
    pub updated_at: DateTime<Utc>,
}

/// Fact store persisted as JSON, keyed by fact name.
///
/// Merge policy is last-write-wins per key: a key collision overwrites the
/// value and provenance together. Facts are never deleted automatically.
#[derive(Debug)]
pub struct FactStore {
    entries: HashMap<String, FactEntry>,
    storage_path: PathBuf,
}

impl FactStore {
    /// Open (or create) the fact store at the given path.
    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| SottoError::persistence("fact store read", e))?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            entries,
            storage_path: path,
        })
    }

    /// Merge candidate facts, last-write-wins per key, and persist.
    pub fn merge(
        &mut self,
        facts: Vec<(String, String)>,
        provenance: FactProvenance,
    ) -> Result<usize> {
        if facts.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        for (key, value) in facts {
            self.entries.insert(
                key.clone(),
                FactEntry {
                    key,
                    value,
                    provenance: provenance.clone(),
                    updated_at: Utc::now(),
                },
            );
            written += 1;
        }
        self.save()?;
        Ok(written)
    }

    /// Look up a single fact by key.
    pub fn get(&self, key: &str) -> Option<&FactEntry> {
        self.entries.get(key)
    }

    /// Case-insensitive substring search across keys and values.
    pub fn search(&self, query: &str) -> Vec<&FactEntry> {
        let query_lower = query.to_lowercase();
        let mut hits: Vec<&FactEntry> = self
            .entries
            .values()
            .filter(|e| {
                e.key.to_lowercase().contains(&query_lower)
                    || e.value.to_lowercase().contains(&query_lower)
            })
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        hits
    }

    /// All entries sorted by key, for display.
    pub fn list_all(&self) -> Vec<&FactEntry> {
        let mut all: Vec<&FactEntry> = self.entries.values().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the fact context injected into the system prompt.
    ///
    /// Returns `None` when nothing is known yet.
    pub fn context_summary(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let mut lines = vec!["## What you know about the user:".to_string()];
        for entry in self.list_all() {
            lines.push(format!("- {}: {}", entry.key, entry.value));
        }
        Some(lines.join("\n"))
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SottoError::persistence("fact store dir", e))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.storage_path, json)
            .map_err(|e| SottoError::persistence("fact store write", e))
    }
}
