//! Background fact distillation for Sotto.
//!
//! A single worker task receives windows of recent messages over a bounded
//! queue, scans them for durable facts about the user, and merges the
//! candidates into the fact store. The worker runs on its own task so the
//! append path is never blocked, and every failure inside it is contained
//! and logged.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SottoError;
use crate::memory::facts::{FactProvenance, FactStore};
use crate::session::{Message, Role};

/// A distillation request: the recent message window plus its location in
/// the session, carried as provenance for any facts derived from it.
#[derive(Debug)]
pub struct DistillJob {
    pub session_id: Uuid,
    /// Inclusive index range of `messages` within the session
    pub span: (usize, usize),
    pub messages: Vec<Message>,
}

/// Spawn the distillation worker.
///
/// The worker drains jobs until the queue closes or `cancel` fires. Shutdown
/// waits a bounded grace for the in-flight pass and then proceeds regardless;
/// distillation is best-effort and never required for the session record.
pub(crate) fn spawn_worker(
    facts: Arc<RwLock<FactStore>>,
    mut jobs: mpsc::Receiver<DistillJob>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Distillation worker cancelled");
                    break;
                }
                job = jobs.recv() => {
                    match job {
                        Some(job) => run_pass(&facts, job).await,
                        None => {
                            debug!("Distillation queue closed");
                            break;
                        }
                    }
                }
            }
        }
    })
}

async fn run_pass(facts: &Arc<RwLock<FactStore>>, job: DistillJob) {
    let candidates = derive_facts(&job.messages);
    if candidates.is_empty() {
        return;
    }
    let provenance = FactProvenance {
        session_id: job.session_id,
        span: job.span,
    };
    let mut store = facts.write().await;
    match store.merge(candidates, provenance) {
        Ok(merged) => debug!(facts = merged, "Distillation pass merged facts"),
        Err(e) => {
            // Contained: the turn path must never see this.
            let e = SottoError::Distillation(e.to_string());
            warn!(error = %e, "Distillation pass failed");
        }
    }
}

/// Phrase prefixes mapped to the fact key they populate.
const FACT_PATTERNS: &[(&str, &str)] = &[
    ("my name is ", "name"),
    ("call me ", "name"),
    ("i live in ", "location"),
    ("i'm based in ", "location"),
    ("i am based in ", "location"),
    ("i work as ", "occupation"),
    ("my job is ", "occupation"),
    ("i work at ", "employer"),
];

/// Phrase prefixes that produce `interest:<slug>` facts.
const INTEREST_PATTERNS: &[&str] = &["i like ", "i love ", "i enjoy "];

/// Scan user messages for durable facts.
///
/// Purely lexical; the window is small, and last-write-wins merging means a
/// later, better phrasing simply replaces an earlier guess.
pub fn derive_facts(messages: &[Message]) -> Vec<(String, String)> {
    let mut facts = Vec::new();

    for msg in messages.iter().filter(|m| m.role == Role::User) {
        let lower = msg.content.to_ascii_lowercase();

        for (pattern, key) in FACT_PATTERNS {
            if let Some(value) = extract_after(&msg.content, &lower, pattern) {
                facts.push((key.to_string(), strip_article(&value)));
            }
        }

        for pattern in INTEREST_PATTERNS {
            if let Some(value) = extract_after(&msg.content, &lower, pattern) {
                let slug = value.to_ascii_lowercase().replace(' ', "-");
                facts.push((format!("interest:{}", slug), value));
            }
        }
    }

    facts
}

/// Take the text after `pattern`, up to the next clause boundary.
///
/// Matching runs on the ASCII-lowercased copy so byte offsets line up with
/// the original content.
fn extract_after(content: &str, lower: &str, pattern: &str) -> Option<String> {
    let idx = lower.find(pattern)?;
    let rest = &content[idx + pattern.len()..];
    let end = rest
        .find(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | '\n'))
        .unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() || value.len() > 80 {
        return None;
    }
    Some(value.to_string())
}

fn strip_article(value: &str) -> String {
    let lower = value.to_ascii_lowercase();
    for article in ["an ", "a ", "the "] {
        if lower.starts_with(article) {
            return value[article.len()..].to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Channel;
    use std::time::Duration;
    use tempfile::TempDir;

    fn user(content: &str) -> Message {
        Message::user(content, Channel::Text)
    }

    #[test]
    fn test_derive_name_and_location() {
        let facts = derive_facts(&[user("Hi! My name is Ada Lovelace. I live in London.")]);
        assert!(facts.contains(&("name".to_string(), "Ada Lovelace".to_string())));
        assert!(facts.contains(&("location".to_string(), "London".to_string())));
    }

    #[test]
    fn test_derive_occupation_strips_article() {
        let facts = derive_facts(&[user("I work as an engineer, mostly backend.")]);
        assert!(facts.contains(&("occupation".to_string(), "engineer".to_string())));
    }

    #[test]
    fn test_derive_interest_slug() {
        let facts = derive_facts(&[user("I love rock climbing")]);
        assert!(facts.contains(&(
            "interest:rock-climbing".to_string(),
            "rock climbing".to_string()
        )));
    }

    #[test]
    fn test_derive_ignores_assistant_messages() {
        let facts = derive_facts(&[Message::assistant("My name is Sotto", Channel::Text)]);
        assert!(facts.is_empty());
    }

    #[test]
    fn test_derive_nothing_from_plain_chat() {
        let facts = derive_facts(&[user("what's two plus two")]);
        assert!(facts.is_empty());
    }

    #[test]
    fn test_derive_skips_overlong_values() {
        let long = format!("my name is {}", "x".repeat(120));
        assert!(derive_facts(&[user(&long)]).is_empty());
    }

    #[tokio::test]
    async fn test_worker_merges_facts() {
        let dir = TempDir::new().unwrap();
        let facts = Arc::new(RwLock::new(
            FactStore::open(dir.path().join("facts.json")).unwrap(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = spawn_worker(facts.clone(), rx, cancel.clone());

        tx.send(DistillJob {
            session_id: Uuid::new_v4(),
            span: (0, 0),
            messages: vec![user("my name is Ada")],
        })
        .await
        .unwrap();

        // Closing the queue lets the worker drain and exit.
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should exit")
            .unwrap();

        let store = facts.read().await;
        assert_eq!(store.get("name").unwrap().value, "Ada");
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let facts = Arc::new(RwLock::new(
            FactStore::open(dir.path().join("facts.json")).unwrap(),
        ));
        let (_tx, rx) = mpsc::channel::<DistillJob>(4);
        let cancel = CancellationToken::new();
        let handle = spawn_worker(facts, rx, cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should exit on cancel")
            .unwrap();
    }
}
