//! `facts` and `sessions` command handlers.

use anyhow::{Context, Result};

use sotto::config::Config;
use sotto::memory::FactStore;
use sotto::session::Session;

/// Print every remembered fact with its provenance.
pub(crate) async fn cmd_facts() -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let store = FactStore::open(config.data_dir().join("facts.json"))
        .with_context(|| "Failed to open the fact store")?;

    if store.is_empty() {
        println!("No facts remembered yet.");
        return Ok(());
    }

    for entry in store.list_all() {
        println!(
            "{}: {}  (from session {}, messages {}..{}, {})",
            entry.key,
            entry.value,
            entry.provenance.session_id,
            entry.provenance.span.0,
            entry.provenance.span.1,
            entry.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

/// List committed sessions from the permanent archive.
pub(crate) async fn cmd_sessions() -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let path = config.data_dir().join("archive.jsonl");
    if !path.exists() {
        println!("No archived sessions.");
        return Ok(());
    }

    let content =
        std::fs::read_to_string(&path).with_context(|| "Failed to read the session archive")?;
    let mut count = 0;
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let session: Session =
            serde_json::from_str(line).with_context(|| "Malformed archive entry")?;
        let first_user = session
            .messages
            .iter()
            .find(|m| m.role == sotto::session::Role::User)
            .map(|m| m.content.chars().take(60).collect::<String>())
            .unwrap_or_else(|| "(no user messages)".to_string());
        println!(
            "{}  {}  {} messages  {}",
            session.id,
            session.started_at.format("%Y-%m-%d %H:%M"),
            session.messages.len(),
            first_user,
        );
        count += 1;
    }
    println!("\n{} session(s).", count);
    Ok(())
}
