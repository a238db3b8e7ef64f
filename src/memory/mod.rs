//! Memory module - the durable, crash-safe conversation record.
//!
//! Three tiers:
//! - a per-session append log (`journal/<id>.jsonl`), one message per line;
//! - a crash-recovery mirror (`recovery.json`) holding the full uncommitted
//!   session, rewritten atomically on every append and removed only on
//!   graceful commit;
//! - the permanent archive (`archive.jsonl`), one committed session per line,
//!   plus the long-term fact record (`facts.json`).
//!
//! The append path is serialized per session and durable before return: the
//! mirror write completes before the journal write, and both complete before
//! the message is visible to the next loop round. Fact distillation runs on
//! an independent worker task and never blocks or fails an append.

pub mod distill;
pub mod facts;

pub use distill::DistillJob;
pub use facts::{FactEntry, FactProvenance, FactStore};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::error::{Result, SottoError};
use crate::session::{Message, Session};

/// Serialized state behind the append path.
struct ActiveState {
    session: Option<Session>,
    /// Appends since the last distillation trigger
    since_distill: usize,
    /// Index of the first message not yet handed to the worker
    window_start: usize,
}

/// Owns the durable conversation log, the crash-recovery mirror, and the
/// long-term fact store; runs the background distillation worker.
///
/// Explicitly constructed and passed to the loop and controller; lifecycle is
/// tied to process start/shutdown.
pub struct MemoryManager {
    root: PathBuf,
    state: Mutex<ActiveState>,
    facts: Arc<RwLock<FactStore>>,
    distill_tx: mpsc::Sender<DistillJob>,
    distill_interval: usize,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_cancel: CancellationToken,
}

impl MemoryManager {
    /// Open the memory manager rooted at `root`, creating the layout if
    /// needed, and start the distillation worker.
    pub fn open(root: impl Into<PathBuf>, config: &MemoryConfig) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("journal"))
            .map_err(|e| SottoError::persistence("memory layout", e))?;

        let facts = Arc::new(RwLock::new(FactStore::open(root.join("facts.json"))?));

        let (distill_tx, distill_rx) = mpsc::channel(config.distill_queue_depth.max(1));
        let worker_cancel = CancellationToken::new();
        let worker = distill::spawn_worker(facts.clone(), distill_rx, worker_cancel.clone());

        Ok(Self {
            root,
            state: Mutex::new(ActiveState {
                session: None,
                since_distill: 0,
                window_start: 0,
            }),
            facts,
            distill_tx,
            distill_interval: config.distill_interval,
            worker: Mutex::new(Some(worker)),
            worker_cancel,
        })
    }

    fn mirror_path(&self) -> PathBuf {
        self.root.join("recovery.json")
    }

    fn archive_path(&self) -> PathBuf {
        self.root.join("archive.jsonl")
    }

    fn journal_path(&self, id: Uuid) -> PathBuf {
        self.root.join("journal").join(format!("{}.jsonl", id))
    }

    /// A mirror on disk at startup signals an unclean prior shutdown.
    pub fn has_recovery(&self) -> bool {
        self.mirror_path().exists()
    }

    /// Start a fresh session. Errors if one is already open.
    pub async fn start_session(&self) -> Result<Uuid> {
        let mut state = self.state.lock().await;
        if state.session.is_some() {
            return Err(SottoError::Session("a session is already open".into()));
        }
        let session = Session::new();
        let id = session.id;
        self.write_mirror(&session).await?;
        state.session = Some(session);
        state.since_distill = 0;
        state.window_start = 0;
        info!(session_id = %id, "Session started");
        Ok(id)
    }

    /// Adopt the crash-recovery mirror as the active session.
    ///
    /// Returns `Ok(None)` when no mirror is present. Errors if a session is
    /// already open.
    pub async fn recover_session(&self) -> Result<Option<Uuid>> {
        let mut state = self.state.lock().await;
        if state.session.is_some() {
            return Err(SottoError::Session("a session is already open".into()));
        }
        let path = self.mirror_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SottoError::persistence("mirror read", e))?;
        let session: Session = serde_json::from_str(&content)
            .map_err(|e| SottoError::persistence("mirror parse", e))?;
        let id = session.id;
        let len = session.messages.len();
        state.window_start = len;
        state.since_distill = 0;
        state.session = Some(session);
        info!(session_id = %id, messages = len, "Recovered uncommitted session");
        Ok(Some(id))
    }

    /// Append a message to the active session. Durable before return: the
    /// crash-recovery mirror is rewritten first, then the journal line.
    ///
    /// Every `distill_interval` appends, the accumulated window is handed to
    /// the distillation worker (fire-and-forget).
    pub async fn append_message(&self, message: Message) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state
            .session
            .as_mut()
            .ok_or_else(|| SottoError::Session("no open session".into()))?;
        session.push(message.clone());

        let session = state.session.as_ref().expect("session just populated");
        let session_id = session.id;
        let len = session.messages.len();
        self.write_mirror(session).await?;
        self.append_journal(session_id, &message).await?;

        state.since_distill += 1;
        if self.distill_interval > 0 && state.since_distill >= self.distill_interval {
            let start = state.window_start;
            let end = len - 1;
            let window = state.session.as_ref().expect("session open").messages[start..=end].to_vec();
            state.window_start = len;
            state.since_distill = 0;
            drop(state);
            self.schedule_distillation(DistillJob {
                session_id,
                span: (start, end),
                messages: window,
            });
        }
        Ok(())
    }

    /// Hand a message window to the distillation worker. Never blocks; a full
    /// queue drops the job with a warning.
    pub fn schedule_distillation(&self, job: DistillJob) {
        match self.distill_tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Distillation queue full, dropping job");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Distillation worker gone, dropping job");
            }
        }
    }

    /// Fold the active session into the permanent archive and clear the
    /// mirror. Called on graceful shutdown (or before starting fresh when a
    /// recovered session is declined).
    pub async fn commit_session(&self) -> Result<Option<Uuid>> {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.take() else {
            return Ok(None);
        };
        state.since_distill = 0;
        state.window_start = 0;

        let line = serde_json::to_string(&session)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.archive_path())
            .await
            .map_err(|e| SottoError::persistence("archive open", e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SottoError::persistence("archive write", e))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| SottoError::persistence("archive write", e))?;
        file.sync_data()
            .await
            .map_err(|e| SottoError::persistence("archive sync", e))?;

        let mirror = self.mirror_path();
        if mirror.exists() {
            tokio::fs::remove_file(&mirror)
                .await
                .map_err(|e| SottoError::persistence("mirror remove", e))?;
        }
        info!(session_id = %session.id, messages = session.messages.len(), "Session committed");
        Ok(Some(session.id))
    }

    /// Snapshot of the active session's messages, in append order.
    pub async fn transcript(&self) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        let session = state
            .session
            .as_ref()
            .ok_or_else(|| SottoError::Session("no open session".into()))?;
        Ok(session.messages.clone())
    }

    /// The id of the active session, if one is open.
    pub async fn active_session_id(&self) -> Option<Uuid> {
        self.state.lock().await.session.as_ref().map(|s| s.id)
    }

    /// Replay a session's journal from disk, in append order.
    pub async fn replay_journal(&self, id: Uuid) -> Result<Vec<Message>> {
        let content = tokio::fs::read_to_string(self.journal_path(id))
            .await
            .map_err(|e| SottoError::persistence("journal read", e))?;
        let mut messages = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            messages.push(serde_json::from_str(line)?);
        }
        Ok(messages)
    }

    /// All committed sessions from the permanent archive, in commit order.
    pub async fn archived_sessions(&self) -> Result<Vec<Session>> {
        let path = self.archive_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SottoError::persistence("archive read", e))?;
        let mut sessions = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            sessions.push(serde_json::from_str(line)?);
        }
        Ok(sessions)
    }

    /// Shared handle to the fact store (worker writes, loop and CLI read).
    pub fn facts(&self) -> Arc<RwLock<FactStore>> {
        self.facts.clone()
    }

    /// Fact context for system-prompt injection, if any facts are known.
    pub async fn fact_context(&self) -> Option<String> {
        self.facts.read().await.context_summary()
    }

    /// Stop the distillation worker, waiting at most `grace` for an
    /// in-flight pass. The session record never depends on distillation, so
    /// shutdown proceeds regardless.
    pub async fn shutdown(&self, grace: Duration) {
        self.worker_cancel.cancel();
        if let Some(handle) = self.worker.lock().await.take() {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("Distillation worker did not stop within the grace period");
            }
        }
    }

    /// Atomic mirror rewrite: temp file, fsync, rename.
    async fn write_mirror(&self, session: &Session) -> Result<()> {
        let tmp = self.root.join("recovery.json.tmp");
        let data = serde_json::to_string(session)?;
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| SottoError::persistence("mirror create", e))?;
        file.write_all(data.as_bytes())
            .await
            .map_err(|e| SottoError::persistence("mirror write", e))?;
        file.sync_all()
            .await
            .map_err(|e| SottoError::persistence("mirror sync", e))?;
        drop(file);
        tokio::fs::rename(&tmp, self.mirror_path())
            .await
            .map_err(|e| SottoError::persistence("mirror rename", e))
    }

    async fn append_journal(&self, id: Uuid, message: &Message) -> Result<()> {
        let line = serde_json::to_string(message)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path(id))
            .await
            .map_err(|e| SottoError::persistence("journal open", e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SottoError::persistence("journal write", e))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| SottoError::persistence("journal write", e))?;
        file.sync_data()
            .await
            .map_err(|e| SottoError::persistence("journal sync", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Channel, Role};
    use tempfile::TempDir;

    fn test_config() -> MemoryConfig {
        MemoryConfig::default()
    }

    fn open_manager(dir: &TempDir) -> MemoryManager {
        MemoryManager::open(dir.path(), &test_config()).unwrap()
    }

    #[tokio::test]
    async fn test_start_append_commit() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);

        let id = manager.start_session().await.unwrap();
        manager
            .append_message(Message::user("hello", Channel::Text))
            .await
            .unwrap();
        manager
            .append_message(Message::assistant("hi!", Channel::Text))
            .await
            .unwrap();

        let transcript = manager.transcript().await.unwrap();
        assert_eq!(transcript.len(), 2);

        let committed = manager.commit_session().await.unwrap();
        assert_eq!(committed, Some(id));
        assert!(!manager.has_recovery());
        assert!(manager.active_session_id().await.is_none());
    }

    #[tokio::test]
    async fn test_append_without_session_errors() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);
        let err = manager
            .append_message(Message::user("hello", Channel::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, SottoError::Session(_)));
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);
        manager.start_session().await.unwrap();
        assert!(manager.start_session().await.is_err());
    }

    #[tokio::test]
    async fn test_journal_replay_preserves_order() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);
        let id = manager.start_session().await.unwrap();

        for i in 0..7 {
            manager
                .append_message(Message::user(&format!("msg {}", i), Channel::Text))
                .await
                .unwrap();
        }

        let replayed = manager.replay_journal(id).await.unwrap();
        assert_eq!(replayed.len(), 7);
        for (i, msg) in replayed.iter().enumerate() {
            assert_eq!(msg.content, format!("msg {}", i));
        }
    }

    #[tokio::test]
    async fn test_crash_recovery_yields_exact_messages() {
        let dir = TempDir::new().unwrap();
        let id;
        {
            // Simulated crash: manager dropped without commit.
            let manager = open_manager(&dir);
            id = manager.start_session().await.unwrap();
            for i in 0..3 {
                manager
                    .append_message(Message::user(&format!("m{}", i), Channel::Voice))
                    .await
                    .unwrap();
            }
        }

        let manager = open_manager(&dir);
        assert!(manager.has_recovery());
        let recovered = manager.recover_session().await.unwrap();
        assert_eq!(recovered, Some(id));

        let transcript = manager.transcript().await.unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0].content, "m0");
        assert_eq!(transcript[2].content, "m2");
        assert_eq!(transcript[0].channel, Channel::Voice);
    }

    #[tokio::test]
    async fn test_recover_without_mirror_returns_none() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);
        assert!(!manager.has_recovery());
        assert_eq!(manager.recover_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_appends_to_archive() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);

        for round in 0..2 {
            manager.start_session().await.unwrap();
            manager
                .append_message(Message::user(&format!("round {}", round), Channel::Text))
                .await
                .unwrap();
            manager.commit_session().await.unwrap();
        }

        let archived = manager.archived_sessions().await.unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[0].messages[0].content, "round 0");
        assert_eq!(archived[1].messages[0].content, "round 1");
    }

    #[tokio::test]
    async fn test_commit_without_session_is_noop() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);
        assert_eq!(manager.commit_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_distillation_triggers_every_interval() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config();
        config.distill_interval = 2;
        let manager = MemoryManager::open(dir.path(), &config).unwrap();
        manager.start_session().await.unwrap();

        manager
            .append_message(Message::user("my name is Ada", Channel::Text))
            .await
            .unwrap();
        manager
            .append_message(Message::assistant("Nice to meet you, Ada!", Channel::Text))
            .await
            .unwrap();

        // The worker runs on its own task; poll briefly for the merge.
        let facts = manager.facts();
        let mut found = false;
        for _ in 0..50 {
            if facts.read().await.get("name").is_some() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(found, "distillation should have merged the name fact");
        assert_eq!(facts.read().await.get("name").unwrap().value, "Ada");

        manager.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_mirror_reflects_every_append() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);
        manager.start_session().await.unwrap();

        manager
            .append_message(Message::user("one", Channel::Text))
            .await
            .unwrap();
        let mirror: Session = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("recovery.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(mirror.messages.len(), 1);

        manager
            .append_message(Message::user("two", Channel::Text))
            .await
            .unwrap();
        let mirror: Session = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("recovery.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(mirror.messages.len(), 2);
        assert_eq!(mirror.messages[1].role, Role::User);
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded() {
        let dir = TempDir::new().unwrap();
        let manager = open_manager(&dir);
        let start = std::time::Instant::now();
        manager.shutdown(Duration::from_millis(500)).await;
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
