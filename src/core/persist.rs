// src/core/persist.rs - Background writer for config and session files
//
// The orchestrator loop hands snapshots to a spawned task and moves on, so
// file I/O never delays stop/message handling or transport events. Jobs for
// the same path that queue up while a write is in progress collapse to the
// newest one.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use crate::chat::store::SessionsSnapshot;
use crate::infra::config::Config;
use crate::infra::errors::NovelerError;

#[derive(Debug)]
pub enum PersistJob {
    Sessions {
        path: PathBuf,
        snapshot: SessionsSnapshot,
    },
    Config {
        path: PathBuf,
        config: Box<Config>,
    },
}

impl PersistJob {
    fn path(&self) -> &Path {
        match self {
            PersistJob::Sessions { path, .. } | PersistJob::Config { path, .. } => path,
        }
    }

    async fn write(self) -> Result<(), NovelerError> {
        match self {
            PersistJob::Sessions { path, snapshot } => snapshot.save_to(&path).await,
            PersistJob::Config { path, config } => {
                config.save_to(&path).await?;
                tracing::info!(path = %path.display(), "Saved AI configuration");
                Ok(())
            }
        }
    }
}

enum Command {
    Write(PersistJob),
    Flush(oneshot::Sender<()>),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Write(job) => f.debug_tuple("Write").field(&job.path()).finish(),
            Command::Flush(_) => f.write_str("Flush"),
        }
    }
}

/// Handle to the writer task. Must be created inside a tokio runtime.
#[derive(Debug, Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<Command>,
}

impl Persister {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(rx));
        Self { tx }
    }

    /// Queue a write. Returns immediately.
    pub fn submit(&self, job: PersistJob) {
        if self.tx.send(Command::Write(job)).is_err() {
            tracing::warn!("Persistence task is gone; change not saved");
        }
    }

    /// Wait until everything queued so far is on disk.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn writer_loop(mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(first) = rx.recv().await {
        let mut pending: Vec<PersistJob> = Vec::new();
        let mut acks = Vec::new();

        let mut next = Some(first);
        while let Some(command) = next {
            match command {
                Command::Write(job) => {
                    pending.retain(|queued| queued.path() != job.path());
                    pending.push(job);
                }
                Command::Flush(ack) => acks.push(ack),
            }
            next = rx.try_recv().ok();
        }

        for job in pending {
            let path = job.path().to_path_buf();
            if let Err(e) = job.write().await {
                tracing::warn!(path = %path.display(), "Failed to save: {e}");
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::store::SessionStore;
    use crate::chat::ChatMessage;

    fn snapshot(text: &str) -> SessionsSnapshot {
        let mut store = SessionStore::new();
        store.append_message(ChatMessage::user(text));
        store.export_all()
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let persister = Persister::spawn();

        persister.submit(PersistJob::Sessions {
            path: path.clone(),
            snapshot: snapshot("first"),
        });
        persister.submit(PersistJob::Sessions {
            path: path.clone(),
            snapshot: snapshot("second"),
        });
        persister.flush().await;

        let saved: SessionsSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.sessions[0].messages[0].content, "second");
    }

    #[tokio::test]
    async fn test_config_job_writes_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let persister = Persister::spawn();

        let mut config = Config::default();
        config.chat.max_context_messages = 3;
        persister.submit(PersistJob::Config {
            path: path.clone(),
            config: Box::new(config),
        });
        persister.flush().await;

        assert_eq!(Config::load_from(&path).unwrap().chat.max_context_messages, 3);
    }

    #[tokio::test]
    async fn test_failed_write_still_acks_flush() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should go makes the rename fail
        let path = dir.path().join("taken");
        std::fs::create_dir_all(path.join("child")).unwrap();

        let persister = Persister::spawn();
        persister.submit(PersistJob::Sessions {
            path,
            snapshot: snapshot("lost"),
        });
        tokio::time::timeout(std::time::Duration::from_secs(5), persister.flush())
            .await
            .unwrap();
    }
}
