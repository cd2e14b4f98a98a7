//! DebouncedSaver - Batches rapid mutations into one repository write
//!
//! Every mutation hands the saver a fresh snapshot. A background task keeps
//! only the newest one and writes it once no newer snapshot has arrived for
//! the debounce window. Failed saves are published as a `SaveWarning`; the
//! in-memory tree is never touched.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};
use tree_core::TreeSnapshot;

use crate::error::{Result, StorageError};
use crate::storage::TreeRepository;

/// Non-blocking notice that the latest save did not reach the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveWarning {
    pub tree_id: String,
    pub message: String,
}

enum SaverCommand {
    Snapshot(TreeSnapshot),
    Flush(oneshot::Sender<Result<()>>),
}

pub struct DebouncedSaver {
    tree_id: String,
    commands: mpsc::UnboundedSender<SaverCommand>,
    warnings: Arc<watch::Sender<Option<SaveWarning>>>,
}

impl DebouncedSaver {
    /// Start the save task on the current tokio runtime
    pub fn spawn(
        repository: Arc<dyn TreeRepository>,
        tree_id: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        let tree_id = tree_id.into();
        let (commands, rx) = mpsc::unbounded_channel();
        let (warnings, _) = watch::channel(None);
        let warnings = Arc::new(warnings);

        tokio::spawn(run_saver(
            repository,
            tree_id.clone(),
            debounce,
            rx,
            Arc::clone(&warnings),
        ));

        Self {
            tree_id,
            commands,
            warnings,
        }
    }

    pub fn tree_id(&self) -> &str {
        &self.tree_id
    }

    /// Queue `snapshot`, replacing any snapshot not yet written
    pub fn schedule(&self, snapshot: TreeSnapshot) {
        if self.commands.send(SaverCommand::Snapshot(snapshot)).is_err() {
            warn!(tree_id = %self.tree_id, "saver task has stopped; snapshot dropped");
        }
    }

    /// Write the pending snapshot now
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SaverCommand::Flush(tx))
            .map_err(|_| StorageError::SaverClosed)?;
        rx.await.map_err(|_| StorageError::SaverClosed)?
    }

    pub fn warnings(&self) -> watch::Receiver<Option<SaveWarning>> {
        self.warnings.subscribe()
    }

    pub fn current_warning(&self) -> Option<SaveWarning> {
        self.warnings.borrow().clone()
    }

    pub fn dismiss_warning(&self) {
        self.warnings.send_if_modified(|warning| warning.take().is_some());
    }
}

async fn run_saver(
    repository: Arc<dyn TreeRepository>,
    tree_id: String,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<SaverCommand>,
    warnings: Arc<watch::Sender<Option<SaveWarning>>>,
) {
    let mut pending: Option<TreeSnapshot> = None;
    let mut last_snapshot_time = Instant::now();

    let save = |snapshot: TreeSnapshot| {
        let repository = Arc::clone(&repository);
        let tree_id = tree_id.clone();
        let warnings = Arc::clone(&warnings);
        async move {
            match repository.save(&tree_id, &snapshot).await {
                Ok(()) => {
                    debug!(tree_id = %tree_id, nodes = snapshot.nodes.len(), "tree persisted");
                    warnings.send_if_modified(|warning| warning.take().is_some());
                    Ok(())
                }
                Err(e) => {
                    warn!(tree_id = %tree_id, "failed to persist tree: {}", e);
                    warnings.send_replace(Some(SaveWarning {
                        tree_id: tree_id.clone(),
                        message: format!("Could not save your tree: {}", e),
                    }));
                    Err(e)
                }
            }
        }
    };

    loop {
        let timeout = if pending.is_some() {
            debounce.saturating_sub(last_snapshot_time.elapsed())
        } else {
            Duration::from_secs(3600)
        };

        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(SaverCommand::Snapshot(snapshot)) => {
                        pending = Some(snapshot);
                        last_snapshot_time = Instant::now();
                    }
                    Some(SaverCommand::Flush(reply)) => {
                        let result = match pending.take() {
                            Some(snapshot) => save(snapshot).await,
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                    None => {
                        // Owner dropped; write what is left and stop
                        if let Some(snapshot) = pending.take() {
                            let _ = save(snapshot).await;
                        }
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(timeout), if pending.is_some() => {
                if let Some(snapshot) = pending.take() {
                    let _ = save(snapshot).await;
                }
            }
        }
    }

    debug!(tree_id = %tree_id, "saver task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTreeRepository;
    use tree_core::{LabelOrigin, Node, NodeId, Position};

    fn snapshot_with(n: usize) -> TreeSnapshot {
        TreeSnapshot {
            nodes: (0..n)
                .map(|i| {
                    Node::root(
                        NodeId::from(format!("node_{i}")),
                        format!("Node {}", i + 1),
                        LabelOrigin::Placeholder,
                        Position::default(),
                    )
                })
                .collect(),
            edges: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_rapid_snapshots_are_batched() {
        let repo = Arc::new(MemoryTreeRepository::new());
        let saver = DebouncedSaver::spawn(repo.clone(), "t", Duration::from_millis(50));

        saver.schedule(snapshot_with(1));
        saver.schedule(snapshot_with(2));
        saver.schedule(snapshot_with(3));
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(repo.save_count(), 1);
        assert_eq!(repo.stored("t").unwrap().nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_flush_writes_immediately() {
        let repo = Arc::new(MemoryTreeRepository::new());
        let saver = DebouncedSaver::spawn(repo.clone(), "t", Duration::from_secs(60));

        saver.schedule(snapshot_with(2));
        saver.flush().await.unwrap();
        assert_eq!(repo.save_count(), 1);

        // Nothing pending: flush is a no-op
        saver.flush().await.unwrap();
        assert_eq!(repo.save_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_publishes_warning_until_next_success() {
        let repo = Arc::new(MemoryTreeRepository::new());
        let saver = DebouncedSaver::spawn(repo.clone(), "t", Duration::from_secs(60));
        let warnings = saver.warnings();

        repo.set_failing(true);
        saver.schedule(snapshot_with(1));
        assert!(saver.flush().await.is_err());
        let warning = warnings.borrow().clone().unwrap();
        assert_eq!(warning.tree_id, "t");
        assert!(warning.message.contains("storage unavailable"));

        repo.set_failing(false);
        saver.schedule(snapshot_with(1));
        saver.flush().await.unwrap();
        assert!(saver.current_warning().is_none());
    }

    #[tokio::test]
    async fn test_dismiss_warning() {
        let repo = Arc::new(MemoryTreeRepository::new());
        let saver = DebouncedSaver::spawn(repo.clone(), "t", Duration::from_secs(60));

        repo.set_failing(true);
        saver.schedule(snapshot_with(1));
        let _ = saver.flush().await;
        assert!(saver.current_warning().is_some());

        saver.dismiss_warning();
        assert!(saver.current_warning().is_none());
    }

    #[tokio::test]
    async fn test_drop_writes_pending_snapshot() {
        let repo = Arc::new(MemoryTreeRepository::new());
        let saver = DebouncedSaver::spawn(repo.clone(), "t", Duration::from_secs(60));

        saver.schedule(snapshot_with(4));
        drop(saver);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(repo.stored("t").unwrap().nodes.len(), 4);
    }
}
