//! [`ChangeSignal`] backed by the platform's native watch API via `notify`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use crate::error::{Result, WatcherError};
use crate::filter::ChangeFilter;
use crate::signal::{ChangeSignal, WaitStatus};

/// Signal source for one directory, fed by a notify watcher.
///
/// Raw events are filtered and reduced to a single pending flag: while a
/// notification is waiting to be consumed, further events are absorbed into
/// it. This gives the same "something changed since you last looked"
/// semantics as a manual-reset OS change handle.
///
/// Removing the watched directory itself wakes the waiter once; after that
/// pending notification is consumed, waits report [`WaitStatus::Abandoned`].
pub struct NotifySignal {
    /// Internal notify watcher. `None` once closed.
    watcher: Option<RecommendedWatcher>,

    /// Pending notification latch.
    pending: mpsc::Receiver<notify::Result<()>>,

    /// Whether the next wait may consume a notification.
    armed: bool,

    /// Set by the notify callback once the watched directory is removed.
    root_removed: Arc<AtomicBool>,

    /// Watched directory.
    path: PathBuf,
}

impl NotifySignal {
    /// Register a watch on `path`. The returned source is armed.
    pub fn open(path: &Path, recursive: bool, filter: ChangeFilter) -> Result<Self> {
        let metadata =
            std::fs::metadata(path).map_err(|e| WatcherError::setup(path, notify::Error::io(e)))?;
        if !metadata.is_dir() {
            return Err(WatcherError::setup(
                path,
                notify::Error::generic("not a directory"),
            ));
        }

        let root = path.to_path_buf();
        let canonical_root = std::fs::canonicalize(path).unwrap_or_else(|_| root.clone());
        let root_removed = Arc::new(AtomicBool::new(false));
        let removed = root_removed.clone();

        let (tx, pending) = mpsc::channel(1);
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| {
                let raw = match res {
                    Ok(event)
                        if matches!(event.kind, EventKind::Remove(_))
                            && event
                                .paths
                                .iter()
                                .any(|p| *p == root || *p == canonical_root) =>
                    {
                        debug!("Watched directory {} was removed", root.display());
                        removed.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                    Ok(event) if filter.matches(event.kind) => Ok(()),
                    Ok(event) => {
                        trace!("Ignoring filtered change: {:?}", event.kind);
                        return;
                    }
                    Err(e) => Err(e),
                };

                match tx.try_send(raw) {
                    Ok(()) | Err(TrySendError::Full(Ok(()))) | Err(TrySendError::Closed(_)) => {}
                    Err(TrySendError::Full(Err(e))) => {
                        warn!("Dropping watch error while a change is pending: {e}");
                    }
                }
            },
        )
        .map_err(|e| WatcherError::setup(path, e))?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(path, mode)
            .map_err(|e| WatcherError::setup(path, e))?;

        debug!("Registered watch: {} ({mode:?})", path.display());

        Ok(Self {
            watcher: Some(watcher),
            pending,
            armed: true,
            root_removed,
            path: path.to_path_buf(),
        })
    }

    fn consume(&mut self, raw: notify::Result<()>) -> Result<WaitStatus> {
        match raw {
            Ok(()) => {
                self.armed = false;
                Ok(WaitStatus::Signaled)
            }
            Err(e) => Err(WatcherError::Wait(e.to_string())),
        }
    }
}

#[async_trait]
impl ChangeSignal for NotifySignal {
    fn arm(&mut self) -> Result<()> {
        if self.watcher.is_none() {
            return Err(WatcherError::UseAfterClose);
        }
        self.armed = true;
        Ok(())
    }

    async fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitStatus> {
        if self.watcher.is_none() {
            return Err(WatcherError::UseAfterClose);
        }
        if !self.armed {
            return Err(WatcherError::Wait(format!(
                "watch on {} is not armed",
                self.path.display()
            )));
        }

        if self.root_removed.load(Ordering::SeqCst) {
            return match self.pending.try_recv() {
                Ok(raw) => self.consume(raw),
                Err(_) => Ok(WaitStatus::Abandoned),
            };
        }

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.pending.recv()).await {
                Ok(received) => received,
                Err(_) => return Ok(WaitStatus::TimedOut),
            },
            None => self.pending.recv().await,
        };

        match received {
            Some(raw) => self.consume(raw),
            None => Ok(WaitStatus::Abandoned),
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut watcher) = self.watcher.take() else {
            return Err(WatcherError::UseAfterClose);
        };

        // The directory may already be gone, in which case the OS has
        // dropped the watch on its own.
        if let Err(e) = watcher.unwatch(&self.path) {
            debug!("Unwatch of {} failed: {e}", self.path.display());
        }
        self.pending.close();
        Ok(())
    }
}
