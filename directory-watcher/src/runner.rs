//! Watch loops that feed grouped change tags into a shared channel.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WatchSetConfig;
use crate::error::Result;
use crate::signal::ChangeSignal;
use crate::watcher::{BurstEnd, DirectoryWatcher};

/// Report one tag per burst of changes until `cancel` fires or a wait fails.
///
/// The watcher is closed before this returns, whichever way it ends. A
/// failed wait is returned, never retried.
pub async fn run_watch_loop<S, T>(
    mut watcher: DirectoryWatcher<S>,
    window: Duration,
    sink: mpsc::Sender<T>,
    tag: T,
    cancel: CancellationToken,
) -> Result<()>
where
    S: ChangeSignal,
    T: Clone + Send,
{
    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            res = watcher.wait_for_change_group(window, &sink, tag.clone()) => match res {
                Ok(BurstEnd::Settled) => {}
                Ok(BurstEnd::Abandoned) => {
                    debug!("Burst in {} ended by abandoned source", watcher.path().display());
                }
                Err(e) => break Err(e),
            },
        }
    };

    let closed = watcher.close();
    match outcome {
        Ok(()) => closed,
        Err(e) => {
            error!("Watch loop for {} failed: {e}", watcher.path().display());
            if let Err(close_err) = closed {
                warn!(
                    "Failed to release watch on {}: {close_err}",
                    watcher.path().display()
                );
            }
            Err(e)
        }
    }
}

/// Several watch loops multiplexed onto one sink.
pub struct WatchSet<T> {
    /// Running loops, each yielding how it ended.
    tasks: JoinSet<Result<()>>,

    /// Tag of every loop not yet joined, so a panicked loop can still be named.
    tags: HashMap<Id, T>,

    /// Stops every loop in the set.
    cancel: CancellationToken,
}

impl<T> WatchSet<T>
where
    T: Clone + Send + 'static,
{
    /// Create an empty set whose loops stop when `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            tags: HashMap::new(),
            cancel,
        }
    }

    /// Start a watch loop for an already opened watcher.
    pub fn spawn<S>(
        &mut self,
        watcher: DirectoryWatcher<S>,
        window: Duration,
        sink: mpsc::Sender<T>,
        tag: T,
    ) where
        S: ChangeSignal + 'static,
    {
        let cancel = self.cancel.child_token();
        let handle = self
            .tasks
            .spawn(run_watch_loop(watcher, window, sink, tag.clone(), cancel));
        self.tags.insert(handle.id(), tag);
    }

    /// Number of loops still running or not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the set has no loops left.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every loop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the next loop to finish and report its tag and how it ended.
    ///
    /// A loop that panicked or was aborted ends with
    /// [`WatcherError::Task`](crate::WatcherError::Task).
    pub async fn join_next(&mut self) -> Option<(T, Result<()>)> {
        loop {
            let (id, result) = match self.tasks.join_next_with_id().await? {
                Ok(finished) => finished,
                Err(e) => (e.id(), Err(e.into())),
            };
            match self.tags.remove(&id) {
                Some(tag) => return Some((tag, result)),
                None => warn!("Joined watch task {id} with no tag"),
            }
        }
    }

    /// Cancel all loops and wait for them, returning the first failure.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel();
        let mut first_error = None;
        while let Some((_, result)) = self.join_next().await {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl WatchSet<String> {
    /// Open every watch in `config`, then start one loop per watch.
    ///
    /// All watches are opened before any loop starts, so a bad directory
    /// means nothing runs.
    pub fn from_config(
        config: &WatchSetConfig,
        sink: &mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let default_window = config.group_window();
        let watchers = config
            .watches
            .iter()
            .map(|watch| DirectoryWatcher::open_with(watch).map(|w| (watch, w)))
            .collect::<Result<Vec<_>>>()?;

        let mut set = Self::new(cancel);
        for (watch, watcher) in watchers {
            set.spawn(
                watcher,
                watch.group_window(default_window),
                sink.clone(),
                watch.tag_or_path(),
            );
        }
        info!("Started {} watch loop(s)", set.len());
        Ok(set)
    }
}
