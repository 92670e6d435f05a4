//! Directory watcher implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::error::{Result, WatcherError};
use crate::filter::ChangeFilter;
use crate::notify_signal::NotifySignal;
use crate::signal::{ChangeSignal, WaitStatus};

/// Lifecycle state of a [`DirectoryWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Waiting is allowed; the next change will be reported.
    Armed,

    /// A change was just reported and the source has not been re-armed.
    Signaled,

    /// Terminal. Every further operation fails with `UseAfterClose`.
    Closed,
}

/// How a grouped wait finished after delivering its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstEnd {
    /// The group window elapsed with no further change.
    Settled,

    /// The signal source went away during the drain.
    Abandoned,
}

/// Result of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A change was reported.
    Changed,

    /// The cancellation token fired first.
    Cancelled,
}

/// Watches one directory and reports that *something* changed in it.
///
/// The watcher owns its signal source exclusively. Waits take `&mut self`, so
/// a handle can only ever have one waiter.
pub struct DirectoryWatcher<S: ChangeSignal = NotifySignal> {
    /// Watched directory.
    path: PathBuf,

    /// Underlying signal source.
    signal: S,

    /// Current lifecycle state.
    state: WatchState,
}

impl DirectoryWatcher<NotifySignal> {
    /// Watch `path` recursively with the default change filter.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let signal = NotifySignal::open(path, true, ChangeFilter::default())?;
        info!("Watching directory: {}", path.display());
        Ok(Self::with_signal(path, signal))
    }

    /// Watch the directory described by `config`.
    pub fn open_with(config: &WatchConfig) -> Result<Self> {
        let signal = NotifySignal::open(&config.path, config.recursive, config.filter.clone())?;
        info!(
            "Watching directory: {} (recursive: {})",
            config.path.display(),
            config.recursive
        );
        Ok(Self::with_signal(&config.path, signal))
    }
}

impl<S: ChangeSignal> DirectoryWatcher<S> {
    /// Wrap an already armed signal source.
    pub fn with_signal(path: impl Into<PathBuf>, signal: S) -> Self {
        Self {
            path: path.into(),
            signal,
            state: WatchState::Armed,
        }
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Check if the watcher has been closed.
    pub fn is_closed(&self) -> bool {
        self.state == WatchState::Closed
    }

    /// Wait until the next raw change, then re-arm.
    ///
    /// Returns once per raw signal. A single logical edit often produces
    /// several; use [`wait_for_change_group`](Self::wait_for_change_group)
    /// to report those as one.
    pub async fn wait_for_change(&mut self) -> Result<()> {
        match self.wait_raw(None).await? {
            WaitStatus::Signaled => Ok(()),
            WaitStatus::Abandoned => Err(WatcherError::Wait(format!(
                "change notifications for {} were abandoned",
                self.path.display()
            ))),
            WaitStatus::TimedOut => Err(WatcherError::Wait(format!(
                "unbounded wait on {} timed out",
                self.path.display()
            ))),
        }
    }

    /// Like [`wait_for_change`](Self::wait_for_change), but gives up when
    /// `cancel` fires.
    pub async fn wait_for_change_or_cancel(&mut self, cancel: &CancellationToken) -> Result<Wake> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Wake::Cancelled),
            res = self.wait_for_change() => res.map(|()| Wake::Changed),
        }
    }

    /// Wait for a burst of changes and report it once.
    ///
    /// Sends `tag` to `sink` as soon as the first change arrives, then keeps
    /// consuming changes until `window` passes without one. The window
    /// restarts after every consumed change. The send is not undone if the
    /// drain later fails.
    pub async fn wait_for_change_group<T: Send>(
        &mut self,
        window: Duration,
        sink: &mpsc::Sender<T>,
        tag: T,
    ) -> Result<BurstEnd> {
        self.wait_for_change().await?;
        sink.send(tag)
            .await
            .map_err(|_| WatcherError::ChannelSend)?;

        let mut drained = 0usize;
        loop {
            match self.wait_raw(Some(window)).await? {
                WaitStatus::Signaled => drained += 1,
                WaitStatus::TimedOut => {
                    debug!(
                        "Change burst in {} settled ({drained} grouped)",
                        self.path.display()
                    );
                    return Ok(BurstEnd::Settled);
                }
                WaitStatus::Abandoned => {
                    debug!(
                        "Change notifications for {} abandoned during burst",
                        self.path.display()
                    );
                    return Ok(BurstEnd::Abandoned);
                }
            }
        }
    }

    /// Release the signal source. Closing is terminal.
    pub fn close(&mut self) -> Result<()> {
        if self.state == WatchState::Closed {
            return Err(WatcherError::UseAfterClose);
        }
        self.state = WatchState::Closed;
        self.signal.close()?;
        info!("Stopped watching directory: {}", self.path.display());
        Ok(())
    }

    async fn wait_raw(&mut self, timeout: Option<Duration>) -> Result<WaitStatus> {
        match self.state {
            WatchState::Closed => return Err(WatcherError::UseAfterClose),
            // A previous re-arm failed; try again before waiting.
            WatchState::Signaled => self.rearm()?,
            WatchState::Armed => {}
        }

        let status = self.signal.wait(timeout).await?;
        if status == WaitStatus::Signaled {
            self.state = WatchState::Signaled;
            debug!("Change signaled in {}", self.path.display());
            self.rearm()?;
        }
        Ok(status)
    }

    fn rearm(&mut self) -> Result<()> {
        self.signal.arm()?;
        self.state = WatchState::Armed;
        Ok(())
    }
}

impl<S: ChangeSignal> Drop for DirectoryWatcher<S> {
    fn drop(&mut self) {
        if self.state != WatchState::Closed {
            if let Err(e) = self.close() {
                warn!("Failed to release watch on {}: {e}", self.path.display());
            }
        }
    }
}
