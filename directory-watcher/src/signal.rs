//! The payload-free notification primitive a watcher is built on.
//!
//! A [`ChangeSignal`] only says "something changed". After it fires it stays
//! disarmed until [`ChangeSignal::arm`] is called again; waiting on a
//! disarmed source is an error rather than a silent hang.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Outcome of a single wait on a [`ChangeSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// A change was reported. The source is now disarmed.
    Signaled,

    /// The timeout elapsed with no change.
    TimedOut,

    /// The source stopped producing notifications and never will again.
    Abandoned,
}

/// Platform seam for "tell me something changed" notifications.
#[async_trait]
pub trait ChangeSignal: Send {
    /// Resume delivering notifications after a signal.
    fn arm(&mut self) -> Result<()>;

    /// Wait for the next notification. `None` waits without a time limit.
    ///
    /// Implementations must be cancel-safe: dropping the returned future
    /// must not consume a notification.
    async fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitStatus>;

    /// Release the underlying OS resource.
    fn close(&mut self) -> Result<()>;
}
