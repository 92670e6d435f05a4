//! Error types for the directory watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the directory watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Registering the watch failed (missing path, not a directory, OS limits).
    #[error("failed to watch {}: {source}", .path.display())]
    WatchSetup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The wait itself failed, or the notification source is gone.
    #[error("wait for change failed: {0}")]
    Wait(String),

    /// A wait or close was attempted on a handle that is already closed.
    #[error("watch handle used after close")]
    UseAfterClose,

    /// Channel send error.
    #[error("channel error: failed to send event")]
    ChannelSend,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse error.
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A watch loop task panicked or was aborted.
    #[error("watch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl WatcherError {
    pub(crate) fn setup(path: impl Into<PathBuf>, source: notify::Error) -> Self {
        let path = path.into();
        Self::WatchSetup {
            source: source.add_path(path.clone()),
            path,
        }
    }

    /// Whether the error means the handle was already closed.
    pub fn is_use_after_close(&self) -> bool {
        matches!(self, Self::UseAfterClose)
    }
}
