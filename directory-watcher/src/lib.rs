//! # Directory Watcher
//!
//! This crate turns coarse "something changed in this directory"
//! notifications into a debounced stream suitable for driving a
//! watch-and-rebuild loop.
//!
//! ## Features
//!
//! - **Signal-only Waits**: Block a task until any change happens
//! - **Grouped Events**: Report a burst of changes once, immediately
//! - **Change Filters**: Ignore access-time and attribute churn
//! - **Watch Loops**: Multiplex several directories onto one channel
//! - **Location Checks**: Flag watch roots inside cloud-synced folders
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchConfig ──► DirectoryWatcher ──► mpsc::Sender<Tag>        │
//! │       │                │                   ▲                    │
//! │       ▼                ▼                   │                    │
//! │  ChangeFilter    ChangeSignal ◄── NotifySignal    WatchSet      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod location;
pub mod notify_signal;
pub mod runner;
pub mod signal;
pub mod watcher;

pub use config::{DEFAULT_GROUP_WINDOW_MS, WatchConfig, WatchSetConfig};
pub use error::{Result, WatcherError};
pub use filter::{ChangeCategory, ChangeFilter};
pub use location::{GuardedRoot, LocationDiagnostic, LocationKind, Severity, check_location};
pub use notify_signal::NotifySignal;
pub use runner::{WatchSet, run_watch_loop};
pub use signal::{ChangeSignal, WaitStatus};
pub use watcher::{BurstEnd, DirectoryWatcher, Wake, WatchState};
