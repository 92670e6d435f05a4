//! Configuration types for directory watching.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};
use crate::filter::ChangeFilter;
use crate::location::GuardedRoot;

/// Group window used when neither the watch nor the set configures one.
pub const DEFAULT_GROUP_WINDOW_MS: u64 = 100;

/// Configuration for a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Path to the directory.
    pub path: PathBuf,

    /// Whether to watch subdirectories too.
    #[serde(default = "default_recursive")]
    pub recursive: bool,

    /// Which changes wake the watcher.
    #[serde(default)]
    pub filter: ChangeFilter,

    /// Group window override, in milliseconds.
    #[serde(default)]
    pub group_window_ms: Option<u64>,

    /// Label sent to the sink when this directory changes.
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_recursive() -> bool {
    true
}

fn default_group_window_ms() -> u64 {
    DEFAULT_GROUP_WINDOW_MS
}

impl WatchConfig {
    /// Create a new watch config.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recursive: true,
            filter: ChangeFilter::default(),
            group_window_ms: None,
            tag: None,
        }
    }

    /// Set the change filter.
    pub fn with_filter(mut self, filter: ChangeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Only watch the top level of the directory.
    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }

    /// Set the group window, in whole milliseconds.
    ///
    /// A non-zero window shorter than a millisecond rounds up to one, so it
    /// never turns into "no window".
    pub fn with_group_window(mut self, window: Duration) -> Self {
        let millis = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self.group_window_ms = Some(if millis == 0 && !window.is_zero() { 1 } else { millis });
        self
    }

    /// Set the tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// The effective group window, falling back to `default`.
    pub fn group_window(&self, default: Duration) -> Duration {
        self.group_window_ms
            .map(Duration::from_millis)
            .unwrap_or(default)
    }

    /// The configured tag, or the path when none is set.
    pub fn tag_or_path(&self) -> String {
        self.tag
            .clone()
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A set of watches sharing one sink, as read from a config file.
///
/// ```toml
/// group_window_ms = 100
///
/// [[watch]]
/// path = "src"
/// tag = "sources"
///
/// [[watch]]
/// path = "assets"
/// recursive = false
/// filter = { size = true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchSetConfig {
    /// Default group window in milliseconds.
    #[serde(default = "default_group_window_ms")]
    pub group_window_ms: u64,

    /// Watched directories.
    #[serde(default, rename = "watch")]
    pub watches: Vec<WatchConfig>,

    /// Directories watched paths should stay out of.
    #[serde(default)]
    pub guarded_roots: Vec<GuardedRoot>,
}

impl Default for WatchSetConfig {
    fn default() -> Self {
        Self {
            group_window_ms: DEFAULT_GROUP_WINDOW_MS,
            watches: Vec::new(),
            guarded_roots: Vec::new(),
        }
    }
}

impl WatchSetConfig {
    /// Parse a config from TOML text. Paths are taken as written.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file. Relative watch paths resolve against the file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;

        if let Some(base) = path.parent() {
            for watch in &mut config.watches {
                if watch.path.is_relative() {
                    watch.path = base.join(&watch.path);
                }
            }
        }
        Ok(config)
    }

    /// Add a watch.
    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watches.push(watch);
        self
    }

    /// The default group window.
    pub fn group_window(&self) -> Duration {
        Duration::from_millis(self.group_window_ms)
    }

    /// Check the set is usable before any watch is opened.
    pub fn validate(&self) -> Result<()> {
        if self.watches.is_empty() {
            return Err(WatcherError::Config(
                "no directories to watch".to_string(),
            ));
        }
        if self.group_window_ms == 0 {
            return Err(WatcherError::Config(
                "group_window_ms must be greater than zero".to_string(),
            ));
        }

        let mut tags = HashSet::new();
        for watch in &self.watches {
            if watch.group_window_ms == Some(0) {
                return Err(WatcherError::Config(format!(
                    "group_window_ms for {} must be greater than zero",
                    watch.path.display()
                )));
            }
            let tag = watch.tag_or_path();
            if !tags.insert(tag.clone()) {
                return Err(WatcherError::Config(format!("duplicate watch tag: {tag}")));
            }
        }
        Ok(())
    }
}
