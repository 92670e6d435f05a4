//! Checks for watch roots living inside directories that other software
//! manages, such as cloud-synced folders.
//!
//! Nothing here logs. Callers get [`LocationDiagnostic`] values and decide
//! how to surface them.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variables that point at OneDrive roots on Windows.
const ONEDRIVE_VARS: [&str; 3] = ["OneDrive", "OneDriveConsumer", "OneDriveCommercial"];

/// How serious a location finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Watching works but is likely to be noisy or slow.
    Warning,

    /// The location must not be used.
    Error,
}

/// What kind of managed directory a root is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationKind {
    /// A folder kept in sync by a cloud storage client.
    CloudSynced { provider: String },

    /// A folder owned by another application.
    VendorManaged { name: String },
}

/// A directory that watched paths should stay out of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardedRoot {
    /// The managed directory.
    pub root: PathBuf,

    /// What manages it.
    #[serde(flatten)]
    pub kind: LocationKind,

    /// How to treat paths inside it.
    pub severity: Severity,
}

impl GuardedRoot {
    /// A cloud-synced root, reported as a warning.
    pub fn cloud_synced(root: impl Into<PathBuf>, provider: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            kind: LocationKind::CloudSynced {
                provider: provider.into(),
            },
            severity: Severity::Warning,
        }
    }

    /// A vendor-managed root, reported as an error.
    pub fn vendor_managed(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            kind: LocationKind::VendorManaged { name: name.into() },
            severity: Severity::Error,
        }
    }
}

/// A finding about one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDiagnostic {
    pub severity: Severity,
    pub kind: LocationKind,

    /// The checked path.
    pub path: PathBuf,

    /// The guarded root that contains it.
    pub root: PathBuf,
}

impl LocationDiagnostic {
    /// Check if this diagnostic should stop the caller.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// A human readable description.
    pub fn message(&self) -> String {
        match &self.kind {
            LocationKind::CloudSynced { provider } => format!(
                "{} is inside the {provider} directory {}; consider moving it outside of cloud-synced directories",
                self.path.display(),
                self.root.display()
            ),
            LocationKind::VendorManaged { name } => format!(
                "{} is inside the {name} directory {}",
                self.path.display(),
                self.root.display()
            ),
        }
    }
}

/// Whether `path` is `dir` or lies below it. Empty paths are never contained.
pub fn is_path_within(path: &Path, dir: &Path) -> bool {
    if path.as_os_str().is_empty() || dir.as_os_str().is_empty() {
        return false;
    }
    normalize(path).starts_with(normalize(dir))
}

/// Cloud sync roots announced through environment variables.
pub fn cloud_sync_roots_from_env() -> Vec<GuardedRoot> {
    cloud_sync_roots(|name| std::env::var(name).ok())
}

/// Cloud sync roots, reading variables through `lookup`.
pub fn cloud_sync_roots(lookup: impl Fn(&str) -> Option<String>) -> Vec<GuardedRoot> {
    ONEDRIVE_VARS
        .iter()
        .filter_map(|var| {
            lookup(var)
                .filter(|value| !value.is_empty())
                .map(|value| GuardedRoot::cloud_synced(value, *var))
        })
        .collect()
}

/// Report every guarded root that contains `path`, once per distinct root.
pub fn check_location(path: &Path, roots: &[GuardedRoot]) -> Vec<LocationDiagnostic> {
    let mut seen = HashSet::new();
    roots
        .iter()
        .filter(|guarded| is_path_within(path, &guarded.root))
        .filter(|guarded| seen.insert(normalize(&guarded.root)))
        .map(|guarded| LocationDiagnostic {
            severity: guarded.severity,
            kind: guarded.kind.clone(),
            path: path.to_path_buf(),
            root: guarded.root.clone(),
        })
        .collect()
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
