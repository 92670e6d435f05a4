//! Change categories a watch reacts to.
//!
//! The defaults follow what a rebuild loop cares about: names appearing,
//! disappearing or moving, and content being written. Pure metadata churn
//! (access times, attribute bits, ownership) is filtered out before it can
//! wake a waiter.

use notify::EventKind;
use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind};
use serde::{Deserialize, Serialize};

/// One category of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    /// A file was added, removed or renamed.
    FileName,
    /// A directory was added, removed or renamed.
    DirName,
    /// Attribute bits or extended attributes changed.
    Attributes,
    /// A file's size changed without a content write being reported.
    Size,
    /// File content or its last-write time changed.
    LastWrite,
    /// A file was read, opened or closed, or its access time changed.
    LastAccess,
    /// A new entry was created.
    Creation,
    /// Permissions or ownership changed.
    Security,
}

/// The set of change categories a watch reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeFilter {
    pub file_name: bool,
    pub dir_name: bool,
    pub attributes: bool,
    pub size: bool,
    pub last_write: bool,
    pub last_access: bool,
    pub creation: bool,
    pub security: bool,
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self {
            file_name: true,
            dir_name: true,
            attributes: false,
            size: false,
            last_write: true,
            last_access: false,
            creation: true,
            security: false,
        }
    }
}

impl ChangeFilter {
    /// A filter that reacts to nothing.
    pub fn none() -> Self {
        Self {
            file_name: false,
            dir_name: false,
            attributes: false,
            size: false,
            last_write: false,
            last_access: false,
            creation: false,
            security: false,
        }
    }

    /// A filter that reacts to every category.
    pub fn all() -> Self {
        Self {
            file_name: true,
            dir_name: true,
            attributes: true,
            size: true,
            last_write: true,
            last_access: true,
            creation: true,
            security: true,
        }
    }

    /// Add a category.
    pub fn with(mut self, category: ChangeCategory) -> Self {
        *self.slot(category) = true;
        self
    }

    /// Remove a category.
    pub fn without(mut self, category: ChangeCategory) -> Self {
        *self.slot(category) = false;
        self
    }

    /// Check whether a category is part of the filter.
    pub fn contains(&self, category: ChangeCategory) -> bool {
        match category {
            ChangeCategory::FileName => self.file_name,
            ChangeCategory::DirName => self.dir_name,
            ChangeCategory::Attributes => self.attributes,
            ChangeCategory::Size => self.size,
            ChangeCategory::LastWrite => self.last_write,
            ChangeCategory::LastAccess => self.last_access,
            ChangeCategory::Creation => self.creation,
            ChangeCategory::Security => self.security,
        }
    }

    /// Whether no category is selected.
    pub fn is_empty(&self) -> bool {
        *self == Self::none()
    }

    /// Decide whether a raw notify event should wake a waiter.
    ///
    /// Kinds the backend could not classify (`Any`, `Other`, which also
    /// covers rescan requests) pass any non-empty filter, since dropping them
    /// could hide a real change.
    pub fn matches(&self, kind: EventKind) -> bool {
        let names = self.file_name || self.dir_name;
        match kind {
            EventKind::Create(CreateKind::File) => self.file_name || self.creation,
            EventKind::Create(CreateKind::Folder) => self.dir_name || self.creation,
            EventKind::Create(_) => names || self.creation,
            EventKind::Remove(RemoveKind::File) => self.file_name,
            EventKind::Remove(RemoveKind::Folder) => self.dir_name,
            EventKind::Remove(_) => names,
            EventKind::Modify(ModifyKind::Name(_)) => names,
            EventKind::Modify(ModifyKind::Data(DataChange::Size)) => self.size,
            EventKind::Modify(ModifyKind::Data(_)) => self.last_write,
            EventKind::Modify(ModifyKind::Metadata(meta)) => match meta {
                MetadataKind::WriteTime => self.last_write,
                MetadataKind::AccessTime => self.last_access,
                MetadataKind::Permissions | MetadataKind::Ownership => self.security,
                // inotify reports `touch` (atime + mtime) only as IN_ATTRIB.
                MetadataKind::Any => self.last_write || self.attributes,
                _ => self.attributes,
            },
            EventKind::Modify(_) => self.last_write,
            EventKind::Access(_) => self.last_access,
            EventKind::Any | EventKind::Other => !self.is_empty(),
        }
    }

    fn slot(&mut self, category: ChangeCategory) -> &mut bool {
        match category {
            ChangeCategory::FileName => &mut self.file_name,
            ChangeCategory::DirName => &mut self.dir_name,
            ChangeCategory::Attributes => &mut self.attributes,
            ChangeCategory::Size => &mut self.size,
            ChangeCategory::LastWrite => &mut self.last_write,
            ChangeCategory::LastAccess => &mut self.last_access,
            ChangeCategory::Creation => &mut self.creation,
            ChangeCategory::Security => &mut self.security,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, AccessMode, RenameMode};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_filter_categories() {
        let filter = ChangeFilter::default();

        assert!(filter.contains(ChangeCategory::FileName));
        assert!(filter.contains(ChangeCategory::DirName));
        assert!(filter.contains(ChangeCategory::LastWrite));
        assert!(filter.contains(ChangeCategory::Creation));
        assert!(!filter.contains(ChangeCategory::LastAccess));
        assert!(!filter.contains(ChangeCategory::Attributes));
        assert!(!filter.contains(ChangeCategory::Size));
        assert!(!filter.contains(ChangeCategory::Security));
    }

    #[test]
    fn test_default_filter_passes_names_and_writes() {
        let filter = ChangeFilter::default();

        assert!(filter.matches(EventKind::Create(CreateKind::File)));
        assert!(filter.matches(EventKind::Remove(RemoveKind::Folder)));
        assert!(filter.matches(EventKind::Modify(ModifyKind::Name(RenameMode::Both))));
        assert!(filter.matches(EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(filter.matches(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::WriteTime
        ))));
    }

    #[test]
    fn test_default_filter_drops_metadata_noise() {
        let filter = ChangeFilter::default();

        assert!(!filter.matches(EventKind::Access(AccessKind::Close(AccessMode::Write))));
        assert!(!filter.matches(EventKind::Access(AccessKind::Read)));
        assert!(!filter.matches(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::AccessTime
        ))));
        assert!(!filter.matches(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions
        ))));
        assert!(!filter.matches(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Extended
        ))));
        assert!(!filter.matches(EventKind::Modify(ModifyKind::Data(DataChange::Size))));
    }

    #[test]
    fn test_unspecified_metadata_change_may_be_a_write() {
        let touched = EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any));

        assert!(ChangeFilter::default().matches(touched));
        assert!(ChangeFilter::none().with(ChangeCategory::Attributes).matches(touched));
        assert!(!ChangeFilter::default().without(ChangeCategory::LastWrite).matches(touched));
    }

    #[test]
    fn test_unclassified_kinds_need_a_non_empty_filter() {
        assert!(ChangeFilter::default().matches(EventKind::Any));
        assert!(ChangeFilter::default().matches(EventKind::Other));
        assert!(!ChangeFilter::none().matches(EventKind::Any));
    }

    #[test]
    fn test_file_only_filter_ignores_directories() {
        let filter = ChangeFilter::none().with(ChangeCategory::FileName);

        assert!(filter.matches(EventKind::Create(CreateKind::File)));
        assert!(!filter.matches(EventKind::Create(CreateKind::Folder)));
        assert!(!filter.matches(EventKind::Remove(RemoveKind::Folder)));
    }

    #[test]
    fn test_with_and_without() {
        let filter = ChangeFilter::default()
            .with(ChangeCategory::Security)
            .without(ChangeCategory::Creation);

        assert!(filter.security);
        assert!(!filter.creation);
        assert!(ChangeFilter::none().is_empty());
        assert_eq!(
            ChangeFilter::none().with(ChangeCategory::Size),
            ChangeFilter {
                size: true,
                ..ChangeFilter::none()
            }
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let filter: ChangeFilter = toml::from_str("attributes = true\ncreation = false").unwrap();

        assert!(filter.attributes);
        assert!(!filter.creation);
        assert!(filter.file_name);
        assert!(filter.last_write);
    }
}
