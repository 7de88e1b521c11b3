//! Collaborators at the edge of the pipeline
//!
//! The analyzers never touch the file system directly. Content access, the
//! trash/version subsystem and the operation log are reached through the
//! traits below so the pipeline can run against any backend. A directory
//! backend ([`LocalStorage`]) and two operation logs ([`MemoryStore`],
//! [`JsonlStore`]) ship with the crate.

mod local;
mod store;

pub use local::LocalStorage;
pub use store::{JsonlStore, MemoryStore};

use crate::error::Result;
use crate::monitor::{FileKind, FileOperation};
use crate::recovery::RecoveryOutcome;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Seek};

/// The user a request is scoped to, passed explicitly to every component
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserContext {
    pub user_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Readable and seekable content stream
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Kind and size of a stored item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub size: u64,
}

/// One item of a storage snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    /// Path relative to the user's files root
    pub path: String,
    pub name: String,
    pub size: u64,
    /// Modification time, or deletion time for trashed items
    pub timestamp: i64,
}

/// Snapshot enumeration of a user's storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStructure {
    pub entries: Vec<StorageEntry>,
}

impl StorageStructure {
    /// Entries changed strictly after `since`
    pub fn changed_since(&self, since: i64) -> impl Iterator<Item = &StorageEntry> {
        self.entries.iter().filter(move |e| e.timestamp > since)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Byte-level access to a user's files
pub trait FileStorage: Send + Sync {
    /// Kind and size of the item an operation refers to
    fn stat(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<FileStat>;

    /// Content of the item an operation refers to; the trashed copy for deletions
    fn open(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<Box<dyn ReadSeek>>;

    /// Snapshot of the live files
    fn structure(&self, ctx: &UserContext) -> io::Result<StorageStructure>;

    /// Snapshot of the trash
    fn trash_structure(&self, ctx: &UserContext) -> io::Result<StorageStructure>;
}

/// Trash and version subsystem
pub trait Restorer: Send + Sync {
    /// Move a deleted item back to where it was; `Ok(false)` when nothing to restore
    fn restore_from_trash(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<bool>;

    /// Put back the content an overwrite replaced; `Ok(false)` when no version exists
    fn revert_to_version(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<bool>;
}

/// Answer to a recovery claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryClaim {
    /// The caller owns the recovery and must record its outcome
    Claimed,
    /// Recovered before
    Recorded(RecoveryOutcome),
    /// Claimed before but no outcome was recorded
    Pending,
}

/// Append-only log of classified operations
pub trait OperationStore: Send + Sync {
    /// Append an operation, assigning its id
    fn append(&self, ctx: &UserContext, op: FileOperation) -> Result<FileOperation>;

    fn find(&self, ctx: &UserContext, id: u64) -> Result<Option<FileOperation>>;

    fn operations(&self, ctx: &UserContext) -> Result<Vec<FileOperation>>;

    /// Timestamp of the newest recorded operation
    fn last_activity(&self, ctx: &UserContext) -> Result<Option<i64>> {
        Ok(self.operations(ctx)?.iter().map(|op| op.timestamp).max())
    }

    /// Highest sequence id used so far
    fn last_sequence(&self, ctx: &UserContext) -> Result<Option<u64>> {
        Ok(self.operations(ctx)?.iter().map(|op| op.sequence).max())
    }

    fn recovery_outcome(&self, ctx: &UserContext, id: u64) -> Result<Option<RecoveryOutcome>>;

    /// Claim an operation for recovery
    ///
    /// Checking for an earlier recovery and claiming the id happen under one
    /// lock, so at most one caller ever gets [`RecoveryClaim::Claimed`].
    fn begin_recovery(&self, ctx: &UserContext, id: u64) -> Result<RecoveryClaim>;

    fn record_recovery(&self, ctx: &UserContext, id: u64, outcome: RecoveryOutcome) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_since() {
        let structure = StorageStructure {
            entries: vec![
                StorageEntry {
                    path: "a.txt".to_string(),
                    name: "a.txt".to_string(),
                    size: 1,
                    timestamp: 100,
                },
                StorageEntry {
                    path: "b.txt".to_string(),
                    name: "b.txt".to_string(),
                    size: 1,
                    timestamp: 200,
                },
            ],
        };
        let changed: Vec<_> = structure.changed_since(100).map(|e| e.path.as_str()).collect();
        assert_eq!(changed, vec!["b.txt"]);
        assert!(StorageStructure::default().is_empty());
    }
}
