//! Directory tree backend
//!
//! Layout per user, relative to the configured root:
//!
//! ```text
//! <user>/<files_dir>/<path>                 live files
//! <user>/<trash_dir>/<path>.d<timestamp>    deleted items
//! <user>/<versions_dir>/<path>.v<timestamp> prior versions
//! ```
//!
//! The trash mirrors the folders items were deleted from. Deleted folders
//! keep their content below the stamped folder.

use super::{FileStat, FileStorage, ReadSeek, Restorer, StorageEntry, StorageStructure, UserContext};
use crate::config::StorageConfig;
use crate::monitor::{Command, FileKind, FileOperation};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File system backed storage with trash and version folders
#[derive(Debug, Clone)]
pub struct LocalStorage {
    config: StorageConfig,
}

impl LocalStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn user_root(&self, ctx: &UserContext) -> io::Result<PathBuf> {
        join_relative(&self.config.root, &ctx.user_id)
    }

    fn files_root(&self, ctx: &UserContext) -> io::Result<PathBuf> {
        join_relative(&self.user_root(ctx)?, &self.config.files_dir)
    }

    fn trash_root(&self, ctx: &UserContext) -> io::Result<PathBuf> {
        join_relative(&self.user_root(ctx)?, &self.config.trash_dir)
    }

    fn versions_root(&self, ctx: &UserContext) -> io::Result<PathBuf> {
        join_relative(&self.user_root(ctx)?, &self.config.versions_dir)
    }

    /// Live location of a storage-relative path
    pub fn live_path(&self, ctx: &UserContext, path: &str) -> io::Result<PathBuf> {
        join_relative(&self.files_root(ctx)?, path)
    }

    /// Trashed copy of a deleted item
    ///
    /// Looks in the folder the item was deleted from, then at the top of the
    /// trash. The deletion stamp may differ from the event time by at most
    /// `trash_skew_secs`; anything further off belongs to another deletion.
    fn trashed_path(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<PathBuf> {
        let trash = self.trash_root(ctx)?;
        let name = op.original_name.as_str();
        let folder = join_relative(&trash, parent_dir(&op.path))?;

        let mut dirs = vec![folder];
        if dirs[0] != trash {
            dirs.push(trash);
        }

        for dir in &dirs {
            let exact = join_relative(dir, &format!("{}.d{}", name, op.timestamp))?;
            if exact.exists() {
                return Ok(exact);
            }

            let closest = stamped_siblings(dir, name, ".d")?
                .into_iter()
                .filter(|(ts, _)| ts.abs_diff(op.timestamp) <= self.config.trash_skew_secs)
                .min_by_key(|(ts, _)| ts.abs_diff(op.timestamp));
            if let Some((stamp, path)) = closest {
                debug!("{} deleted at {} matched trash stamp {}", op.path, op.timestamp, stamp);
                return Ok(path);
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} deleted at {} is not in the trash", op.path, op.timestamp),
        ))
    }

    fn content_path(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<PathBuf> {
        match op.command {
            Command::Delete => self.trashed_path(ctx, op),
            _ => self.live_path(ctx, &op.path),
        }
    }
}

impl FileStorage for LocalStorage {
    fn stat(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<FileStat> {
        let metadata = fs::metadata(self.content_path(ctx, op)?)?;
        Ok(FileStat {
            kind: if metadata.is_dir() {
                FileKind::Folder
            } else {
                FileKind::File
            },
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        })
    }

    fn open(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<Box<dyn ReadSeek>> {
        let file = fs::File::open(self.content_path(ctx, op)?)?;
        Ok(Box::new(file))
    }

    fn structure(&self, ctx: &UserContext) -> io::Result<StorageStructure> {
        let root = self.files_root(ctx)?;
        if !root.is_dir() {
            return Ok(StorageStructure::default());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", root, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry.metadata().map_err(io::Error::other)?;
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(io::Error::other)?;
            entries.push(StorageEntry {
                path: slash_path(relative),
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                timestamp: modified_secs(&metadata),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(StorageStructure { entries })
    }

    fn trash_structure(&self, ctx: &UserContext) -> io::Result<StorageStructure> {
        let root = self.trash_root(ctx)?;
        if !root.is_dir() {
            return Ok(StorageStructure::default());
        }

        let mut entries = Vec::new();
        let mut walker = WalkDir::new(&root).min_depth(1).follow_links(false).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable trash entry under {:?}: {}", root, e);
                    continue;
                }
            };
            let is_dir = entry.file_type().is_dir();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some((name, deleted_at)) = split_stamp(&file_name, ".d") else {
                // Unstamped folders only mirror where items were deleted from
                if !is_dir {
                    debug!("Ignoring trash item without deletion stamp: {:?}", entry.path());
                }
                continue;
            };
            if is_dir {
                walker.skip_current_dir();
            }

            let folder = entry
                .path()
                .parent()
                .and_then(|p| p.strip_prefix(&root).ok())
                .map(slash_path)
                .unwrap_or_default();
            let metadata = entry.metadata().map_err(io::Error::other)?;
            entries.push(StorageEntry {
                path: if folder.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", folder, name)
                },
                name: name.to_string(),
                size: if is_dir { 0 } else { metadata.len() },
                timestamp: deleted_at,
            });
        }

        entries.sort_by(|a, b| (a.timestamp, &a.path).cmp(&(b.timestamp, &b.path)));
        Ok(StorageStructure { entries })
    }
}

impl Restorer for LocalStorage {
    fn restore_from_trash(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<bool> {
        let source = match self.trashed_path(ctx, op) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Nothing to restore for {}: {}", op.path, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let target = self.live_path(ctx, &op.path)?;
        if target.exists() {
            warn!("Refusing to restore over existing {:?}", target);
            return Ok(false);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source, &target)?;

        info!("Restored {:?} from trash to {:?}", source, target);
        Ok(true)
    }

    fn revert_to_version(&self, ctx: &UserContext, op: &FileOperation) -> io::Result<bool> {
        let version_base = join_relative(&self.versions_root(ctx)?, &op.path)?;
        let (Some(dir), Some(name)) = (version_base.parent(), version_base.file_name()) else {
            return Ok(false);
        };
        let name = name.to_string_lossy();

        let version = stamped_siblings(dir, &name, ".v")?
            .into_iter()
            .filter(|(ts, _)| *ts <= op.timestamp)
            .max_by_key(|(ts, _)| *ts);

        let Some((stamp, source)) = version else {
            warn!("No version of {} from before {}", op.path, op.timestamp);
            return Ok(false);
        };

        let target = self.live_path(ctx, &op.path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, &target)?;

        info!("Reverted {} to version {}", op.path, stamp);
        Ok(true)
    }
}

/// Join a relative path below `base`, rejecting anything that would escape it
fn join_relative(base: &Path, relative: &str) -> io::Result<PathBuf> {
    let mut joined = base.to_path_buf();
    for component in Path::new(relative.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path {:?} escapes the storage root", relative),
                ))
            }
        }
    }
    Ok(joined)
}

/// Folder part of a storage-relative path, empty at the top level
fn parent_dir(path: &str) -> &str {
    path.trim_start_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("")
}

/// Split `<name><marker><timestamp>` into its parts
fn split_stamp<'a>(file_name: &'a str, marker: &str) -> Option<(&'a str, i64)> {
    let idx = file_name.rfind(marker)?;
    let stamp = file_name[idx + marker.len()..].parse().ok()?;
    let name = &file_name[..idx];
    (!name.is_empty()).then_some((name, stamp))
}

/// Entries of `dir` named `<name><marker><timestamp>`
fn stamped_siblings(dir: &Path, name: &str, marker: &str) -> io::Result<Vec<(i64, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some((base, stamp)) = split_stamp(&file_name, marker) {
            if base == name {
                found.push((stamp, entry.path()));
            }
        }
    }
    Ok(found)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn modified_secs(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
