//! Reclaiming disk space from the shared cache root.
//!
//! The cleaner performs blocking file system I/O and is intended to run at
//! startup, at shutdown or on explicit request, never during evaluation.

use crate::cache::{key, read_last_access};
use std::{
    cmp::Reverse,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

const MB: u64 = 1024 * 1024;

/// A single cache entry discovered beneath the cache root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    /// The entry's directory.
    pub dir: PathBuf,
    /// The number of times the entry was successfully restored.
    pub reads: u64,
    /// The total size of the entry's files in bytes.
    pub size: u64,
    /// The time since the entry was last written or restored.
    pub age: Duration,
}

/// Tracks every entry beneath a cache root and deletes the least valuable.
#[derive(Debug)]
pub struct CacheCleaner {
    root: PathBuf,
    entries: Vec<CacheEntry>,
    grace: Duration,
    freed: u64,
    deleted: usize,
}

#[derive(Debug, Error)]
pub enum CleanerError {
    #[error("cache root {0:?} does not exist")]
    MissingRoot(PathBuf),
    #[error("failed to scan cache root {path:?}: {err}")]
    Scan {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
}

impl CacheCleaner {
    /// Scan the cache root for entries.
    ///
    /// Unreadable sub-directories are logged and skipped.
    pub fn initialize(root: impl Into<PathBuf>) -> Result<Self, CleanerError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CleanerError::MissingRoot(root));
        }
        let mut entries = vec![];
        scan(&root, &mut entries).map_err(|err| CleanerError::Scan {
            path: root.clone(),
            err,
        })?;
        entries.sort_by(|a, b| a.dir.cmp(&b.dir));
        let cleaner = CacheCleaner {
            root,
            entries,
            grace: Duration::ZERO,
            freed: 0,
            deleted: 0,
        };
        log::info!(
            "found {} cache entries in {:?}, total size: {:.2} MB",
            cleaner.entries.len(),
            cleaner.root,
            cleaner.size() as f64 / MB as f64,
        );
        Ok(cleaner)
    }

    /// Builder method for specifying how old an unread entry must be before
    /// [`CacheCleaner::delete_unused`] removes it.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The entries still tracked, ordered by directory.
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// The total size of all tracked entries in bytes.
    pub fn size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// The number of bytes freed by this cleaner so far.
    pub fn freed(&self) -> u64 {
        self.freed
    }

    /// The number of entries deleted by this cleaner so far.
    pub fn deleted(&self) -> usize {
        self.deleted
    }

    /// Delete every entry that was never restored and is older than the
    /// grace period. Returns the number of entries deleted.
    pub fn delete_unused(&mut self) -> usize {
        let grace = self.grace;
        let mut count = 0;
        let mut ix = self.entries.len();
        while ix > 0 {
            ix -= 1;
            let entry = &self.entries[ix];
            if entry.reads == 0 && entry.age >= grace {
                log::info!("deleting cache {:?} (never read)", entry.dir);
                if self.delete_entry(ix) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Delete entries until the tracked size fits within `max_mb` megabytes.
    ///
    /// Entries read fewer times go first. Among entries read equally often,
    /// the oldest goes first. Returns the number of entries deleted.
    pub fn limit_cache(&mut self, max_mb: u64) -> usize {
        let budget = max_mb.saturating_mul(MB);
        let mut order: Vec<&CacheEntry> = self.entries.iter().collect();
        order.sort_by_key(|e| (e.reads, Reverse(e.age)));
        let order: Vec<PathBuf> = order.into_iter().map(|e| e.dir.clone()).collect();

        let mut count = 0;
        for dir in order {
            if self.size() <= budget {
                break;
            }
            let Some(ix) = self.entries.iter().position(|e| e.dir == dir) else {
                continue;
            };
            log::info!("deleting cache {dir:?} (target cache size: {max_mb} MB)");
            if self.delete_entry(ix) {
                count += 1;
            }
        }
        if self.size() > budget {
            log::warn!(
                "cache remains above {max_mb} MB after deleting {count} entries"
            );
        }
        count
    }

    // Entries that fail to delete remain tracked.
    fn delete_entry(&mut self, ix: usize) -> bool {
        let dir = &self.entries[ix].dir;
        if let Err(e) = fs::remove_dir_all(dir) {
            log::error!("failed to delete cache {dir:?}: {e}");
            return false;
        }
        remove_empty_parents(dir, &self.root);
        let entry = self.entries.remove(ix);
        self.freed += entry.size;
        self.deleted += 1;
        true
    }
}

impl Drop for CacheCleaner {
    fn drop(&mut self) {
        if self.deleted > 0 {
            log::info!(
                "cache cleanup: deleted {} entries ({:.2} MB)",
                self.deleted,
                self.freed as f64 / MB as f64,
            );
        }
    }
}

fn scan(dir: &Path, entries: &mut Vec<CacheEntry>) -> io::Result<()> {
    for item in fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        let file_type = item.file_type()?;
        if file_type.is_dir() {
            if let Err(e) = scan(&path, entries) {
                log::warn!("failed to scan {path:?}: {e}");
            }
        } else if item.file_name() == key::LAST_ACCESS {
            let age = item
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .unwrap_or_default();
            entries.push(CacheEntry {
                reads: read_last_access(dir),
                size: dir_size(dir),
                age,
                dir: dir.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn dir_size(dir: &Path) -> u64 {
    let Ok(items) = fs::read_dir(dir) else {
        return 0;
    };
    items
        .filter_map(Result::ok)
        .map(|item| match item.file_type() {
            Ok(t) if t.is_dir() => dir_size(&item.path()),
            _ => item.metadata().map(|m| m.len()).unwrap_or(0),
        })
        .sum()
}

/// Remove each ancestor of `dir` left empty, stopping at `root`.
fn remove_empty_parents(dir: &Path, root: &Path) {
    let mut parent = dir.parent();
    while let Some(p) = parent {
        if p == root || !p.starts_with(root) {
            break;
        }
        let is_empty = fs::read_dir(p).is_ok_and(|mut items| items.next().is_none());
        if !is_empty || fs::remove_dir(p).is_err() {
            break;
        }
        log::debug!("deleted empty cache directory {p:?}");
        parent = p.parent();
    }
}
