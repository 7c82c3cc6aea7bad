//! Snapshot persistence: at most one stored page per poll target.
//!
//! Stores only ever replace a snapshot wholesale; there is no merging and
//! no history.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::bsky::FeedSnapshot;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stored snapshot at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Keyed by poll target.  Implementations must be safe to share between
/// the per-target tasks.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, target: &str) -> Result<Option<FeedSnapshot>, StoreError>;
    fn store(&self, target: &str, snapshot: &FeedSnapshot) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use memory::MemoryStore;


// ---------------------------------------------------------------------------
// JSON files on disk
// ---------------------------------------------------------------------------

/// One `<target>.json` file per target inside `dir`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, target: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(target)))
    }
}

/// Map a target key to a safe file name: anything outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub(crate) fn file_stem(target: &str) -> String {
    target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `bytes` to `path` via a sibling temp file and a rename, creating
/// the parent directory if needed.  Readers never see a half-written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err(dir))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

impl SnapshotStore for FileStore {
    fn load(&self, target: &str) -> Result<Option<FeedSnapshot>, StoreError> {
        let path = self.path_for(target);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path)(e)),
        };
        let snapshot = serde_json::from_str(&content)
            .map_err(|source| StoreError::Corrupt { path, source })?;
        Ok(Some(snapshot))
    }

    fn store(&self, target: &str, snapshot: &FeedSnapshot) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path_for(target), &encoded)
    }
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Reads through to `inner`, drops every write.
pub struct DryRunStore<S> {
    inner: S,
}

impl<S: SnapshotStore> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: SnapshotStore> SnapshotStore for DryRunStore<S> {
    fn load(&self, target: &str) -> Result<Option<FeedSnapshot>, StoreError> {
        self.inner.load(target)
    }

    fn store(&self, target: &str, snapshot: &FeedSnapshot) -> Result<(), StoreError> {
        tracing::info!(user = target, items = snapshot.feed.len(), "dry run: snapshot not stored");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
