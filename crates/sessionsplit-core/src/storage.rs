//! Local filesystem access for input shards and pipeline outputs.
//!
//! Every path the pipeline touches is expressed as a [`StorageLocation`] root
//! plus a relative path, so the input directory and the output directory are
//! handled by the same small set of helpers:
//!
//! - whole-file reads for shards (Parquet readers want the full buffer),
//! - directory listing for shard discovery,
//! - write-then-rename for the run report, with `TempFileGuard` shared by
//!   the partition writer.

use std::{
    io,
    path::{Path, PathBuf},
};

use snafu::{Backtrace, prelude::*};
use tokio::{fs, io::AsyncWriteExt};

/// Errors raised while touching the input or output directory.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The path does not exist.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Any other filesystem failure.
    #[snafu(display("I/O error at {path}: {source}"))]
    Io {
        /// The path where the error occurred.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root directory the pipeline reads from or writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageLocation {
    root: PathBuf,
}

impl StorageLocation {
    /// Creates a new `StorageLocation` rooted at a local directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `rel_path` against this root.
    pub fn join(&self, rel_path: &Path) -> PathBuf {
        self.root.join(rel_path)
    }

    /// The root directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub(crate) async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .context(IoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Guard that removes a temporary file on drop unless disarmed.
pub(crate) struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Call after a successful rename.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best effort; the caller is already reporting the real error.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Create `rel_path` (and any missing parents) under `location`.
pub async fn create_dir_all(location: &StorageLocation, rel_path: &Path) -> StorageResult<()> {
    let abs = location.join(rel_path);
    fs::create_dir_all(&abs)
        .await
        .context(IoSnafu {
            path: abs.display().to_string(),
        })
}

/// Write `contents` to `rel_path` inside `location` using write-then-rename.
///
/// The payload goes to a sibling `.tmp` file which is synced and then renamed
/// over the target, so readers never observe a partially written file and an
/// existing file is replaced rather than appended to.
pub async fn write_atomic(
    location: &StorageLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = location.join(rel_path);
    create_parent_dir(&abs).await?;

    let tmp_path = abs.with_extension("tmp");
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = fs::File::create(&tmp_path)
            .await
            .context(IoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.write_all(contents)
            .await
            .context(IoSnafu {
                path: tmp_path.display().to_string(),
            })?;

        file.sync_all()
            .await
            .context(IoSnafu {
                path: tmp_path.display().to_string(),
            })?;
    }

    fs::rename(&tmp_path, &abs)
        .await
        .context(IoSnafu {
            path: abs.display().to_string(),
        })?;

    guard.disarm();
    Ok(())
}

/// Read the full contents of the file at `rel_path` within `location`.
///
/// Errors:
/// - If the file does not exist this returns `StorageError::NotFound`.
/// - On any other I/O error this returns `StorageError::Io`.
pub async fn read_all_bytes(location: &StorageLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let abs = location.join(rel_path);
    let path_str = abs.display().to_string();

    match fs::read(&abs).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(e).context(NotFoundSnafu { path: path_str })
        }
        Err(e) => Err(e).context(IoSnafu { path: path_str }),
    }
}

/// Remove the file at `rel_path` within `location`, if there is one.
///
/// Returns whether a file was removed.
pub async fn remove_file_if_exists(location: &StorageLocation, rel_path: &Path) -> StorageResult<bool> {
    let abs = location.join(rel_path);
    match fs::remove_file(&abs).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(IoSnafu {
            path: abs.display().to_string(),
        }),
    }
}

/// List the regular files directly under `location`, as paths relative to it.
///
/// Symlinks are followed; directories and other special files are left out.
/// The result is sorted by file name so callers see a stable order.
pub async fn list_files(location: &StorageLocation) -> StorageResult<Vec<PathBuf>> {
    let root = location.root();
    let root_str = root.display().to_string();

    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(e).context(NotFoundSnafu { path: root_str });
        }
        Err(e) => return Err(e).context(IoSnafu { path: root_str }),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .context(IoSnafu {
            path: root_str.clone(),
        })?
    {
        let abs = entry.path();
        // A dangling symlink has no metadata; it cannot be a readable shard.
        let Ok(meta) = fs::metadata(&abs).await else {
            continue;
        };
        if meta.is_file() {
            files.push(PathBuf::from(entry.file_name()));
        }
    }

    files.sort();
    Ok(files)
}
