//! Input shards: identity, discovery, and raw reads.
//!
//! A shard is one file in the input directory. Its file name is its identity
//! and names the outputs derived from it, so two runs over the same directory
//! map every shard to the same output paths.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    error::{ShardResult, StorageSnafu, TaskJoinSnafu},
    storage::{self, StorageLocation, StorageResult},
};

/// Extensions of files that live next to the data but are never shards
/// (scripts shipped alongside a processing job, editor leftovers, temp files).
const NON_DATA_EXTENSIONS: [&str; 8] = ["py", "pyc", "rs", "sh", "md", "txt", "tmp", "crc"];

/// Stable identity of a shard: its file name within the input directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    /// Wrap a file name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The file name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One input file of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    id: ShardId,
    location: StorageLocation,
    rel_path: PathBuf,
}

impl Shard {
    /// Build a shard for `rel_path` under `location`.
    ///
    /// Returns `None` when the path has no usable UTF-8 file name.
    pub fn new(location: StorageLocation, rel_path: impl Into<PathBuf>) -> Option<Self> {
        let rel_path = rel_path.into();
        let name = rel_path.file_name()?.to_str()?.to_string();
        Some(Self {
            id: ShardId(name),
            location,
            rel_path,
        })
    }

    /// The shard's identity.
    pub fn id(&self) -> &ShardId {
        &self.id
    }

    /// Absolute (or root-relative) path of the file.
    pub fn path(&self) -> PathBuf {
        self.location.join(&self.rel_path)
    }

    /// Path rendered for logs and error messages.
    pub fn display_path(&self) -> String {
        self.path().display().to_string()
    }

    /// Read the whole file into memory.
    pub async fn read_bytes(&self) -> ShardResult<Bytes> {
        let data = storage::read_all_bytes(&self.location, &self.rel_path)
            .await
            .context(StorageSnafu)?;
        Ok(Bytes::from(data))
    }
}

/// Whether a file name looks like a data shard rather than a sidecar artifact.
pub fn is_candidate_shard(file_name: &str) -> bool {
    if file_name.is_empty() || file_name.starts_with('.') || file_name.starts_with('_') {
        return false;
    }
    match Path::new(file_name).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => !NON_DATA_EXTENSIONS
            .iter()
            .any(|skip| ext.eq_ignore_ascii_case(skip)),
        None => true,
    }
}

/// Enumerate the candidate shards directly under `location`, sorted by name.
pub async fn discover_shards(location: &StorageLocation) -> StorageResult<Vec<Shard>> {
    let files = storage::list_files(location).await?;
    Ok(files
        .into_iter()
        .filter(|rel| {
            rel.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_candidate_shard)
        })
        .filter_map(|rel| Shard::new(location.clone(), rel))
        .collect())
}

/// Run CPU-bound shard work on the blocking pool.
///
/// A panic inside `work` is reported as [`ShardError::TaskJoin`] for this
/// shard only.
///
/// [`ShardError::TaskJoin`]: crate::error::ShardError::TaskJoin
pub(crate) async fn run_blocking<T, F>(path: &str, work: F) -> ShardResult<T>
where
    F: FnOnce() -> ShardResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context(TaskJoinSnafu { path })?
}
