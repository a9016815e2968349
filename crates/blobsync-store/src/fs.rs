use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use blobsync_types::Meta;
use bytes::Bytes;

use crate::codec::encode_filename;
use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobBackend, MetaStore};

/// Prefix of scratch files created by [`atomic_write`].
pub const TEMP_PREFIX: &str = "temp_";

/// Write `data` to `target` through a scratch file in `temp_dir`.
///
/// The scratch file is synced and then renamed over `target`, so readers see
/// either the old content or the new content, never a mix. `temp_dir` must
/// be on the same filesystem as `target`.
pub async fn atomic_write(temp_dir: &Path, target: PathBuf, data: Bytes) -> StoreResult<()> {
    let temp_dir = temp_dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> StoreResult<()> {
        let mut scratch = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&temp_dir)?;
        scratch.write_all(&data)?;
        scratch.as_file().sync_all()?;
        scratch
            .persist(&target)
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Task(e.to_string()))?
}

/// Scratch files have the prefix and, unlike encoded key names, no `.`.
fn is_scratch_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && !name.contains('.')
}

/// Remove scratch files left behind by an unclean shutdown.
///
/// Returns the number of files removed. A missing directory counts as empty.
pub async fn purge_scratch_files(dir: &Path) -> StoreResult<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut purged = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_scratch_name(name) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => purged += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    if purged > 0 {
        tracing::info!(dir = %dir.display(), purged, "purged stale scratch files");
    }
    Ok(purged)
}

async fn remove_if_present(path: &Path) -> StoreResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Filesystem blob backend: one file per key, written atomically.
#[derive(Debug, Clone)]
pub struct FsBlobBackend {
    dir: PathBuf,
    temp_dir: PathBuf,
}

impl FsBlobBackend {
    /// Open (creating if needed) a backend rooted at `dir`, using `temp_dir`
    /// for scratch files.
    pub async fn open(dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let backend = Self {
            dir: dir.into(),
            temp_dir: temp_dir.into(),
        };
        tokio::fs::create_dir_all(&backend.dir).await?;
        tokio::fs::create_dir_all(&backend.temp_dir).await?;
        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the content file for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(encode_filename(key))
    }
}

#[async_trait]
impl BlobBackend for FsBlobBackend {
    async fn read(&self, key: &str) -> StoreResult<Option<Bytes>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, body: Bytes) -> StoreResult<()> {
        atomic_write(&self.temp_dir, self.path_for(key), body).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        remove_if_present(&self.path_for(key)).await
    }
}

/// Filesystem metadata store: one JSON document per key.
#[derive(Debug, Clone)]
pub struct FsMetaStore {
    dir: PathBuf,
    temp_dir: PathBuf,
}

impl FsMetaStore {
    pub async fn open(dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self {
            dir: dir.into(),
            temp_dir: temp_dir.into(),
        };
        tokio::fs::create_dir_all(&store.dir).await?;
        tokio::fs::create_dir_all(&store.temp_dir).await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(encode_filename(key))
    }
}

#[async_trait]
impl MetaStore for FsMetaStore {
    async fn read_meta(&self, key: &str) -> StoreResult<Meta> {
        let data = match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Meta::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data).map_err(|e| StoreError::CorruptMeta {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn write_meta(&self, key: &str, meta: &Meta) -> StoreResult<()> {
        let data = serde_json::to_vec(meta).map_err(|e| StoreError::CorruptMeta {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        atomic_write(&self.temp_dir, self.path_for(key), Bytes::from(data)).await
    }

    async fn delete_meta(&self, key: &str) -> StoreResult<()> {
        remove_if_present(&self.path_for(key)).await
    }
}
