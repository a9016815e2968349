use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where a store keeps its data, and who it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding blob content files.
    pub db_dir: PathBuf,
    /// Directory holding metadata documents and `peer.txt`.
    pub meta_dir: PathBuf,
    /// Scratch directory for atomic writes. Defaults to `meta_dir`; must be
    /// on the same filesystem as both data directories.
    pub temp_dir: Option<PathBuf>,
    /// Fixed peer identity. When unset, `peer.txt` is used.
    pub peer: Option<String>,
}

impl StoreConfig {
    /// Config with `db/` and `meta/` under a single root directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            db_dir: root.join("db"),
            meta_dir: root.join("meta"),
            temp_dir: None,
            peer: None,
        }
    }

    /// The effective scratch directory.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.as_deref().unwrap_or(&self.meta_dir)
    }

    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("./blobsync-db"),
            meta_dir: PathBuf::from("./blobsync-meta"),
            temp_dir: None,
            peer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_defaults_to_meta_dir() {
        let config = StoreConfig::under("/var/lib/blobs");
        assert_eq!(config.temp_dir(), Path::new("/var/lib/blobs/meta"));

        let config = StoreConfig {
            temp_dir: Some("/scratch".into()),
            ..config
        };
        assert_eq!(config.temp_dir(), Path::new("/scratch"));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"peer": "abc"}"#).unwrap();
        assert_eq!(config.peer.as_deref(), Some("abc"));
        assert_eq!(config.db_dir, PathBuf::from("./blobsync-db"));
    }
}
