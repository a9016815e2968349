use std::path::Path;

use blobsync_types::PeerId;
use bytes::Bytes;

use crate::error::StoreResult;
use crate::fs::atomic_write;

/// Name of the identity file inside the metadata directory.
///
/// Encoded key names always end in a hex case mask, so `peer.txt` can never
/// collide with a key's metadata file.
pub const PEER_FILE: &str = "peer.txt";

/// Resolve the identity of a store instance.
///
/// An explicitly configured peer wins and leaves `peer.txt` untouched.
/// Otherwise the identity persisted in `meta_dir/peer.txt` is reused, and on
/// first run a fresh random identity is generated and written there.
pub async fn load_or_create_peer(meta_dir: &Path, configured: Option<&str>) -> StoreResult<PeerId> {
    if let Some(peer) = configured {
        return Ok(PeerId::new(peer)?);
    }

    let path = meta_dir.join(PEER_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) if !text.trim().is_empty() => return Ok(PeerId::new(text.trim())?),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let peer = PeerId::generate();
    tokio::fs::create_dir_all(meta_dir).await?;
    atomic_write(meta_dir, path, Bytes::from(peer.as_str().to_string())).await?;
    tracing::info!(%peer, "created store identity");
    Ok(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn identity_persists_across_loads() {
        let tmp = TempDir::new().unwrap();
        let first = load_or_create_peer(tmp.path(), None).await.unwrap();
        let second = load_or_create_peer(tmp.path(), None).await.unwrap();
        assert_eq!(first, second);

        let on_disk = tokio::fs::read_to_string(tmp.path().join(PEER_FILE))
            .await
            .unwrap();
        assert_eq!(on_disk, first.as_str());
    }

    #[tokio::test]
    async fn separate_directories_get_separate_identities() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let pa = load_or_create_peer(a.path(), None).await.unwrap();
        let pb = load_or_create_peer(b.path(), None).await.unwrap();
        assert_ne!(pa, pb);
    }

    #[tokio::test]
    async fn configured_peer_wins_and_is_not_written() {
        let tmp = TempDir::new().unwrap();
        let peer = load_or_create_peer(tmp.path(), Some("manual-peer"))
            .await
            .unwrap();
        assert_eq!(peer.as_str(), "manual-peer");
        assert!(!tmp.path().join(PEER_FILE).exists());
    }

    #[tokio::test]
    async fn empty_configured_peer_is_rejected() {
        let tmp = TempDir::new().unwrap();
        assert!(load_or_create_peer(tmp.path(), Some("")).await.is_err());
    }
}
