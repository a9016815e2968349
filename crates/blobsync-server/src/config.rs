use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use blobsync_store::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    /// Largest accepted PUT body, in bytes.
    pub max_body_size: usize,
    /// Answer CORS preflights and add permissive CORS headers.
    pub cors: bool,
    /// Bearer token required for writes (and for reads unless
    /// `allow_anonymous_read`). No authentication when unset.
    pub auth_token: Option<String>,
    pub allow_anonymous_read: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8888)),
            store: StoreConfig::default(),
            max_body_size: 64 * 1024 * 1024,
            cors: true,
            auth_token: None,
            allow_anonymous_read: true,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
