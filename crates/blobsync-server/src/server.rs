use std::sync::Arc;

use blobsync_sdk::BlobStore;
use tokio::net::TcpListener;

use crate::auth::{AuthProvider, TokenAuth};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::ServeOptions;
use crate::hooks::ServerHook;
use crate::router::build_router;

/// Blob store server.
pub struct BlobServer {
    config: ServerConfig,
    store: BlobStore,
    opts: ServeOptions,
}

impl BlobServer {
    /// A server over a filesystem store configured by `config.store`.
    pub fn new(config: ServerConfig) -> Self {
        let store = BlobStore::new(config.store.clone());
        Self::with_store(config, store)
    }

    /// A server over an existing store.
    pub fn with_store(config: ServerConfig, store: BlobStore) -> Self {
        let mut opts = ServeOptions {
            max_body_size: config.max_body_size,
            ..ServeOptions::default()
        };
        if let Some(token) = &config.auth_token {
            opts.auth = Arc::new(TokenAuth::new(token.clone(), config.allow_anonymous_read));
        }
        Self { config, store, opts }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.opts.auth = auth;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn ServerHook>) -> Self {
        self.opts.hook = hook;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.store.clone(), self.opts.clone(), self.config.cors)
    }

    /// Bind `config.bind_addr` and serve until the process ends.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> ServerResult<()> {
        self.store.init().await?;
        let addr = listener.local_addr()?;
        let peer = self.store.peer().await?;
        tracing::info!(%addr, %peer, "blobsync server listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
