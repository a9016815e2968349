use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use blobsync_sdk::BlobStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{serve, ServeOptions};

#[derive(Clone)]
struct AppState {
    store: BlobStore,
    opts: Arc<ServeOptions>,
}

/// Build the router. Every path is a key, so all requests go to one handler.
pub fn build_router(store: BlobStore, opts: ServeOptions, cors: bool) -> Router {
    let state = AppState {
        store,
        opts: Arc::new(opts),
    };
    let router = Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if cors {
        router.layer(CorsLayer::very_permissive())
    } else {
        router
    }
}

async fn handle_request(State(state): State<AppState>, request: Request) -> Response {
    serve(&state.store, request, &state.opts).await
}
