//! HTTP server for blobsync.
//!
//! Every request path is a key of one [`BlobStore`](blobsync_sdk::BlobStore).
//! GET/HEAD read it (or, with `Subscribe`, stream its updates), PUT writes
//! it, DELETE removes it. Authentication and response hooks are pluggable.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod router;
pub mod server;

pub use auth::{Action, AllowAllAuth, AuthProvider, Credentials, Identity, TokenAuth};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{serve, ServeOptions};
pub use hooks::{NoOpHook, ServerHook};
pub use server::BlobServer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
    use axum::Router;
    use blobsync_protocol::UpdateDecoder;
    use blobsync_sdk::{BlobStore, GetOptions, PutResult, Version};
    use blobsync_types::{Meta, Update};
    use bytes::Bytes;
    use futures_util::{Stream, StreamExt};
    use tower::util::ServiceExt;

    fn app(store: &BlobStore) -> Router {
        router::build_router(store.clone(), ServeOptions::default(), true)
    }

    fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
        response.headers().get(name).map(|v| v.to_str().unwrap())
    }

    // ------------------------------------------------------------------
    // GET / PUT / DELETE
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn put_then_get() {
        let store = BlobStore::in_memory();
        let app = app(&store);

        let put = send(
            &app,
            request("PUT", "/doc", &[("version", "\"v-1\""), ("content-type", "text/plain")], "hello"),
        )
        .await;
        assert_eq!(put.status(), StatusCode::OK);
        assert_eq!(header(&put, "version"), Some("\"v-1\""));

        let get = send(&app, request("GET", "/doc", &[], "")).await;
        assert_eq!(get.status(), StatusCode::OK);
        assert_eq!(header(&get, "version"), Some("\"v-1\""));
        assert_eq!(header(&get, "content-type"), Some("text/plain"));
        assert_eq!(header(&get, "editable"), Some("true"));
        assert_eq!(header(&get, "merge-type"), Some("aww"));
        assert_eq!(body_text(get).await, "hello");
    }

    #[tokio::test]
    async fn head_has_headers_but_no_body() {
        let store = BlobStore::in_memory();
        let app = app(&store);
        send(&app, request("PUT", "/doc", &[("version", "\"3\"")], "content")).await;

        let head = send(&app, request("HEAD", "/doc", &[], "")).await;
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(header(&head, "version"), Some("\"3\""));
        assert_eq!(body_text(head).await, "");
    }

    #[tokio::test]
    async fn missing_key_is_404() {
        let app = app(&BlobStore::in_memory());
        let get = send(&app, request("GET", "/nothing", &[], "")).await;
        assert_eq!(get.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stale_put_is_reported_and_ignored() {
        let store = BlobStore::in_memory();
        let app = app(&store);
        send(&app, request("PUT", "/k", &[("version", "\"11.0\"")], "xyz")).await;

        let stale = send(&app, request("PUT", "/k", &[("version", "\"9.0\"")], "abc")).await;
        assert_eq!(stale.status(), StatusCode::OK);
        assert_eq!(header(&stale, "version"), Some(""));
        assert_eq!(header(&stale, "current-version"), Some("\"11.0\""));

        let get = send(&app, request("GET", "/k", &[], "")).await;
        assert_eq!(header(&get, "version"), Some("\"11.0\""));
        assert_eq!(body_text(get).await, "xyz");
    }

    #[tokio::test]
    async fn unknown_version_or_parents_is_309() {
        let store = BlobStore::in_memory();
        let app = app(&store);
        send(&app, request("PUT", "/k", &[("version", "\"100\"")], "x")).await;

        let by_parents = send(&app, request("GET", "/k", &[("parents", "\"200\"")], "")).await;
        assert_eq!(by_parents.status().as_u16(), 309);

        let by_version = send(&app, request("GET", "/k", &[("version", "\"200\"")], "")).await;
        assert_eq!(by_version.status().as_u16(), 309);

        let known = send(&app, request("GET", "/k", &[("parents", "\"50\"")], "")).await;
        assert_eq!(known.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn incompatible_accept_is_406() {
        let store = BlobStore::in_memory();
        let app = app(&store);
        send(&app, request("PUT", "/k", &[("content-type", "text/plain")], "x")).await;

        let rejected = send(&app, request("GET", "/k", &[("accept", "image/png")], "")).await;
        assert_eq!(rejected.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(
            body_text(rejected).await,
            "Content-Type of text/plain not in Accept: image/png"
        );

        let wildcard = send(&app, request("GET", "/k", &[("accept", "text/*")], "")).await;
        assert_eq!(wildcard.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_headers_are_400() {
        let app = app(&BlobStore::in_memory());
        let bad = send(&app, request("PUT", "/k", &[("version", "not-quoted")], "x")).await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let two = send(&app, request("PUT", "/k", &[("version", "\"1\", \"2\"")], "x")).await;
        assert_eq!(two.status(), StatusCode::BAD_REQUEST);

        let bad_path = send(&app, request("GET", "/%zz", &[], "")).await;
        assert_eq!(bad_path.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_is_always_204() {
        let store = BlobStore::in_memory();
        let app = app(&store);
        send(&app, request("PUT", "/k", &[], "x")).await;

        let first = send(&app, request("DELETE", "/k", &[], "")).await;
        assert_eq!(first.status(), StatusCode::NO_CONTENT);
        let again = send(&app, request("DELETE", "/k", &[], "")).await;
        assert_eq!(again.status(), StatusCode::NO_CONTENT);

        let get = send(&app, request("GET", "/k", &[], "")).await;
        assert_eq!(get.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn path_is_percent_decoded_and_query_ignored() {
        let store = BlobStore::in_memory();
        let app = app(&store);
        send(&app, request("PUT", "/a%20b?ignored=1", &[], "spaced")).await;

        let snap = store.get("/a b", GetOptions::new()).await.unwrap().done().flatten().unwrap();
        assert_eq!(snap.body.unwrap(), "spaced");
    }

    #[tokio::test]
    async fn options_and_other_methods() {
        let app = app(&BlobStore::in_memory());
        let options = send(&app, request("OPTIONS", "/k", &[], "")).await;
        assert_eq!(options.status(), StatusCode::OK);
        assert_eq!(body_text(options).await, "");

        let post = send(&app, request("POST", "/k", &[], "")).await;
        assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let store = BlobStore::in_memory();
        let opts = ServeOptions {
            max_body_size: 4,
            ..ServeOptions::default()
        };
        let app = router::build_router(store.clone(), opts, false);
        let put = send(&app, request("PUT", "/k", &[], "too large")).await;
        assert_eq!(put.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(store.get("/k", GetOptions::new()).await.unwrap().done().flatten(), None);
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    async fn next_update<S>(chunks: &mut S, decoder: &mut UpdateDecoder) -> Update
    where
        S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
    {
        loop {
            if let Some(update) = decoder.next_update().unwrap() {
                return update;
            }
            let chunk = tokio::time::timeout(Duration::from_secs(2), chunks.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            decoder.push(&chunk);
        }
    }

    #[tokio::test]
    async fn subscribe_streams_catch_up_and_updates() {
        let store = BlobStore::in_memory();
        let app = app(&store);
        send(&app, request("PUT", "/live", &[("version", "\"1\"")], "one")).await;

        let response = send(&app, request("GET", "/live", &[("subscribe", "true"), ("peer", "viewer")], "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "current-version"), Some("\"1\""));
        assert!(header(&response, "version").is_none());

        let mut chunks = response.into_body().into_data_stream();
        let mut decoder = UpdateDecoder::new();

        let first = next_update(&mut chunks, &mut decoder).await;
        assert_eq!(first.version(), Some(&Version::from("1")));

        send(&app, request("PUT", "/live", &[("version", "\"2\"")], "two")).await;
        let second = next_update(&mut chunks, &mut decoder).await;
        assert_eq!(second.version(), Some(&Version::from("2")));

        send(&app, request("DELETE", "/live", &[], "")).await;
        assert!(next_update(&mut chunks, &mut decoder).await.is_delete());
    }

    #[tokio::test]
    async fn subscribe_to_missing_key_is_allowed() {
        let store = BlobStore::in_memory();
        let app = app(&store);
        let response = send(&app, request("GET", "/later", &[("subscribe", "true")], "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, "current-version").is_none());
        assert_eq!(store.registry().subscriber_count("/later"), 1);
    }

    // ------------------------------------------------------------------
    // Hooks and auth
    // ------------------------------------------------------------------

    struct PresetHook;

    #[async_trait]
    impl ServerHook for PresetHook {
        async fn before_send(&self, _key: &str, _meta: &Meta, headers: &mut HeaderMap) -> ServerResult<()> {
            headers.insert("editable", HeaderValue::from_static("false"));
            headers.insert("content-type", HeaderValue::from_static("text/markdown"));
            Ok(())
        }

        async fn after_write(&self, _key: &str, _result: &PutResult) -> ServerResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn hook_headers_win_over_defaults() {
        let store = BlobStore::in_memory();
        let opts = ServeOptions {
            hook: Arc::new(PresetHook),
            ..ServeOptions::default()
        };
        let app = router::build_router(store.clone(), opts, true);
        send(&app, request("PUT", "/k", &[("content-type", "text/plain")], "x")).await;

        let get = send(&app, request("GET", "/k", &[], "")).await;
        assert_eq!(header(&get, "editable"), Some("false"));
        assert_eq!(header(&get, "content-type"), Some("text/markdown"));
        assert_eq!(header(&get, "merge-type"), Some("aww"));
    }

    #[tokio::test]
    async fn token_auth_answers_401_and_403() {
        let store = BlobStore::in_memory();
        let opts = ServeOptions {
            auth: Arc::new(TokenAuth::new("s3cret", true)),
            ..ServeOptions::default()
        };
        let app = router::build_router(store.clone(), opts, true);

        let anonymous = send(&app, request("PUT", "/k", &[], "x")).await;
        assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);

        let wrong = send(&app, request("PUT", "/k", &[("authorization", "Bearer nope")], "x")).await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = send(&app, request("PUT", "/k", &[("authorization", "Bearer s3cret")], "x")).await;
        assert_eq!(ok.status(), StatusCode::OK);

        let read = send(&app, request("GET", "/k", &[], "")).await;
        assert_eq!(read.status(), StatusCode::OK);
    }
}
