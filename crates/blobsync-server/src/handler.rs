//! Request handling: maps one HTTP request onto a [`BlobStore`] operation.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use blobsync_protocol::{accepts, encode_update, headers, key_from_path, not_acceptable_message};
use blobsync_sdk::{
    BlobStore, DeleteOptions, GetOptions, Outcome, PutOptions, PutResult, Snapshot,
};
use blobsync_types::Meta;
use futures_util::StreamExt;
use tracing::{debug, error};

use crate::auth::{Action, AllowAllAuth, AuthProvider, Credentials};
use crate::error::{ServerError, ServerResult};
use crate::hooks::{NoOpHook, ServerHook};

/// Per-server request handling options.
#[derive(Clone)]
pub struct ServeOptions {
    pub auth: Arc<dyn AuthProvider>,
    pub hook: Arc<dyn ServerHook>,
    /// Largest accepted PUT body, in bytes.
    pub max_body_size: usize,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            auth: Arc::new(AllowAllAuth),
            hook: Arc::new(NoOpHook),
            max_body_size: 64 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for ServeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeOptions")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

/// Answer one request against `store`. Never fails: errors become status
/// codes with the error message as body.
pub async fn serve(store: &BlobStore, request: Request, opts: &ServeOptions) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    match handle(store, request, opts).await {
        Ok(response) => response,
        Err(err) => {
            let status = err.status_code();
            if status.is_server_error() {
                error!(%method, %path, error = %err, "request failed");
            } else {
                debug!(%method, %path, status = status.as_u16(), error = %err, "request rejected");
            }
            text(status, err.to_string())
        }
    }
}

async fn handle(store: &BlobStore, request: Request, opts: &ServeOptions) -> ServerResult<Response> {
    let method = request.method().clone();
    if method == Method::OPTIONS {
        return Ok(empty(StatusCode::OK));
    }

    let key = key_from_path(request.uri().path())?;
    let action = if method == Method::GET || method == Method::HEAD {
        Action::Read { key: key.clone() }
    } else if method == Method::PUT {
        Action::Write { key: key.clone() }
    } else if method == Method::DELETE {
        Action::Delete { key: key.clone() }
    } else {
        return Err(ServerError::MethodNotAllowed(method.to_string()));
    };

    let identity = opts
        .auth
        .authenticate(&Credentials::from_headers(request.headers()))
        .await?;
    if !opts.auth.authorize(&identity, &action).await? {
        return Err(ServerError::AuthorizationDenied {
            action: action.to_string(),
        });
    }

    match action {
        Action::Read { .. } => {
            let head = method == Method::HEAD;
            if !head && headers::is_subscribe(request.headers()) {
                subscribe(store, &key, request.headers(), opts).await
            } else {
                get(store, &key, request.headers(), head, opts).await
            }
        }
        Action::Write { .. } => put(store, &key, request, opts).await,
        Action::Delete { .. } => delete(store, &key, request.headers()).await,
    }
}

async fn get(
    store: &BlobStore,
    key: &str,
    request_headers: &HeaderMap,
    head: bool,
    opts: &ServeOptions,
) -> ServerResult<Response> {
    let mut get_opts = GetOptions::new().headers(request_headers.clone());
    if head {
        get_opts = get_opts.head();
    }
    let Some(Snapshot {
        version,
        content_type,
        body,
    }) = done(store.get(key, get_opts).await?)?
    else {
        return Ok(empty(StatusCode::NOT_FOUND));
    };
    check_accept(request_headers, content_type.as_deref())?;

    let meta = Meta::new(version, content_type);
    let mut out = HeaderMap::new();
    opts.hook.before_send(key, &meta, &mut out).await?;
    fill_defaults(&mut out, headers::VERSION, &meta);

    let body = match body {
        Some(bytes) if !head => Body::from(bytes),
        _ => Body::empty(),
    };
    Ok(respond(StatusCode::OK, out, body))
}

async fn subscribe(store: &BlobStore, key: &str, request_headers: &HeaderMap, opts: &ServeOptions) -> ServerResult<Response> {
    let sub = done(
        store
            .subscribe(key, GetOptions::new().headers(request_headers.clone()))
            .await?,
    )?;
    check_accept(request_headers, sub.content_type.as_deref())?;

    let meta = Meta {
        version: sub.current,
        content_type: sub.content_type,
    };
    let mut out = HeaderMap::new();
    opts.hook.before_send(key, &meta, &mut out).await?;
    fill_defaults(&mut out, headers::CURRENT_VERSION, &meta);
    out.insert(HeaderName::from_static(headers::SUBSCRIBE), HeaderValue::from_static("true"));

    debug!(key, current = ?meta.version, "streaming subscription");
    let frames = sub
        .updates
        .map(|update| Ok::<_, Infallible>(encode_update(&update)));
    Ok(respond(StatusCode::OK, out, Body::from_stream(frames)))
}

async fn put(store: &BlobStore, key: &str, request: Request, opts: &ServeOptions) -> ServerResult<Response> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, opts.max_body_size)
        .await
        .map_err(|e| ServerError::PayloadTooLarge(e.to_string()))?;

    let result = done(
        store
            .put(key, body, PutOptions::new().headers(parts.headers))
            .await?,
    )?;
    opts.hook.after_write(key, &result).await?;

    let mut out = HeaderMap::new();
    match &result {
        PutResult::Accepted(version) => {
            headers::set_event_ids(&mut out, headers::VERSION, std::slice::from_ref(version));
        }
        PutResult::Stale { current } => {
            out.insert(HeaderName::from_static(headers::VERSION), HeaderValue::from_static(""));
            if let Some(current) = current {
                headers::set_event_ids(&mut out, headers::CURRENT_VERSION, std::slice::from_ref(current));
            }
        }
    }
    Ok(respond(StatusCode::OK, out, Body::empty()))
}

async fn delete(store: &BlobStore, key: &str, request_headers: &HeaderMap) -> ServerResult<Response> {
    done(
        store
            .delete(key, DeleteOptions::new().headers(request_headers.clone()))
            .await?,
    )?;
    Ok(empty(StatusCode::NO_CONTENT))
}

fn check_accept(request_headers: &HeaderMap, content_type: Option<&str>) -> ServerResult<()> {
    let accept = headers::get_str(request_headers, ACCEPT.as_str())?;
    if let (Some(accept), Some(content_type)) = (accept, content_type) {
        if !accepts(accept, content_type) {
            return Err(ServerError::NotAcceptable(not_acceptable_message(content_type, accept)));
        }
    }
    Ok(())
}

/// Add the protocol headers a hook did not already set.
fn fill_defaults(out: &mut HeaderMap, version_header: &'static str, meta: &Meta) {
    if let Some(version) = &meta.version {
        if !out.contains_key(version_header) {
            headers::set_event_ids(out, version_header, std::slice::from_ref(version));
        }
    }
    if let Some(content_type) = &meta.content_type {
        if !out.contains_key(CONTENT_TYPE) {
            if let Ok(value) = HeaderValue::from_str(content_type) {
                out.insert(CONTENT_TYPE, value);
            }
        }
    }
    out.entry(HeaderName::from_static(headers::EDITABLE))
        .or_insert(HeaderValue::from_static("true"));
    out.entry(HeaderName::from_static(headers::MERGE_TYPE))
        .or_insert(HeaderValue::from_static(headers::MERGE_TYPE_AWW));
}

/// Store calls made here carry no signal, so they always complete.
fn done<T>(outcome: Outcome<T>) -> ServerResult<T> {
    outcome
        .done()
        .ok_or_else(|| ServerError::Internal("operation aborted".into()))
}

fn respond(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn empty(status: StatusCode) -> Response {
    respond(status, HeaderMap::new(), Body::empty())
}

fn text(status: StatusCode, message: String) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    respond(status, headers, Body::from(message))
}
