use std::future::Future;

use blobsync_protocol::{headers, ProtocolError, UpdateDecoder};
use blobsync_types::Version;
use bytes::Bytes;
use futures_util::StreamExt;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{SdkError, SdkResult};
use crate::options::{CommonOptions, DeleteOptions, GetOptions, Outcome, PutOptions, PutResult, Snapshot};
use crate::stream::UpdateStream;

/// A subscription opened against a remote endpoint.
#[derive(Debug)]
pub struct RemoteSubscription {
    /// Value of the response's `Current-Version` header.
    pub current: Option<Version>,
    pub updates: UpdateStream,
}

/// HTTP client for a remote blobsync server.
///
/// The same operations as a local store, over GET/HEAD/PUT/DELETE. Status
/// codes map to results: 404 is "not found", 309 is
/// [`SdkError::VersionUnknown`], 401/403 is [`SdkError::Unauthorized`]. No
/// request is retried here.
#[derive(Debug, Clone, Default)]
pub struct RemoteClient {
    http: Client,
    /// Sent with every request (e.g. `Authorization`).
    headers: HeaderMap,
}

impl RemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            http: Client::new(),
            headers,
        }
    }

    /// Replace the headers sent with every request.
    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    /// Fetch the current value at `url`.
    pub async fn get(&self, url: &Url, mut opts: GetOptions) -> SdkResult<Outcome<Option<Snapshot>>> {
        opts.normalize()?;
        let method = if opts.head {
            reqwest::Method::HEAD
        } else {
            reqwest::Method::GET
        };
        let mut map = self.base_headers(&opts.common)?;
        if let Some(version) = &opts.version {
            headers::set_event_ids(&mut map, headers::VERSION, version);
        }
        if let Some(parents) = &opts.parents {
            headers::set_event_ids(&mut map, headers::PARENTS, parents);
        }
        if let Some(accept) = &opts.accept {
            map.insert(ACCEPT, header_value(ACCEPT.as_str(), accept)?);
        }

        let request = self.http.request(method, url.clone()).headers(map);
        let Outcome::Done(response) = send(request, opts.common.signal.as_ref()).await? else {
            return Ok(Outcome::Aborted);
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Outcome::Done(None));
        }
        check_status(&response, url)?;

        let version = response_version(&response, headers::VERSION)?
            .or(response_version(&response, headers::CURRENT_VERSION)?)
            .ok_or(ProtocolError::MissingHeader("Version"))?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = if opts.head {
            None
        } else {
            match cancellable(opts.common.signal.as_ref(), response.bytes()).await {
                Some(bytes) => Some(bytes?),
                None => return Ok(Outcome::Aborted),
            }
        };
        debug!(%url, %version, "remote get");
        Ok(Outcome::Done(Some(Snapshot {
            version,
            content_type,
            body,
        })))
    }

    /// Send a new value to `url`.
    pub async fn put(&self, url: &Url, body: Bytes, mut opts: PutOptions) -> SdkResult<Outcome<PutResult>> {
        opts.normalize()?;
        let mut map = self.base_headers(&opts.common)?;
        if let Some(version) = &opts.version {
            headers::set_event_ids(&mut map, headers::VERSION, version);
        }
        if let Some(parents) = &opts.parents {
            headers::set_event_ids(&mut map, headers::PARENTS, parents);
        }
        if let Some(content_type) = &opts.content_type {
            map.insert(CONTENT_TYPE, header_value(CONTENT_TYPE.as_str(), content_type)?);
        }

        let request = self.http.put(url.clone()).headers(map).body(body);
        let Outcome::Done(response) = send(request, opts.common.signal.as_ref()).await? else {
            return Ok(Outcome::Aborted);
        };
        check_status(&response, url)?;

        let result = match response_version(&response, headers::VERSION)? {
            Some(version) => PutResult::Accepted(version),
            None => PutResult::Stale {
                current: response_version(&response, headers::CURRENT_VERSION)?,
            },
        };
        debug!(%url, ?result, "remote put");
        Ok(Outcome::Done(result))
    }

    /// Delete the value at `url`. A 404 counts as success.
    pub async fn delete(&self, url: &Url, mut opts: DeleteOptions) -> SdkResult<Outcome<()>> {
        opts.normalize()?;
        let map = self.base_headers(&opts.common)?;
        let request = self.http.delete(url.clone()).headers(map);
        let Outcome::Done(response) = send(request, opts.common.signal.as_ref()).await? else {
            return Ok(Outcome::Aborted);
        };
        if response.status() != StatusCode::NOT_FOUND {
            check_status(&response, url)?;
        }
        debug!(%url, "remote delete");
        Ok(Outcome::Done(()))
    }

    /// Open a live subscription to `url`.
    ///
    /// The returned stream yields the server's catch-up (if any) and then
    /// every later update. It ends with an error if the connection drops.
    pub async fn subscribe(&self, url: &Url, mut opts: GetOptions) -> SdkResult<Outcome<RemoteSubscription>> {
        opts.normalize()?;
        let mut map = self.base_headers(&opts.common)?;
        map.insert(
            HeaderName::from_static(headers::SUBSCRIBE),
            HeaderValue::from_static("true"),
        );
        if let Some(version) = &opts.version {
            headers::set_event_ids(&mut map, headers::VERSION, version);
        }
        if let Some(parents) = &opts.parents {
            headers::set_event_ids(&mut map, headers::PARENTS, parents);
        }
        if let Some(accept) = &opts.accept {
            map.insert(ACCEPT, header_value(ACCEPT.as_str(), accept)?);
        }

        let request = self.http.get(url.clone()).headers(map);
        let Outcome::Done(response) = send(request, opts.common.signal.as_ref()).await? else {
            return Ok(Outcome::Aborted);
        };
        check_status(&response, url)?;

        let current = response_version(&response, headers::CURRENT_VERSION)?;
        debug!(%url, ?current, "remote subscription open");
        let updates = decode_updates(response, url.clone()).until(opts.common.signal.as_ref());
        Ok(Outcome::Done(RemoteSubscription { current, updates }))
    }

    fn base_headers(&self, common: &CommonOptions) -> SdkResult<HeaderMap> {
        let mut map = self.headers.clone();
        map.extend(common.headers.clone());
        if let Some(peer) = &common.peer {
            map.insert(HeaderName::from_static(headers::PEER), header_value(headers::PEER, peer)?);
        }
        Ok(map)
    }
}

fn header_value(name: &str, value: &str) -> SdkResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| ProtocolError::InvalidHeader(name.to_string()).into())
}

/// Await `fut` unless `signal` fires first.
async fn cancellable<F: Future>(signal: Option<&CancellationToken>, fut: F) -> Option<F::Output> {
    match signal {
        Some(signal) => tokio::select! {
            _ = signal.cancelled() => None,
            out = fut => Some(out),
        },
        None => Some(fut.await),
    }
}

async fn send(request: RequestBuilder, signal: Option<&CancellationToken>) -> SdkResult<Outcome<Response>> {
    if signal.is_some_and(CancellationToken::is_cancelled) {
        return Ok(Outcome::Aborted);
    }
    match cancellable(signal, request.send()).await {
        Some(response) => Ok(Outcome::Done(response?)),
        None => Ok(Outcome::Aborted),
    }
}

fn check_status(response: &Response, url: &Url) -> SdkResult<()> {
    let status = response.status();
    if status.as_u16() == blobsync_protocol::status::VERSION_UNKNOWN {
        return Err(SdkError::VersionUnknown {
            key: url.path().to_string(),
        });
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SdkError::Unauthorized {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(SdkError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(())
}

/// The single event id in a version header; `None` if absent or empty.
fn response_version(response: &Response, name: &str) -> SdkResult<Option<Version>> {
    let ids = headers::get_event_ids(response.headers(), name)?;
    Ok(ids.and_then(|ids| ids.into_iter().next()))
}

fn decode_updates(response: Response, url: Url) -> UpdateStream {
    let chunks = response.bytes_stream().boxed();
    let state = (chunks, UpdateDecoder::new(), false);
    UpdateStream::new(futures_util::stream::unfold(
        state,
        move |(mut chunks, mut decoder, failed)| {
            let url = url.clone();
            async move {
                if failed {
                    return None;
                }
                loop {
                    match decoder.next_update() {
                        Ok(Some(update)) => return Some((Ok(update), (chunks, decoder, false))),
                        Ok(None) => {}
                        Err(e) => return Some((Err(e.into()), (chunks, decoder, true))),
                    }
                    match chunks.next().await {
                        Some(Ok(bytes)) => decoder.push(&bytes),
                        Some(Err(e)) => {
                            return Some((Err(e.into()), (chunks, decoder, true)));
                        }
                        None => {
                            let err = SdkError::Transport(format!("subscription to {url} closed"));
                            return Some((Err(err), (chunks, decoder, true)));
                        }
                    }
                }
            }
        },
    ))
}
