use std::fmt;

use blobsync_types::Version;
use bytes::Bytes;
use futures_util::StreamExt;
use url::Url;

use crate::error::{SdkError, SdkResult};
use crate::options::{DeleteOptions, GetOptions, Outcome, PutOptions, PutResult, Snapshot};
use crate::remote::RemoteClient;
use crate::store::BlobStore;
use crate::stream::UpdateStream;

/// One side of a replication link: a key in a local store, or a URL.
#[derive(Clone)]
pub enum Endpoint {
    Local { store: BlobStore, key: String },
    Remote { client: RemoteClient, url: Url },
}

/// A subscription opened through an [`Endpoint`].
#[derive(Debug)]
pub struct EndpointSubscription {
    pub current: Option<Version>,
    pub updates: UpdateStream,
}

impl Endpoint {
    /// `http://` and `https://` targets are remote; anything else is a key
    /// in `store`.
    pub fn resolve(target: &str, store: &BlobStore, client: &RemoteClient) -> SdkResult<Self> {
        if target.starts_with("http://") || target.starts_with("https://") {
            let url = Url::parse(target).map_err(|e| SdkError::InvalidEndpoint(format!("{target}: {e}")))?;
            return Ok(Endpoint::Remote {
                client: client.clone(),
                url,
            });
        }
        Ok(Endpoint::Local {
            store: store.clone(),
            key: target.to_string(),
        })
    }

    pub fn local(store: &BlobStore, key: impl Into<String>) -> Self {
        Endpoint::Local {
            store: store.clone(),
            key: key.into(),
        }
    }

    pub fn remote(client: &RemoteClient, url: Url) -> Self {
        Endpoint::Remote {
            client: client.clone(),
            url,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Endpoint::Remote { .. })
    }

    pub async fn get(&self, opts: GetOptions) -> SdkResult<Outcome<Option<Snapshot>>> {
        match self {
            Endpoint::Local { store, key } => store.get(key, opts).await,
            Endpoint::Remote { client, url } => client.get(url, opts).await,
        }
    }

    pub async fn put(&self, body: Bytes, opts: PutOptions) -> SdkResult<Outcome<PutResult>> {
        match self {
            Endpoint::Local { store, key } => store.put(key, body, opts).await,
            Endpoint::Remote { client, url } => client.put(url, body, opts).await,
        }
    }

    pub async fn delete(&self, opts: DeleteOptions) -> SdkResult<Outcome<()>> {
        match self {
            Endpoint::Local { store, key } => store.delete(key, opts).await,
            Endpoint::Remote { client, url } => client.delete(url, opts).await,
        }
    }

    /// Open a subscription. The stream ends when the options' signal fires.
    pub async fn subscribe(&self, opts: GetOptions) -> SdkResult<Outcome<EndpointSubscription>> {
        match self {
            Endpoint::Local { store, key } => {
                let signal = opts.common.signal.clone();
                let outcome = store.subscribe(key, opts).await?;
                Ok(outcome.map(|sub| EndpointSubscription {
                    current: sub.current,
                    updates: UpdateStream::new(sub.updates.map(Ok)).until(signal.as_ref()),
                }))
            }
            Endpoint::Remote { client, url } => {
                let outcome = client.subscribe(url, opts).await?;
                Ok(outcome.map(|sub| EndpointSubscription {
                    current: sub.current,
                    updates: sub.updates,
                }))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local { key, .. } => write!(f, "local:{key}"),
            Endpoint::Remote { url, .. } => write!(f, "{url}"),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({self})")
    }
}
