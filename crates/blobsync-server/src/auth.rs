use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub anonymous: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self { name: "anonymous".into(), anonymous: true }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self { name: name.into(), anonymous: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Read `Authorization: Bearer <token>`. Anything else is anonymous.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| Credentials::Bearer(token.trim().to_string()))
            .unwrap_or(Credentials::Anonymous)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Read { key: String },
    Write { key: String },
    Delete { key: String },
}

impl Action {
    pub fn is_read(&self) -> bool {
        matches!(self, Action::Read { .. })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { key } => write!(f, "read:{key}"),
            Self::Write { key } => write!(f, "write:{key}"),
            Self::Delete { key } => write!(f, "delete:{key}"),
        }
    }
}

/// Decides who may do what. Runs before any store access.
///
/// An `authenticate` error answers 401; `authorize` returning `false`
/// answers 403.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool>;
}

pub struct AllowAllAuth;

#[async_trait]
impl AuthProvider for AllowAllAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => {
                let prefix: String = token.chars().take(8).collect();
                Ok(Identity::user(format!("bearer:{prefix}")))
            }
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(true)
    }
}

/// A single shared bearer token.
pub struct TokenAuth {
    token: String,
    allow_anonymous_read: bool,
}

impl TokenAuth {
    pub fn new(token: impl Into<String>, allow_anonymous_read: bool) -> Self {
        Self {
            token: token.into(),
            allow_anonymous_read,
        }
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) if *token == self.token => Ok(Identity::user("token")),
            Credentials::Bearer(_) => Err(ServerError::AuthFailed("invalid bearer token".into())),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool> {
        if identity.anonymous {
            return Ok(self.allow_anonymous_read && action.is_read());
        }
        Ok(true)
    }
}
