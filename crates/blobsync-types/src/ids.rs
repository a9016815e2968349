use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::version::Version;

/// Identity of a store instance or subscriber.
///
/// Used both as the prefix of generated versions and for self-echo
/// suppression when fanning out updates.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an explicit peer id.
    pub fn new(id: impl Into<String>) -> TypeResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::EmptyPeer);
        }
        Ok(Self(id))
    }

    /// Generate a random lowercase alphanumeric peer id.
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a `version` argument: when present it holds exactly one id.
pub fn single_version(ids: Option<&[Version]>) -> TypeResult<Option<&Version>> {
    match ids {
        None => Ok(None),
        Some([]) => Err(TypeError::EmptyVersion),
        Some([id]) => Ok(Some(id)),
        Some(many) => Err(TypeError::MultipleVersions(many.len())),
    }
}

/// Validate a `parents` argument: zero or one id.
pub fn single_parent(ids: Option<&[Version]>) -> TypeResult<Option<&Version>> {
    match ids {
        None | Some([]) => Ok(None),
        Some([id]) => Ok(Some(id)),
        Some(many) => Err(TypeError::MultipleParents(many.len())),
    }
}
