use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Per-key metadata record.
///
/// `version == None` means the key does not exist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub version: Option<Version>,
    pub content_type: Option<String>,
}

impl Meta {
    /// Metadata for an accepted write.
    pub fn new(version: Version, content_type: Option<String>) -> Self {
        Self {
            version: Some(version),
            content_type,
        }
    }

    /// Returns `true` if the key has a current version.
    pub fn exists(&self) -> bool {
        self.version.is_some()
    }
}

/// A change delivered to subscribers of a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// A new current value.
    Value {
        version: Version,
        content_type: Option<String>,
        body: Bytes,
    },
    /// The key was deleted.
    Delete { content_type: Option<String> },
}

impl Update {
    /// The version carried by a value update.
    pub fn version(&self) -> Option<&Version> {
        match self {
            Update::Value { version, .. } => Some(version),
            Update::Delete { .. } => None,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            Update::Value { content_type, .. } | Update::Delete { content_type } => {
                content_type.as_deref()
            }
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Update::Delete { .. })
    }
}
