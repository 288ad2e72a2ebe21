//! Local attachment index.
//!
//! A snapshot of the block devices this host currently has bound for a
//! backend, keyed the way that backend identifies volumes. Snapshots are
//! rebuilt on every request and never shared between requests.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Volume key to local device path, as seen at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAttachmentIndex {
    devices: HashMap<String, String>,
}

impl LocalAttachmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, device_path: impl Into<String>) {
        self.devices.insert(key.into(), device_path.into());
    }

    /// Device path bound to `key`, if any.
    pub fn device(&self, key: &str) -> Option<&str> {
        self.devices.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.devices.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.devices.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for LocalAttachmentIndex {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            devices: iter.into_iter().collect(),
        }
    }
}

/// Source of a host's current device bindings.
///
/// An empty host is an empty index. When the bindings cannot be read at
/// all, implementations return `EnumerationUnavailable`.
#[async_trait]
pub trait LocalDeviceEnumerator: Send + Sync {
    async fn snapshot(&self) -> Result<LocalAttachmentIndex>;
}

/// Fixed bindings, for development backends and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    index: LocalAttachmentIndex,
}

impl StaticEnumerator {
    pub fn new(index: LocalAttachmentIndex) -> Self {
        Self { index }
    }
}

#[async_trait]
impl LocalDeviceEnumerator for StaticEnumerator {
    async fn snapshot(&self) -> Result<LocalAttachmentIndex> {
        Ok(self.index.clone())
    }
}
