//! Volume type definitions.

use serde::{Deserialize, Serialize};

/// Bytes per GiB.
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Whether and where a volume is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentState {
    /// Not requested, or the remote check failed.
    #[default]
    Unknown,
    /// Bound to a device on this host.
    Attached,
    /// Not bound here and no remote client holds it.
    Available,
    /// Not bound here but some remote client holds it.
    ///
    /// Inferred from the presence of a watcher (or LUN mapping). A watcher
    /// may be a read-only client, so this is a hint, not proof of an
    /// exclusive attachment elsewhere.
    Unavailable,
}

/// How much attachment detail a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentRequest {
    /// Skip attachment resolution entirely.
    #[default]
    None,
    /// Resolve attachment state.
    Attachments,
    /// Resolve attachment state and local device paths.
    Devices,
}

impl AttachmentRequest {
    pub fn requested(self) -> bool {
        !matches!(self, AttachmentRequest::None)
    }

    pub fn devices(self) -> bool {
        matches!(self, AttachmentRequest::Devices)
    }
}

/// A binding of a volume to a compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub volume_id: String,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
}

/// Externally visible volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Backend-native name (RBD image name, XtremIO volume name)
    pub name: String,
    /// Public volume ID
    pub id: String,
    /// Pool for RBD, empty where the backend has no pools
    #[serde(rename = "type")]
    pub volume_type: String,
    /// Size in whole GiB, rounded down
    pub size_gib: u64,
    pub attachment_state: AttachmentState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<VolumeAttachment>,
}

/// Backend-reported image details, discarded once converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub pool: String,
    pub name: String,
    pub size_bytes: u64,
}

impl ImageInfo {
    pub fn size_gib(&self) -> u64 {
        self.size_bytes / BYTES_PER_GIB
    }
}

/// A point-in-time copy of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub volume_id: String,
    pub size_gib: u64,
}
