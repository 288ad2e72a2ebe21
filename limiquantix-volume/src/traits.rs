//! Volume driver trait definition.

use async_trait::async_trait;

use crate::error::{Result, VolumeError};
use crate::types::{AttachmentRequest, Snapshot, VolumeRecord};

/// Volume driver trait - implemented by each block-storage backend.
///
/// Backends differ entirely in how they log in and enumerate volumes; they
/// only share this contract. Capabilities a backend lacks return
/// [`VolumeError::NotImplemented`] so callers can branch on them.
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Backend name (e.g., "rbd").
    fn name(&self) -> &'static str;

    // =========================================================================
    // Inventory
    // =========================================================================

    /// List every volume the backend exposes.
    ///
    /// Any pool or volume that cannot be read fails the whole listing; only
    /// the per-volume watcher check degrades to `Unknown`.
    async fn volumes(&self, attachments: AttachmentRequest) -> Result<Vec<VolumeRecord>>;

    /// Inspect a single volume by public ID.
    async fn volume_inspect(
        &self,
        volume_id: &str,
        attachments: AttachmentRequest,
    ) -> Result<VolumeRecord>;

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a volume of `size_gib` GiB.
    async fn volume_create(&self, name: &str, size_gib: u64) -> Result<VolumeRecord>;

    /// Delete a volume.
    async fn volume_remove(&self, volume_id: &str) -> Result<()>;

    /// Bind a volume to this host.
    ///
    /// Returns the refreshed volume and the ID the caller should use to
    /// refer to the local attachment.
    async fn volume_attach(&self, volume_id: &str) -> Result<(VolumeRecord, String)>;

    /// Unbind a volume from this host.
    async fn volume_detach(&self, volume_id: &str) -> Result<VolumeRecord>;

    // =========================================================================
    // Optional capabilities
    // =========================================================================

    async fn volume_create_from_snapshot(
        &self,
        _snapshot_id: &str,
        _name: &str,
        _size_gib: Option<u64>,
    ) -> Result<VolumeRecord> {
        Err(VolumeError::NotImplemented("volume create from snapshot"))
    }

    async fn volume_copy(&self, _volume_id: &str, _name: &str) -> Result<VolumeRecord> {
        Err(VolumeError::NotImplemented("volume copy"))
    }

    async fn volume_snapshot(&self, _volume_id: &str, _snapshot_name: &str) -> Result<Snapshot> {
        Err(VolumeError::NotImplemented("volume snapshot"))
    }

    /// Unbind a volume from every host.
    async fn volume_detach_all(&self, _volume_id: &str) -> Result<()> {
        Err(VolumeError::NotImplemented("volume detach all"))
    }

    async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        Err(VolumeError::NotImplemented("snapshots"))
    }

    async fn snapshot_inspect(&self, _snapshot_id: &str) -> Result<Snapshot> {
        Err(VolumeError::NotImplemented("snapshot inspect"))
    }

    async fn snapshot_copy(
        &self,
        _snapshot_id: &str,
        _snapshot_name: &str,
        _destination_id: &str,
    ) -> Result<Snapshot> {
        Err(VolumeError::NotImplemented("snapshot copy"))
    }

    async fn snapshot_remove(&self, _snapshot_id: &str) -> Result<()> {
        Err(VolumeError::NotImplemented("snapshot remove"))
    }
}
