//! Mock volume backend for testing and development.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::attachments::{LocalAttachmentIndex, LocalDeviceEnumerator};
use crate::error::{Result, VolumeError};
use crate::identifier::{VolumeId, VolumeIdCodec};
use crate::resolver::{AttachmentResolver, WatcherProbe};
use crate::traits::VolumeDriver;
use crate::types::{AttachmentRequest, Snapshot, VolumeRecord};

/// Driver name.
pub const NAME: &str = "mock";

/// Mock volume backend.
///
/// Pools, images, local bindings and remote watchers all live in memory.
/// Requests go through the same codec and resolver as the real drivers,
/// so it is useful for:
/// - Unit and integration testing
/// - Running the CLI without a storage cluster
pub struct MockDriver {
    codec: VolumeIdCodec,
    instance_id: String,
    state: RwLock<MockState>,
}

#[derive(Default)]
struct MockState {
    /// pool -> image -> size in GiB
    pools: BTreeMap<String, BTreeMap<String, u64>>,
    /// encoded volume ID -> device path
    bindings: HashMap<String, String>,
    /// volumes held by some other host
    watched: HashSet<String>,
    /// volumes whose watcher check errors
    unprobeable: HashSet<String>,
    snapshots: BTreeMap<String, Snapshot>,
    next_device: u32,
}

impl MockState {
    fn image(&self, id: &VolumeId) -> Result<u64> {
        self.pools
            .get(&id.pool)
            .and_then(|images| images.get(&id.image))
            .copied()
            .ok_or_else(|| VolumeError::NotFound(id.encode()))
    }
}

fn poisoned<T>(_: T) -> VolumeError {
    VolumeError::Internal("Lock poisoned".to_string())
}

impl MockDriver {
    /// Create an empty mock backend with a single `default_pool`.
    pub fn new(default_pool: impl Into<String>, instance_id: impl Into<String>) -> Self {
        let default_pool = default_pool.into();
        info!(default_pool = %default_pool, "Creating mock volume backend");

        let mut state = MockState::default();
        if !default_pool.is_empty() {
            state.pools.insert(default_pool.clone(), BTreeMap::new());
        }

        Self {
            codec: VolumeIdCodec::new(default_pool),
            instance_id: instance_id.into(),
            state: RwLock::new(state),
        }
    }

    pub fn with_pool(self, pool: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.pools.entry(pool.into()).or_default();
        }
        self
    }

    pub fn with_image(self, pool: impl Into<String>, image: impl Into<String>, size_gib: u64) -> Self {
        if let Ok(mut state) = self.state.write() {
            state
                .pools
                .entry(pool.into())
                .or_default()
                .insert(image.into(), size_gib);
        }
        self
    }

    /// Bind `volume_id` to `device_path` on this host.
    pub fn with_binding(self, volume_id: impl Into<String>, device_path: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.bindings.insert(volume_id.into(), device_path.into());
        }
        self
    }

    /// Mark `volume_id` as held by another host.
    pub fn with_watcher(self, volume_id: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.watched.insert(volume_id.into());
        }
        self
    }

    /// Make the watcher check for `volume_id` fail.
    pub fn with_probe_failure(self, volume_id: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.unprobeable.insert(volume_id.into());
        }
        self
    }

    pub fn codec(&self) -> &VolumeIdCodec {
        &self.codec
    }

    async fn to_records(
        &self,
        images: Vec<(VolumeId, u64)>,
        request: AttachmentRequest,
    ) -> Result<Vec<VolumeRecord>> {
        let resolver = AttachmentResolver::prepare(self, request, self.instance_id.clone()).await?;

        let mut records = Vec::with_capacity(images.len());
        for (id, size_gib) in images {
            let encoded = id.encode();
            let resolution = resolver.resolve(&encoded, &encoded, self, &id).await;
            records.push(VolumeRecord {
                name: id.image,
                id: encoded,
                volume_type: id.pool,
                size_gib,
                attachment_state: resolution.state,
                attachments: resolution.attachments,
            });
        }
        Ok(records)
    }

    async fn inspect(&self, id: &VolumeId, request: AttachmentRequest) -> Result<VolumeRecord> {
        let size_gib = self.state.read().map_err(poisoned)?.image(id)?;
        self.to_records(vec![(id.clone(), size_gib)], request)
            .await?
            .pop()
            .ok_or_else(|| VolumeError::Internal(format!("No record built for {}", id)))
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new("rbd", "mock-host")
    }
}

#[async_trait]
impl LocalDeviceEnumerator for MockDriver {
    async fn snapshot(&self) -> Result<LocalAttachmentIndex> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[async_trait]
impl WatcherProbe for MockDriver {
    type Target = VolumeId;

    async fn has_watchers(&self, target: &VolumeId) -> Result<bool> {
        let state = self.state.read().map_err(poisoned)?;
        let encoded = target.encode();
        if state.unprobeable.contains(&encoded) {
            return Err(VolumeError::ProbeIndeterminate {
                volume_id: encoded,
                reason: "simulated probe failure".to_string(),
            });
        }
        state.image(target)?;
        Ok(state.watched.contains(&encoded))
    }
}

#[async_trait]
impl VolumeDriver for MockDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn volumes(&self, attachments: AttachmentRequest) -> Result<Vec<VolumeRecord>> {
        let images: Vec<(VolumeId, u64)> = {
            let state = self.state.read().map_err(poisoned)?;
            state
                .pools
                .iter()
                .flat_map(|(pool, images)| {
                    images
                        .iter()
                        .map(move |(name, size)| (VolumeId::new(pool.clone(), name.clone()), *size))
                })
                .collect()
        };

        self.to_records(images, attachments).await
    }

    async fn volume_inspect(&self, volume_id: &str, attachments: AttachmentRequest) -> Result<VolumeRecord> {
        let id = self.codec.decode(volume_id)?;
        self.inspect(&id, attachments).await
    }

    #[instrument(skip(self))]
    async fn volume_create(&self, name: &str, size_gib: u64) -> Result<VolumeRecord> {
        let id = self.codec.decode(name)?;
        if size_gib == 0 {
            return Err(VolumeError::Configuration("Volume size must be greater than 0".into()));
        }

        {
            let mut state = self.state.write().map_err(poisoned)?;
            let images = state
                .pools
                .get_mut(&id.pool)
                .ok_or_else(|| VolumeError::NotFound(format!("pool {}", id.pool)))?;
            if images.contains_key(&id.image) {
                return Err(VolumeError::AlreadyExists(id.encode()));
            }
            images.insert(id.image.clone(), size_gib);
        }

        info!(volume_id = %id, "Mock volume created");
        self.inspect(&id, AttachmentRequest::None).await
    }

    #[instrument(skip(self))]
    async fn volume_remove(&self, volume_id: &str) -> Result<()> {
        let id = self.codec.decode(volume_id)?;
        let mut state = self.state.write().map_err(poisoned)?;
        state.image(&id)?;

        let encoded = id.encode();
        if state.bindings.contains_key(&encoded) {
            return Err(VolumeError::Backend {
                operation: "remove image",
                pool: id.pool.clone(),
                image: id.image.clone(),
                source: Box::new(VolumeError::Internal("image is mapped on this host".into())),
            });
        }

        if let Some(images) = state.pools.get_mut(&id.pool) {
            images.remove(&id.image);
        }
        state.watched.remove(&encoded);
        info!(volume_id = %encoded, "Mock volume removed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn volume_attach(&self, volume_id: &str) -> Result<(VolumeRecord, String)> {
        let id = self.codec.decode(volume_id)?;
        let encoded = id.encode();
        {
            let mut state = self.state.write().map_err(poisoned)?;
            state.image(&id)?;
            if !state.bindings.contains_key(&encoded) {
                let device = format!("/dev/rbd{}", state.next_device);
                state.next_device += 1;
                state.bindings.insert(encoded.clone(), device);
            }
        }

        let record = self.inspect(&id, AttachmentRequest::Devices).await?;
        Ok((record, encoded))
    }

    #[instrument(skip(self))]
    async fn volume_detach(&self, volume_id: &str) -> Result<VolumeRecord> {
        let id = self.codec.decode(volume_id)?;
        {
            let mut state = self.state.write().map_err(poisoned)?;
            state.image(&id)?;
            if state.bindings.remove(&id.encode()).is_none() {
                return Err(VolumeError::NotAttached(id.encode()));
            }
        }
        self.inspect(&id, AttachmentRequest::Devices).await
    }

    async fn volume_snapshot(&self, volume_id: &str, snapshot_name: &str) -> Result<Snapshot> {
        let id = self.codec.decode(volume_id)?;
        let mut state = self.state.write().map_err(poisoned)?;
        let size_gib = state.image(&id)?;

        let snapshot_id = format!("{}@{}", id.encode(), snapshot_name);
        if state.snapshots.contains_key(&snapshot_id) {
            return Err(VolumeError::AlreadyExists(snapshot_id));
        }

        let snapshot = Snapshot {
            id: snapshot_id.clone(),
            name: snapshot_name.to_string(),
            volume_id: id.encode(),
            size_gib,
        };
        state.snapshots.insert(snapshot_id, snapshot.clone());
        Ok(snapshot)
    }

    async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.snapshots.values().cloned().collect())
    }

    async fn snapshot_inspect(&self, snapshot_id: &str) -> Result<Snapshot> {
        let state = self.state.read().map_err(poisoned)?;
        state
            .snapshots
            .get(snapshot_id)
            .cloned()
            .ok_or_else(|| VolumeError::NotFound(snapshot_id.to_string()))
    }

    async fn snapshot_remove(&self, snapshot_id: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .snapshots
            .remove(snapshot_id)
            .map(|_| ())
            .ok_or_else(|| VolumeError::NotFound(snapshot_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttachmentState;

    fn backend() -> MockDriver {
        MockDriver::new("pool1", "node-a")
            .with_image("pool1", "vol1", 10)
            .with_image("pool1", "vol2", 20)
            .with_image("pool1", "vol3", 30)
            .with_binding("pool1.vol1", "/dev/rbd0")
            .with_watcher("pool1.vol2")
    }

    #[tokio::test]
    async fn test_list_resolves_states() {
        let records = backend().volumes(AttachmentRequest::Devices).await.unwrap();
        let states: Vec<_> = records.iter().map(|r| (r.id.as_str(), r.attachment_state)).collect();
        assert_eq!(states, vec![
            ("pool1.vol1", AttachmentState::Attached),
            ("pool1.vol2", AttachmentState::Unavailable),
            ("pool1.vol3", AttachmentState::Available),
        ]);
        assert_eq!(records[0].attachments[0].device_path.as_deref(), Some("/dev/rbd0"));
        assert_eq!(records[0].attachments[0].instance_id, "node-a");
    }

    #[tokio::test]
    async fn test_list_without_attachments_is_unknown() {
        let records = backend().volumes(AttachmentRequest::None).await.unwrap();
        assert!(records.iter().all(|r| r.attachment_state == AttachmentState::Unknown));
        assert!(records.iter().all(|r| r.attachments.is_empty()));
    }

    #[tokio::test]
    async fn test_watcher_failure_degrades_to_unknown() {
        let backend = backend().with_probe_failure("pool1.vol3");
        let record = backend.volume_inspect("vol3", AttachmentRequest::Attachments).await.unwrap();
        assert_eq!(record.attachment_state, AttachmentState::Unknown);
    }

    #[tokio::test]
    async fn test_volume_lifecycle() {
        let backend = MockDriver::new("pool1", "node-a");

        // Create
        let record = backend.volume_create("data", 5).await.unwrap();
        assert_eq!(record.id, "pool1.data");
        assert_eq!(record.size_gib, 5);
        assert!(matches!(
            backend.volume_create("pool1.data", 5).await,
            Err(VolumeError::AlreadyExists(_))
        ));

        // Attach
        let (record, attachment_id) = backend.volume_attach("data").await.unwrap();
        assert_eq!(attachment_id, "pool1.data");
        assert_eq!(record.attachment_state, AttachmentState::Attached);
        assert_eq!(record.attachments[0].device_path.as_deref(), Some("/dev/rbd0"));

        // Remove while mapped
        assert!(backend.volume_remove("data").await.is_err());

        // Detach
        let record = backend.volume_detach("pool1.data").await.unwrap();
        assert_eq!(record.attachment_state, AttachmentState::Available);
        assert!(matches!(
            backend.volume_detach("data").await,
            Err(VolumeError::NotAttached(_))
        ));

        // Remove
        backend.volume_remove("data").await.unwrap();
        assert!(backend.volume_inspect("data", AttachmentRequest::None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_rejects_zero_size_and_bad_ids() {
        let backend = MockDriver::new("pool1", "node-a");
        assert!(matches!(
            backend.volume_create("data", 0).await,
            Err(VolumeError::Configuration(_))
        ));
        assert!(matches!(
            backend.volume_create("a.b.c", 1).await,
            Err(VolumeError::InvalidIdentifier(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshots() {
        let backend = backend();
        let snapshot = backend.volume_snapshot("vol1", "snap1").await.unwrap();
        assert_eq!(snapshot.id, "pool1.vol1@snap1");
        assert_eq!(snapshot.size_gib, 10);

        assert_eq!(backend.snapshots().await.unwrap().len(), 1);
        backend.snapshot_remove(&snapshot.id).await.unwrap();
        assert!(backend.snapshot_inspect(&snapshot.id).await.is_err());
        assert!(backend.volume_copy("vol1", "vol9").await.unwrap_err().is_not_implemented());
    }
}
