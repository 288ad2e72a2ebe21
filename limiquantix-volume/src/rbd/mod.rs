//! Ceph RBD volume driver.
//!
//! Volumes are RBD images addressed as `<pool>.<image>`. Cluster access
//! goes through the `rbd` and `ceph` CLIs; attachment state comes from the
//! host's `rbd showmapped` table plus `rbd status` watchers.
//!
//! ## Prerequisites
//! - `ceph-common` package installed (provides `rbd` and `ceph`)
//! - Readable ceph.conf and keyring for the configured cephx user
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use limiquantix_volume::{AttachmentRequest, RbdConfig, RbdDriver, SessionCache, VolumeDriver};
//!
//! let driver = RbdDriver::new(RbdConfig::default(), Arc::new(SessionCache::new()), "node-a");
//! let volumes = driver.volumes(AttachmentRequest::Devices).await?;
//! ```

mod client;
mod devices;

pub use client::RbdConnection;
pub use devices::MappedDevices;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::attachments::LocalDeviceEnumerator;
use crate::config::RbdConfig;
use crate::error::{Result, VolumeError};
use crate::exec::{CommandExecutor, SystemExecutor};
use crate::identifier::{VolumeId, VolumeIdCodec};
use crate::resolver::AttachmentResolver;
use crate::session::{SessionCache, SessionHandle};
use crate::traits::VolumeDriver;
use crate::types::{AttachmentRequest, ImageInfo, VolumeRecord, BYTES_PER_GIB};

/// Driver name.
pub const NAME: &str = "rbd";

/// Ceph RBD volume driver.
pub struct RbdDriver {
    config: RbdConfig,
    codec: VolumeIdCodec,
    sessions: Arc<SessionCache>,
    executor: Arc<dyn CommandExecutor>,
    devices: Arc<dyn LocalDeviceEnumerator>,
    instance_id: String,
}

impl RbdDriver {
    /// Create a driver that runs the Ceph CLIs on this host.
    pub fn new(config: RbdConfig, sessions: Arc<SessionCache>, instance_id: impl Into<String>) -> Self {
        Self::with_executor(config, sessions, Arc::new(SystemExecutor::new()), instance_id)
    }

    /// Create a driver with a custom command executor.
    pub fn with_executor(
        config: RbdConfig,
        sessions: Arc<SessionCache>,
        executor: Arc<dyn CommandExecutor>,
        instance_id: impl Into<String>,
    ) -> Self {
        let devices = Arc::new(MappedDevices::new(executor.clone(), config.rbd_path.clone()));
        Self {
            codec: VolumeIdCodec::new(config.default_pool.clone()),
            config,
            sessions,
            executor,
            devices,
            instance_id: instance_id.into(),
        }
    }

    pub fn codec(&self) -> &VolumeIdCodec {
        &self.codec
    }

    /// Cached cluster connection, connecting on first use.
    async fn session(&self) -> Result<Arc<RbdConnection>> {
        let credentials = self.config.credentials();
        credentials.validate(NAME)?;

        let fingerprint = credentials.fingerprint();
        let config = &self.config;
        let executor = self.executor.clone();
        let session = self
            .sessions
            .get_or_create(&fingerprint, move || async move {
                let conn = RbdConnection::connect(config, executor).await?;
                Ok(SessionHandle::Rbd(Arc::new(conn)))
            })
            .await?;
        session.into_rbd()
    }

    async fn stat(&self, conn: &RbdConnection, id: &VolumeId) -> Result<ImageInfo> {
        conn.image_info(&id.pool, &id.image)
            .await
            .map_err(|e| VolumeError::backend("stat image", &id.pool, &id.image, e))
    }

    /// Convert image details to public records, resolving attachments if asked.
    async fn to_records(
        &self,
        conn: &RbdConnection,
        images: Vec<ImageInfo>,
        request: AttachmentRequest,
    ) -> Result<Vec<VolumeRecord>> {
        let resolver =
            AttachmentResolver::prepare(self.devices.as_ref(), request, self.instance_id.clone()).await?;

        let mut records = Vec::with_capacity(images.len());
        for image in images {
            let id = VolumeId::new(image.pool.clone(), image.name.clone());
            let encoded = id.encode();
            let resolution = resolver.resolve(&encoded, &encoded, conn, &id).await;

            records.push(VolumeRecord {
                size_gib: image.size_gib(),
                name: image.name,
                id: encoded,
                volume_type: image.pool,
                attachment_state: resolution.state,
                attachments: resolution.attachments,
            });
        }

        Ok(records)
    }

    async fn inspect(&self, conn: &RbdConnection, id: &VolumeId, request: AttachmentRequest) -> Result<VolumeRecord> {
        let info = self.stat(conn, id).await?;
        self.to_records(conn, vec![info], request)
            .await?
            .pop()
            .ok_or_else(|| VolumeError::Internal(format!("No record built for {}", id)))
    }
}

#[async_trait]
impl VolumeDriver for RbdDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self))]
    async fn volumes(&self, attachments: AttachmentRequest) -> Result<Vec<VolumeRecord>> {
        let conn = self.session().await?;

        let pools = conn
            .list_pools()
            .await
            .map_err(|e| VolumeError::backend("list pools", "", "", e))?;

        let mut images = Vec::new();
        for pool in &pools {
            let names = conn
                .list_images(pool)
                .await
                .map_err(|e| VolumeError::backend("list images", pool, "", e))?;

            debug!(pool = %pool, count = names.len(), "Listed RBD images");

            for name in names {
                images.push(self.stat(&conn, &VolumeId::new(pool.clone(), name)).await?);
            }
        }

        self.to_records(&conn, images, attachments).await
    }

    #[instrument(skip(self))]
    async fn volume_inspect(&self, volume_id: &str, attachments: AttachmentRequest) -> Result<VolumeRecord> {
        let id = self.codec.decode(volume_id)?;
        let conn = self.session().await?;
        self.inspect(&conn, &id, attachments).await
    }

    #[instrument(skip(self))]
    async fn volume_create(&self, name: &str, size_gib: u64) -> Result<VolumeRecord> {
        let id = self.codec.decode(name)?;
        if size_gib == 0 {
            return Err(VolumeError::Configuration("Volume size must be greater than 0".into()));
        }
        let size_bytes = size_gib
            .checked_mul(BYTES_PER_GIB)
            .ok_or_else(|| VolumeError::Configuration(format!("Volume size {} GiB is too large", size_gib)))?;

        let conn = self.session().await?;

        let exists = conn
            .image_exists(&id.pool, &id.image)
            .await
            .map_err(|e| VolumeError::backend("stat image", &id.pool, &id.image, e))?;
        if exists {
            return Err(VolumeError::AlreadyExists(id.encode()));
        }

        info!(pool = %id.pool, image = %id.image, size_gib, "Creating RBD volume");
        conn.create_image(&id.pool, &id.image, size_bytes)
            .await
            .map_err(|e| VolumeError::backend("create image", &id.pool, &id.image, e))?;

        self.inspect(&conn, &id, AttachmentRequest::None).await
    }

    #[instrument(skip(self))]
    async fn volume_remove(&self, volume_id: &str) -> Result<()> {
        let id = self.codec.decode(volume_id)?;
        let conn = self.session().await?;

        conn.remove_image(&id.pool, &id.image)
            .await
            .map_err(|e| VolumeError::backend("remove image", &id.pool, &id.image, e))?;

        info!(pool = %id.pool, image = %id.image, "RBD volume removed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn volume_attach(&self, volume_id: &str) -> Result<(VolumeRecord, String)> {
        let id = self.codec.decode(volume_id)?;
        let conn = self.session().await?;

        let device = conn
            .map(&id.pool, &id.image)
            .await
            .map_err(|e| VolumeError::backend("map image", &id.pool, &id.image, e))?;
        info!(pool = %id.pool, image = %id.image, device = %device, "RBD volume mapped");

        let record = self.inspect(&conn, &id, AttachmentRequest::Devices).await?;
        Ok((record, id.encode()))
    }

    #[instrument(skip(self))]
    async fn volume_detach(&self, volume_id: &str) -> Result<VolumeRecord> {
        let id = self.codec.decode(volume_id)?;

        // The caller's view of local devices may be stale; look again.
        let index = self.devices.snapshot().await?;
        let device = index
            .device(&id.encode())
            .map(str::to_string)
            .ok_or_else(|| VolumeError::NotAttached(id.encode()))?;

        let conn = self.session().await?;
        conn.unmap(&device)
            .await
            .map_err(|e| VolumeError::backend("unmap image", &id.pool, &id.image, e))?;
        info!(pool = %id.pool, image = %id.image, device = %device, "RBD volume unmapped");

        self.inspect(&conn, &id, AttachmentRequest::Devices).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedExecutor;
    use crate::types::AttachmentState;

    const GIB: u64 = BYTES_PER_GIB;

    fn driver(exec: ScriptedExecutor) -> (RbdDriver, Arc<ScriptedExecutor>) {
        let exec = Arc::new(exec);
        let driver = RbdDriver::with_executor(
            RbdConfig::default(),
            Arc::new(SessionCache::new()),
            exec.clone(),
            "node-a",
        );
        (driver, exec)
    }

    fn cluster() -> ScriptedExecutor {
        ScriptedExecutor::new().respond("ceph fsid", r#"{"fsid":"fsid-1"}"#)
    }

    #[tokio::test]
    async fn test_inspect_without_attachments_skips_host_and_watchers() {
        let (driver, exec) = driver(
            cluster().respond("rbd info --pool rbd data", &format!(r#"{{"name":"data","size":{}}}"#, 10 * GIB)),
        );

        let record = driver.volume_inspect("data", AttachmentRequest::None).await.unwrap();
        assert_eq!(record.id, "rbd.data");
        assert_eq!(record.volume_type, "rbd");
        assert_eq!(record.size_gib, 10);
        assert_eq!(record.attachment_state, AttachmentState::Unknown);
        assert_eq!(exec.count("rbd showmapped"), 0);
        assert_eq!(exec.count("rbd status"), 0);
    }

    #[tokio::test]
    async fn test_invalid_id_fails_before_backend() {
        let (driver, exec) = driver(cluster());
        let err = driver
            .volume_inspect("pool1.vol1.extra", AttachmentRequest::None)
            .await
            .unwrap_err();
        assert!(matches!(err, VolumeError::InvalidIdentifier(_)));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_session_is_reused_across_calls() {
        let (driver, exec) = driver(
            cluster().respond("rbd info", &format!(r#"{{"size":{}}}"#, GIB)),
        );
        driver.volume_inspect("pool1.a", AttachmentRequest::None).await.unwrap();
        driver.volume_inspect("pool1.b", AttachmentRequest::None).await.unwrap();
        assert_eq!(exec.count("ceph fsid"), 1);
    }

    #[tokio::test]
    async fn test_missing_user_fails_before_connect() {
        let exec = Arc::new(cluster());
        let config = RbdConfig {
            cephx_user: String::new(),
            ..Default::default()
        };
        let driver = RbdDriver::with_executor(config, Arc::new(SessionCache::new()), exec.clone(), "node-a");

        let err = driver.volume_inspect("pool1.vol1", AttachmentRequest::None).await.unwrap_err();
        assert!(matches!(err, VolumeError::Configuration(_)));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_existing_image() {
        let (driver, exec) = driver(cluster().respond("rbd info", &format!(r#"{{"size":{}}}"#, GIB)));
        let err = driver.volume_create("pool1.vol1", 1).await.unwrap_err();
        assert!(matches!(err, VolumeError::AlreadyExists(ref id) if id == "pool1.vol1"));
        assert_eq!(exec.count("rbd create"), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_zero_size() {
        let (driver, exec) = driver(cluster());
        let err = driver.volume_create("pool1.vol1", 0).await.unwrap_err();
        assert!(matches!(err, VolumeError::Configuration(_)));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_size_overflowing_bytes() {
        let (driver, exec) = driver(cluster());
        let err = driver.volume_create("pool1.vol1", u64::MAX / BYTES_PER_GIB + 1).await.unwrap_err();
        assert!(matches!(err, VolumeError::Configuration(_)));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_detach_unmapped_volume_is_not_attached() {
        let (driver, exec) = driver(cluster().respond("rbd showmapped", "[]"));
        let err = driver.volume_detach("pool1.vol1").await.unwrap_err();
        assert!(matches!(err, VolumeError::NotAttached(_)));
        assert_eq!(exec.count("rbd unmap"), 0);
    }

    #[tokio::test]
    async fn test_snapshot_capabilities_not_implemented() {
        let (driver, _) = driver(cluster());
        assert!(driver.volume_snapshot("pool1.vol1", "s1").await.unwrap_err().is_not_implemented());
        assert!(driver.volume_copy("pool1.vol1", "copy").await.unwrap_err().is_not_implemented());
        assert!(driver
            .volume_create_from_snapshot("s1", "vol2", None)
            .await
            .unwrap_err()
            .is_not_implemented());
    }
}
