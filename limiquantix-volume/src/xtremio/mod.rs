//! Dell EMC XtremIO volume driver.
//!
//! Read-only: volumes can be listed and inspected, with attachment state
//! derived from `/dev/disk/by-id` links and the array's LUN mappings.
//! Volume IDs are the array's numeric volume indexes.

mod client;
mod devices;

pub use client::{VolumeRef, XtremioClient, XtremioVolume};
pub use devices::{read_initiator_name, DiskByIdDevices};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::attachments::LocalDeviceEnumerator;
use crate::config::XtremioConfig;
use crate::error::{Result, VolumeError};
use crate::resolver::AttachmentResolver;
use crate::session::{SessionCache, SessionHandle};
use crate::traits::VolumeDriver;
use crate::types::{AttachmentRequest, VolumeRecord, BYTES_PER_GIB};

/// Driver name.
pub const NAME: &str = "xtremio";

/// XtremIO volume driver.
pub struct XtremioDriver {
    config: XtremioConfig,
    sessions: Arc<SessionCache>,
    devices: Arc<dyn LocalDeviceEnumerator>,
    instance_id: String,
}

impl XtremioDriver {
    pub fn new(config: XtremioConfig, sessions: Arc<SessionCache>, instance_id: impl Into<String>) -> Self {
        let devices = Arc::new(DiskByIdDevices::new(
            config.disk_by_id_path.clone(),
            config.uses_dm_names(),
        ));
        Self::with_devices(config, sessions, devices, instance_id)
    }

    /// Create a driver with a custom local device source.
    pub fn with_devices(
        config: XtremioConfig,
        sessions: Arc<SessionCache>,
        devices: Arc<dyn LocalDeviceEnumerator>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            config,
            sessions,
            devices,
            instance_id: instance_id.into(),
        }
    }

    async fn session(&self) -> Result<Arc<XtremioClient>> {
        let credentials = self.config.credentials();
        credentials.validate(NAME)?;

        let credentials = &credentials;
        let session = self
            .sessions
            .get_or_create(&credentials.fingerprint(), move || async move {
                let client = XtremioClient::connect(credentials).await?;
                Ok(SessionHandle::Xtremio(Arc::new(client)))
            })
            .await?;
        session.into_xtremio()
    }

    async fn to_records(
        &self,
        client: &XtremioClient,
        volumes: Vec<XtremioVolume>,
        request: AttachmentRequest,
    ) -> Result<Vec<VolumeRecord>> {
        let resolver =
            AttachmentResolver::prepare(self.devices.as_ref(), request, self.instance_id.clone()).await?;

        let mut records = Vec::with_capacity(volumes.len());
        for volume in volumes {
            let id = volume.index.to_string();
            let resolution = resolver
                .resolve(&id, &volume.binding_key(), client, &volume)
                .await;

            records.push(VolumeRecord {
                size_gib: volume.size_bytes() / BYTES_PER_GIB,
                name: volume.name,
                id,
                volume_type: String::new(),
                attachment_state: resolution.state,
                attachments: resolution.attachments,
            });
        }

        Ok(records)
    }
}

/// XtremIO volume IDs are canonical decimal indexes, exactly as listed.
fn parse_index(volume_id: &str) -> Result<u64> {
    let canonical = !volume_id.is_empty()
        && volume_id.bytes().all(|b| b.is_ascii_digit())
        && (volume_id == "0" || !volume_id.starts_with('0'));
    if !canonical {
        return Err(VolumeError::InvalidIdentifier(volume_id.to_string()));
    }
    volume_id
        .parse()
        .map_err(|_| VolumeError::InvalidIdentifier(volume_id.to_string()))
}

#[async_trait]
impl VolumeDriver for XtremioDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self))]
    async fn volumes(&self, attachments: AttachmentRequest) -> Result<Vec<VolumeRecord>> {
        let client = self.session().await?;

        let refs = client
            .volume_refs()
            .await
            .map_err(|e| VolumeError::backend("list volumes", "", "", e))?;
        debug!(count = refs.len(), "Listed XtremIO volumes");

        let mut volumes = Vec::with_capacity(refs.len());
        for r in refs {
            let volume = client
                .volume(r.index)
                .await
                .map_err(|e| VolumeError::backend("get volume", "", &r.name, e))?;
            volumes.push(volume);
        }

        self.to_records(&client, volumes, attachments).await
    }

    #[instrument(skip(self))]
    async fn volume_inspect(&self, volume_id: &str, attachments: AttachmentRequest) -> Result<VolumeRecord> {
        let index = parse_index(volume_id)?;
        let client = self.session().await?;

        let volume = client
            .volume(index)
            .await
            .map_err(|e| VolumeError::backend("get volume", "", volume_id, e))?;

        self.to_records(&client, vec![volume], attachments)
            .await?
            .pop()
            .ok_or_else(|| VolumeError::Internal(format!("No record built for {}", volume_id)))
    }

    async fn volume_create(&self, _name: &str, _size_gib: u64) -> Result<VolumeRecord> {
        Err(VolumeError::NotImplemented("xtremio volume create"))
    }

    async fn volume_remove(&self, _volume_id: &str) -> Result<()> {
        Err(VolumeError::NotImplemented("xtremio volume remove"))
    }

    async fn volume_attach(&self, _volume_id: &str) -> Result<(VolumeRecord, String)> {
        Err(VolumeError::NotImplemented("xtremio volume attach"))
    }

    async fn volume_detach(&self, _volume_id: &str) -> Result<VolumeRecord> {
        Err(VolumeError::NotImplemented("xtremio volume detach"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::{LocalAttachmentIndex, StaticEnumerator};
    use crate::types::AttachmentState;

    fn volume(index: u64, naa: &str, lun_mappings: Option<u64>) -> XtremioVolume {
        XtremioVolume {
            name: format!("db{:02}", index),
            index,
            size_kib: 20 * 1024 * 1024,
            naa_name: naa.to_string(),
            lun_mappings,
        }
    }

    fn driver(index: LocalAttachmentIndex) -> XtremioDriver {
        XtremioDriver::with_devices(
            XtremioConfig::default(),
            Arc::new(SessionCache::new()),
            Arc::new(StaticEnumerator::new(index)),
            "iqn.1994-05.com.redhat:node-a",
        )
    }

    #[tokio::test]
    async fn test_records_resolve_against_local_links() {
        let mut index = LocalAttachmentIndex::new();
        index.insert("514f0c5f1a800001", "/dev/sdb");
        let driver = driver(index);

        let records = driver
            .to_records(
                &XtremioClient::unconnected("https://xms.invalid"),
                vec![
                    volume(1, "514F0C5F1A800001", Some(1)),
                    volume(2, "514f0c5f1a800002", Some(1)),
                    volume(3, "514f0c5f1a800003", Some(0)),
                    volume(4, "514f0c5f1a800004", None),
                ],
                AttachmentRequest::Devices,
            )
            .await
            .unwrap();

        let states: Vec<_> = records.iter().map(|r| r.attachment_state).collect();
        assert_eq!(states, vec![
            AttachmentState::Attached,
            AttachmentState::Unavailable,
            AttachmentState::Available,
            AttachmentState::Unknown,
        ]);
        assert_eq!(records[0].attachments[0].device_path.as_deref(), Some("/dev/sdb"));
        assert_eq!(records[0].attachments[0].instance_id, "iqn.1994-05.com.redhat:node-a");
        assert_eq!(records[0].size_gib, 20);
        assert_eq!(records[0].id, "1");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_network() {
        let driver = driver(LocalAttachmentIndex::new());
        let err = driver.volumes(AttachmentRequest::None).await.unwrap_err();
        assert!(matches!(err, VolumeError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_invalid() {
        let driver = driver(LocalAttachmentIndex::new());
        let err = driver.volume_inspect("db01", AttachmentRequest::None).await.unwrap_err();
        assert!(matches!(err, VolumeError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_parse_index_accepts_only_decimal_digits() {
        assert_eq!(parse_index("5").unwrap(), 5);
        assert_eq!(parse_index("0").unwrap(), 0);
        for bad in ["+5", "0012", "-5", " 5", "5 ", "", "0x5", "٣", "99999999999999999999999"] {
            assert!(
                matches!(parse_index(bad), Err(VolumeError::InvalidIdentifier(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_lifecycle_not_implemented() {
        let driver = driver(LocalAttachmentIndex::new());
        assert!(driver.volume_create("db09", 1).await.unwrap_err().is_not_implemented());
        assert!(driver.volume_remove("1").await.unwrap_err().is_not_implemented());
        assert!(driver.volume_attach("1").await.unwrap_err().is_not_implemented());
        assert!(driver.volume_detach("1").await.unwrap_err().is_not_implemented());
        assert!(driver.snapshots().await.unwrap_err().is_not_implemented());
    }
}
