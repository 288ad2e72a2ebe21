//! Backend selection.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{BackendKind, DriverConfig};
use crate::error::Result;
use crate::mock::MockDriver;
use crate::rbd::RbdDriver;
use crate::session::SessionCache;
use crate::traits::VolumeDriver;
use crate::xtremio::{read_initiator_name, XtremioDriver};

/// Build the configured backend.
///
/// All drivers built from the same `sessions` share its connections.
#[instrument(skip_all, fields(backend = %config.backend))]
pub fn build_driver(config: &DriverConfig, sessions: Arc<SessionCache>) -> Result<Arc<dyn VolumeDriver>> {
    let instance_id = instance_id(config)?;
    info!(instance_id = %instance_id, "Building volume driver");

    let driver: Arc<dyn VolumeDriver> = match config.backend {
        BackendKind::Rbd => Arc::new(RbdDriver::new(config.rbd.clone(), sessions, instance_id)),
        BackendKind::Xtremio => Arc::new(XtremioDriver::new(config.xtremio.clone(), sessions, instance_id)),
        BackendKind::Mock => Arc::new(MockDriver::new(config.rbd.default_pool.clone(), instance_id)),
    };

    Ok(driver)
}

/// Identity reported on local attachments.
///
/// An explicit `instance_id` wins. Otherwise XtremIO hosts report their
/// iSCSI initiator name and everything else the hostname.
pub fn instance_id(config: &DriverConfig) -> Result<String> {
    if let Some(id) = config.instance_id.as_ref().filter(|id| !id.is_empty()) {
        return Ok(id.clone());
    }

    match config.backend {
        BackendKind::Xtremio => read_initiator_name(&config.xtremio.initiator_name_file),
        BackendKind::Rbd | BackendKind::Mock => Ok(hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VolumeError;

    #[test]
    fn test_explicit_instance_id_wins() {
        let config = DriverConfig {
            backend: BackendKind::Xtremio,
            instance_id: Some("iqn.2024-01.io.example:node-a".into()),
            ..Default::default()
        };
        assert_eq!(instance_id(&config).unwrap(), "iqn.2024-01.io.example:node-a");
    }

    #[test]
    fn test_xtremio_without_initiator_file_fails() {
        let mut config = DriverConfig {
            backend: BackendKind::Xtremio,
            ..Default::default()
        };
        config.xtremio.initiator_name_file = "/nonexistent/initiatorname.iscsi".into();
        assert!(matches!(instance_id(&config), Err(VolumeError::Configuration(_))));
    }

    #[test]
    fn test_rbd_falls_back_to_hostname() {
        let config = DriverConfig::default();
        assert!(!instance_id(&config).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_mock_driver() {
        let config = DriverConfig {
            backend: BackendKind::Mock,
            instance_id: Some("node-a".into()),
            ..Default::default()
        };
        let driver = build_driver(&config, Arc::new(SessionCache::new())).unwrap();
        assert_eq!(driver.name(), "mock");
        assert!(driver.volumes(crate::AttachmentRequest::Devices).await.unwrap().is_empty());
    }

    #[test]
    fn test_build_rbd_driver_is_lazy() {
        let sessions = Arc::new(SessionCache::new());
        let driver = build_driver(&DriverConfig::default(), sessions).unwrap();
        assert_eq!(driver.name(), "rbd");
    }
}
