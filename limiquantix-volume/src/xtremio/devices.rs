//! XtremIO LUNs visible on this host.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::attachments::{LocalAttachmentIndex, LocalDeviceEnumerator};
use crate::error::{Result, VolumeError};
use super::client::naa_suffix;

static DM_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^dm-name-[0-9A-Za-z_]*$").expect("valid regex"));
static WWN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^wwn-0x[0-9A-Za-z_]*$").expect("valid regex"));

/// Enumerates XtremIO devices from persistent device links.
///
/// Keys are the trailing 16 characters of the link name (the NAA suffix),
/// values the resolved block device.
#[derive(Debug, Clone)]
pub struct DiskByIdDevices {
    root: PathBuf,
    dm_names: bool,
}

impl DiskByIdDevices {
    /// `dm_names` selects `dm-name-*` links (device-mapper or multipath)
    /// over `wwn-0x*` links.
    pub fn new(root: impl Into<PathBuf>, dm_names: bool) -> Self {
        Self {
            root: root.into(),
            dm_names,
        }
    }

    fn pattern(&self) -> &'static Regex {
        if self.dm_names {
            &DM_NAME
        } else {
            &WWN
        }
    }

    fn scan(&self) -> Result<LocalAttachmentIndex> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            VolumeError::EnumerationUnavailable(format!("error reading {}: {}", self.root.display(), e))
        })?;

        let pattern = self.pattern();
        let mut index = LocalAttachmentIndex::new();

        for entry in entries {
            let entry = entry.map_err(|e| {
                VolumeError::EnumerationUnavailable(format!("error reading {}: {}", self.root.display(), e))
            })?;
            let name = entry.file_name().to_string_lossy().to_string();

            if !pattern.is_match(&name) {
                continue;
            }
            let Some(key) = naa_suffix(&name) else {
                debug!(name = %name, "Device link name too short for an NAA suffix");
                continue;
            };

            index.insert(key, resolve_link(&entry.path()));
        }

        Ok(index)
    }
}

/// Resolve a device link to its target, keeping the link path if it dangles.
fn resolve_link(link: &Path) -> String {
    match std::fs::canonicalize(link) {
        Ok(target) => target.display().to_string(),
        Err(e) => {
            debug!(link = %link.display(), error = %e, "Unable to resolve device link");
            link.display().to_string()
        }
    }
}

#[async_trait]
impl LocalDeviceEnumerator for DiskByIdDevices {
    async fn snapshot(&self) -> Result<LocalAttachmentIndex> {
        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| VolumeError::Internal(format!("device scan task failed: {}", e)))?
    }
}

/// Read `InitiatorName=` from an open-iscsi initiator file.
pub fn read_initiator_name(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        VolumeError::Configuration(format!(
            "Unable to read initiator name from {}: {}",
            path.display(),
            e
        ))
    })?;

    content
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(key, _)| key.trim() == "InitiatorName")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| VolumeError::Configuration(format!("IQN not found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn by_id_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let dev = dir.path().join("sdb");
        std::fs::write(&dev, b"").unwrap();
        symlink(&dev, dir.path().join("wwn-0x514f0c5f1a800007")).unwrap();
        symlink(&dev, dir.path().join("dm-name-3514f0c5f1a800008")).unwrap();
        symlink(&dev, dir.path().join("ata-ST1000_Z1D")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_scan_wwn_links() {
        let dir = by_id_dir();
        let index = DiskByIdDevices::new(dir.path(), false).snapshot().await.unwrap();
        assert_eq!(index.len(), 1);
        let expected = std::fs::canonicalize(dir.path().join("sdb")).unwrap();
        assert_eq!(index.device("514f0c5f1a800007"), Some(expected.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_scan_dm_name_links() {
        let dir = by_id_dir();
        let index = DiskByIdDevices::new(dir.path(), true).snapshot().await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.contains("514f0c5f1a800008"));
    }

    #[tokio::test]
    async fn test_scan_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let index = DiskByIdDevices::new(dir.path(), false).snapshot().await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_scan_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = DiskByIdDevices::new(dir.path().join("nope"), false)
            .snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, VolumeError::EnumerationUnavailable(_)));
    }

    #[test]
    fn test_read_initiator_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("initiatorname.iscsi");
        std::fs::write(&path, "## generated\nInitiatorName=iqn.1994-05.com.redhat:node-a\n").unwrap();
        assert_eq!(read_initiator_name(&path).unwrap(), "iqn.1994-05.com.redhat:node-a");

        std::fs::write(&path, "# empty\n").unwrap();
        assert!(matches!(read_initiator_name(&path), Err(VolumeError::Configuration(_))));
    }
}
