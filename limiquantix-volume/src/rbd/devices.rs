//! RBD images mapped on this host.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::attachments::{LocalAttachmentIndex, LocalDeviceEnumerator};
use crate::error::{Result, VolumeError};
use crate::exec::CommandExecutor;
use crate::identifier::VolumeId;

/// One row of `rbd showmapped --format json`.
#[derive(Debug, Deserialize)]
struct MappedEntry {
    pool: String,
    #[serde(default)]
    namespace: String,
    name: String,
    #[serde(default)]
    snap: String,
    device: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShowMapped {
    /// Pre-Nautilus: object keyed by device number
    ById(std::collections::HashMap<String, MappedEntry>),
    /// Nautilus and later: array of entries
    List(Vec<MappedEntry>),
}

/// Enumerates local RBD mappings with `rbd showmapped`.
///
/// Keys are `<pool>.<image>` volume IDs. Snapshot mappings and images in
/// RADOS namespaces are not volume bindings and are left out.
pub struct MappedDevices {
    executor: Arc<dyn CommandExecutor>,
    rbd_path: String,
}

impl MappedDevices {
    pub fn new(executor: Arc<dyn CommandExecutor>, rbd_path: impl Into<String>) -> Self {
        Self {
            executor,
            rbd_path: rbd_path.into(),
        }
    }
}

#[async_trait]
impl LocalDeviceEnumerator for MappedDevices {
    async fn snapshot(&self) -> Result<LocalAttachmentIndex> {
        let args = vec![
            "showmapped".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        let output = self
            .executor
            .run(&self.rbd_path, &args)
            .await
            .map_err(|e| VolumeError::EnumerationUnavailable(format!("Unable to get RBD map: {}", e)))?;

        parse_showmapped(&output)
    }
}

fn parse_showmapped(output: &str) -> Result<LocalAttachmentIndex> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(LocalAttachmentIndex::new());
    }

    let parsed: ShowMapped = serde_json::from_str(output).map_err(|e| {
        VolumeError::EnumerationUnavailable(format!("Unable to parse rbd showmapped: {}", e))
    })?;

    let entries: Vec<MappedEntry> = match parsed {
        ShowMapped::ById(map) => map.into_values().collect(),
        ShowMapped::List(list) => list,
    };

    let mut index = LocalAttachmentIndex::new();
    for entry in entries {
        if !(entry.snap.is_empty() || entry.snap == "-") || !entry.namespace.is_empty() {
            debug!(pool = %entry.pool, image = %entry.name, device = %entry.device, "Skipping non-volume mapping");
            continue;
        }
        index.insert(VolumeId::new(entry.pool, entry.name).encode(), entry.device);
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedExecutor;

    #[test]
    fn test_parse_legacy_format() {
        let index = parse_showmapped(
            r#"{"0":{"pool":"pool1","name":"vol1","snap":"-","device":"/dev/rbd0"},
                "1":{"pool":"pool1","name":"vol1","snap":"s1","device":"/dev/rbd1"}}"#,
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.device("pool1.vol1"), Some("/dev/rbd0"));
    }

    #[test]
    fn test_parse_list_format() {
        let index = parse_showmapped(
            r#"[{"id":"0","pool":"pool1","namespace":"","name":"vol1","snap":"-","device":"/dev/rbd0"},
                {"id":"1","pool":"pool2","namespace":"","name":"data","snap":"-","device":"/dev/rbd1"},
                {"id":"2","pool":"pool2","namespace":"tenant","name":"data","snap":"-","device":"/dev/rbd2"}]"#,
        )
        .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.device("pool2.data"), Some("/dev/rbd1"));
    }

    #[test]
    fn test_parse_empty_host() {
        assert!(parse_showmapped("").unwrap().is_empty());
        assert!(parse_showmapped("[]").unwrap().is_empty());
        assert!(parse_showmapped("{}").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_cli_is_unavailable() {
        let exec = Arc::new(ScriptedExecutor::new().fail("rbd showmapped", "failed to execute: No such file"));
        let err = MappedDevices::new(exec, "rbd").snapshot().await.unwrap_err();
        assert!(matches!(err, VolumeError::EnumerationUnavailable(_)));
    }
}
