//! Ceph cluster access through the `rbd` and `ceph` CLIs.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::config::RbdConfig;
use crate::error::{Result, VolumeError};
use crate::exec::CommandExecutor;
use crate::identifier::VolumeId;
use crate::resolver::WatcherProbe;
use crate::types::ImageInfo;

/// Bytes per MiB, the unit `rbd create --size` takes.
const BYTES_PER_MIB: u64 = 1024 * 1024;

/// An authenticated handle on a Ceph cluster.
pub struct RbdConnection {
    fsid: String,
    auth_args: Vec<String>,
    executor: Arc<dyn CommandExecutor>,
    rbd_path: String,
    ceph_path: String,
}

#[derive(Deserialize)]
struct FsidOutput {
    fsid: String,
}

#[derive(Deserialize)]
struct RbdInfoOutput {
    #[serde(default)]
    name: Option<String>,
    size: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Watchers {
    /// Pre-Nautilus: `{"watcher=10.0.0.1:0/123": {...}}`
    Map(serde_json::Map<String, serde_json::Value>),
    /// Nautilus and later: `[{"address": "...", ...}]`
    List(Vec<serde_json::Value>),
}

impl Watchers {
    fn is_empty(&self) -> bool {
        match self {
            Watchers::Map(m) => m.is_empty(),
            Watchers::List(l) => l.is_empty(),
        }
    }
}

#[derive(Deserialize)]
struct RbdStatusOutput {
    watchers: Option<Watchers>,
}

impl RbdConnection {
    pub fn new(
        fsid: impl Into<String>,
        auth_args: Vec<String>,
        executor: Arc<dyn CommandExecutor>,
        rbd_path: impl Into<String>,
        ceph_path: impl Into<String>,
    ) -> Self {
        Self {
            fsid: fsid.into(),
            auth_args,
            executor,
            rbd_path: rbd_path.into(),
            ceph_path: ceph_path.into(),
        }
    }

    /// Verify connectivity and credentials and return a live handle.
    #[instrument(skip(config, executor), fields(cluster = %config.cluster, user = %config.cephx_user))]
    pub async fn connect(config: &RbdConfig, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        debug!("Beginning RADOS connection attempt");

        let mut conn = Self::new(
            String::new(),
            config.auth_args(),
            executor,
            config.rbd_path.clone(),
            config.ceph_path.clone(),
        );

        let output = conn
            .ceph(&["fsid", "--format", "json"])
            .await
            .map_err(|e| VolumeError::BackendUnavailable(format!("Unable to create RADOS connection: {}", e)))?;

        conn.fsid = serde_json::from_str::<FsidOutput>(&output)
            .map(|o| o.fsid.trim().to_string())
            .map_err(|e| {
                VolumeError::BackendUnavailable(format!(
                    "Unable to create RADOS connection: unparseable fsid output: {}",
                    e
                ))
            })?;

        if conn.fsid.is_empty() {
            return Err(VolumeError::BackendUnavailable(
                "Unable to create RADOS connection: empty cluster fsid".into(),
            ));
        }

        info!(fsid = %conn.fsid, "RADOS connection created");
        Ok(conn)
    }

    /// Cluster fsid reported at connect time.
    pub fn fsid(&self) -> &str {
        &self.fsid
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let mut all_args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        all_args.extend(self.auth_args.iter().cloned());
        self.executor.run(program, &all_args).await
    }

    async fn rbd(&self, args: &[&str]) -> Result<String> {
        self.run(&self.rbd_path, args).await
    }

    async fn ceph(&self, args: &[&str]) -> Result<String> {
        self.run(&self.ceph_path, args).await
    }

    /// Every pool in the cluster.
    pub async fn list_pools(&self) -> Result<Vec<String>> {
        let output = self.ceph(&["osd", "pool", "ls", "--format", "json"]).await?;
        parse_name_list(&output, "ceph osd pool ls")
    }

    /// Image names in `pool`.
    pub async fn list_images(&self, pool: &str) -> Result<Vec<String>> {
        let output = self.rbd(&["ls", "--pool", pool, "--format", "json"]).await?;
        parse_name_list(&output, "rbd ls")
    }

    /// Size and name of one image.
    pub async fn image_info(&self, pool: &str, image: &str) -> Result<ImageInfo> {
        let output = self
            .rbd(&["info", "--pool", pool, image, "--format", "json"])
            .await
            .map_err(|e| not_found_or(e, pool, image))?;

        let info: RbdInfoOutput = serde_json::from_str(&output)
            .map_err(|e| VolumeError::Internal(format!("Failed to parse rbd info output: {}", e)))?;

        Ok(ImageInfo {
            pool: pool.to_string(),
            name: info.name.unwrap_or_else(|| image.to_string()),
            size_bytes: info.size,
        })
    }

    pub async fn image_exists(&self, pool: &str, image: &str) -> Result<bool> {
        match self.image_info(pool, image).await {
            Ok(_) => Ok(true),
            Err(VolumeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a layering-enabled image, rounding the size up to whole MiB.
    pub async fn create_image(&self, pool: &str, image: &str, size_bytes: u64) -> Result<()> {
        let size_mib = size_bytes.div_ceil(BYTES_PER_MIB).to_string();
        self.rbd(&[
            "create",
            "--size",
            &size_mib,
            "--image-feature",
            "layering",
            "--pool",
            pool,
            image,
        ])
        .await?;
        Ok(())
    }

    pub async fn remove_image(&self, pool: &str, image: &str) -> Result<()> {
        self.rbd(&["rm", "--pool", pool, image])
            .await
            .map_err(|e| not_found_or(e, pool, image))?;
        Ok(())
    }

    /// Whether any client holds a watch on the image.
    pub async fn image_has_watchers(&self, pool: &str, image: &str) -> Result<bool> {
        let output = self
            .rbd(&["status", "--pool", pool, image, "--format", "json"])
            .await
            .map_err(|e| not_found_or(e, pool, image))?;
        parse_watchers(&output, &format!("{}.{}", pool, image))
    }

    /// Map the image on this host and return the device path.
    pub async fn map(&self, pool: &str, image: &str) -> Result<String> {
        let output = self.rbd(&["map", "--pool", pool, image]).await?;
        let device = output.trim().to_string();
        if device.is_empty() {
            return Err(VolumeError::Internal(format!(
                "rbd map returned no device for {}/{}",
                pool, image
            )));
        }
        Ok(device)
    }

    pub async fn unmap(&self, device: &str) -> Result<()> {
        self.rbd(&["unmap", device]).await?;
        Ok(())
    }
}

impl fmt::Debug for RbdConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RbdConnection")
            .field("fsid", &self.fsid)
            .field("rbd_path", &self.rbd_path)
            .field("ceph_path", &self.ceph_path)
            .finish()
    }
}

#[async_trait]
impl WatcherProbe for RbdConnection {
    type Target = VolumeId;

    async fn has_watchers(&self, target: &VolumeId) -> Result<bool> {
        self.image_has_watchers(&target.pool, &target.image).await
    }
}

/// Map "image missing" CLI failures to `NotFound`.
fn not_found_or(err: VolumeError, pool: &str, image: &str) -> VolumeError {
    match err {
        VolumeError::CommandFailed { ref stderr, .. }
            if stderr.contains("No such file or directory") || stderr.contains("(2)") =>
        {
            VolumeError::NotFound(format!("{}.{}", pool, image))
        }
        other => other,
    }
}

fn parse_name_list(output: &str, what: &str) -> Result<Vec<String>> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(output)
        .map_err(|e| VolumeError::Internal(format!("Failed to parse {} output: {}", what, e)))
}

fn parse_watchers(output: &str, volume_id: &str) -> Result<bool> {
    let status: RbdStatusOutput =
        serde_json::from_str(output).map_err(|e| VolumeError::ProbeIndeterminate {
            volume_id: volume_id.to_string(),
            reason: format!("unparseable rbd status output: {}", e),
        })?;

    status
        .watchers
        .map(|w| !w.is_empty())
        .ok_or_else(|| VolumeError::ProbeIndeterminate {
            volume_id: volume_id.to_string(),
            reason: "rbd status reported no watchers field".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedExecutor;

    fn connection(exec: ScriptedExecutor) -> (RbdConnection, Arc<ScriptedExecutor>) {
        let exec = Arc::new(exec);
        let conn = RbdConnection::new(
            "fsid-1",
            RbdConfig::default().auth_args(),
            exec.clone(),
            "rbd",
            "ceph",
        );
        (conn, exec)
    }

    #[test]
    fn test_parse_watchers_both_formats() {
        assert!(parse_watchers(r#"{"watchers": {"w1": {"address": "10.0.0.1:0/1"}}}"#, "p.i").unwrap());
        assert!(!parse_watchers(r#"{"watchers": {}}"#, "p.i").unwrap());
        assert!(parse_watchers(r#"{"watchers": [{"address": "10.0.0.1:0/1"}]}"#, "p.i").unwrap());
        assert!(!parse_watchers(r#"{"watchers": []}"#, "p.i").unwrap());
    }

    #[test]
    fn test_parse_watchers_missing_field_is_indeterminate() {
        let err = parse_watchers(r#"{}"#, "p.i").unwrap_err();
        assert!(matches!(err, VolumeError::ProbeIndeterminate { .. }));
        let err = parse_watchers("not json", "p.i").unwrap_err();
        assert!(matches!(err, VolumeError::ProbeIndeterminate { .. }));
    }

    #[test]
    fn test_parse_name_list_empty_output() {
        assert!(parse_name_list("", "rbd ls").unwrap().is_empty());
        assert_eq!(parse_name_list(r#"["a","b"]"#, "rbd ls").unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_connect_reads_fsid() {
        let exec: Arc<dyn CommandExecutor> = Arc::new(
            ScriptedExecutor::new().respond("ceph fsid", r#"{"fsid":"8f5c-11ee"}"#),
        );
        let conn = RbdConnection::connect(&RbdConfig::default(), exec).await.unwrap();
        assert_eq!(conn.fsid(), "8f5c-11ee");
    }

    #[tokio::test]
    async fn test_connect_failure_is_backend_unavailable() {
        let exec: Arc<dyn CommandExecutor> = Arc::new(
            ScriptedExecutor::new().fail("ceph fsid", "error connecting to the cluster"),
        );
        let err = RbdConnection::connect(&RbdConfig::default(), exec).await.unwrap_err();
        assert!(matches!(err, VolumeError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_connect_unparseable_fsid_is_backend_unavailable() {
        for output in ["8f5c-11ee\n", "", r#"{"cluster":"ceph"}"#, r#"{"fsid":""}"#] {
            let exec: Arc<dyn CommandExecutor> =
                Arc::new(ScriptedExecutor::new().respond("ceph fsid", output));
            let err = RbdConnection::connect(&RbdConfig::default(), exec).await.unwrap_err();
            assert!(
                matches!(err, VolumeError::BackendUnavailable(_)),
                "{:?} should fail the connect, got {:?}",
                output,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_image_info_missing_is_not_found() {
        let (conn, _) = connection(ScriptedExecutor::new().fail(
            "rbd info --pool pool1 vol9",
            "rbd: error opening image vol9: (2) No such file or directory",
        ));
        let err = conn.image_info("pool1", "vol9").await.unwrap_err();
        assert!(matches!(err, VolumeError::NotFound(ref id) if id == "pool1.vol9"));
        assert!(!conn.image_exists("pool1", "vol9").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_image_rounds_up_to_mib_and_authenticates() {
        let (conn, exec) = connection(ScriptedExecutor::new().respond("rbd create", ""));
        conn.create_image("pool1", "vol1", 2 * 1024 * 1024 * 1024).await.unwrap();
        let calls = exec.calls();
        assert_eq!(
            calls[0],
            "rbd create --size 2048 --image-feature layering --pool pool1 vol1 --cluster ceph --id admin"
        );
    }

    #[tokio::test]
    async fn test_map_returns_trimmed_device() {
        let (conn, _) = connection(ScriptedExecutor::new().respond("rbd map", "/dev/rbd3\n"));
        assert_eq!(conn.map("pool1", "vol1").await.unwrap(), "/dev/rbd3");
    }
}
