//! Driver configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::Credentials;

/// Which backend a driver instance talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Ceph RBD, driven through the `rbd`/`ceph` CLIs
    #[default]
    Rbd,
    /// Dell EMC XtremIO, driven through its REST API
    Xtremio,
    /// In-memory backend for development
    Mock,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Rbd => "rbd",
            BackendKind::Xtremio => "xtremio",
            BackendKind::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// Top-level driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Backend type
    pub backend: BackendKind,
    /// Identity reported on local attachments (detected if not set)
    pub instance_id: Option<String>,
    /// Ceph RBD settings
    pub rbd: RbdConfig,
    /// XtremIO settings
    pub xtremio: XtremioConfig,
}

/// Ceph RBD configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RbdConfig {
    /// Pool used for bare volume names
    pub default_pool: String,
    /// Ceph cluster name
    pub cluster: String,
    /// Monitor addresses (e.g., ["10.0.0.1:6789"]); empty uses ceph.conf
    pub monitors: Vec<String>,
    /// Use cephx authentication
    pub cephx: bool,
    /// cephx user, without the `client.` prefix
    pub cephx_user: String,
    /// Path to the keyring file
    pub keyring: Option<String>,
    /// rbd CLI binary path
    pub rbd_path: String,
    /// ceph CLI binary path
    pub ceph_path: String,
}

impl Default for RbdConfig {
    fn default() -> Self {
        Self {
            default_pool: "rbd".to_string(),
            cluster: "ceph".to_string(),
            monitors: Vec::new(),
            cephx: true,
            cephx_user: "admin".to_string(),
            keyring: None,
            rbd_path: "rbd".to_string(),
            ceph_path: "ceph".to_string(),
        }
    }
}

impl RbdConfig {
    /// Session key inputs. The monitors stand in for the endpoint and a
    /// disabled cephx counts as insecure.
    pub fn credentials(&self) -> Credentials {
        let endpoint = if self.monitors.is_empty() {
            self.cluster.clone()
        } else {
            self.monitors.join(",")
        };

        Credentials {
            endpoint,
            insecure: !self.cephx,
            user_name: self.cephx_user.clone(),
            password: self.keyring.clone().unwrap_or_default(),
        }
    }

    /// Arguments appended to every cluster command.
    pub fn auth_args(&self) -> Vec<String> {
        let mut args = vec!["--cluster".to_string(), self.cluster.clone()];

        if !self.monitors.is_empty() {
            args.push("--mon-host".to_string());
            args.push(self.monitors.join(","));
        }

        if self.cephx {
            args.push("--id".to_string());
            args.push(self.cephx_user.clone());

            if let Some(keyring) = &self.keyring {
                args.push("--keyring".to_string());
                args.push(keyring.clone());
            }
        }

        args
    }
}

/// XtremIO configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XtremioConfig {
    /// XMS REST endpoint (e.g., "https://xms.example.com")
    pub endpoint: String,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// XMS user
    pub user_name: String,
    /// XMS password
    pub password: String,
    /// Devices are exposed through device-mapper
    pub device_mapper: bool,
    /// Devices are exposed through multipath
    pub multipath: bool,
    /// Directory of persistent device links
    pub disk_by_id_path: String,
    /// File holding this host's iSCSI initiator name
    pub initiator_name_file: String,
}

impl Default for XtremioConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            insecure: false,
            user_name: String::new(),
            password: String::new(),
            device_mapper: false,
            multipath: false,
            disk_by_id_path: "/dev/disk/by-id".to_string(),
            initiator_name_file: "/etc/iscsi/initiatorname.iscsi".to_string(),
        }
    }
}

impl XtremioConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            endpoint: self.endpoint.clone(),
            insecure: self.insecure,
            user_name: self.user_name.clone(),
            password: self.password.clone(),
        }
    }

    /// Devices are named `dm-name-*` rather than `wwn-0x*`.
    pub fn uses_dm_names(&self) -> bool {
        self.device_mapper || self.multipath
    }
}

impl fmt::Debug for XtremioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "******" };
        f.debug_struct("XtremioConfig")
            .field("endpoint", &self.endpoint)
            .field("insecure", &self.insecure)
            .field("user_name", &self.user_name)
            .field("password", &password)
            .field("device_mapper", &self.device_mapper)
            .field("multipath", &self.multipath)
            .field("disk_by_id_path", &self.disk_by_id_path)
            .field("initiator_name_file", &self.initiator_name_file)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rbd_defaults() {
        let config = RbdConfig::default();
        assert_eq!(config.default_pool, "rbd");
        assert_eq!(config.auth_args(), vec!["--cluster", "ceph", "--id", "admin"]);
    }

    #[test]
    fn test_rbd_auth_args_with_monitors_and_keyring() {
        let config = RbdConfig {
            monitors: vec!["10.0.0.1:6789".into(), "10.0.0.2:6789".into()],
            cephx_user: "libvirt".into(),
            keyring: Some("/etc/ceph/ceph.client.libvirt.keyring".into()),
            ..Default::default()
        };
        let args = config.auth_args();
        assert!(args.windows(2).any(|w| w == ["--mon-host", "10.0.0.1:6789,10.0.0.2:6789"]));
        assert!(args.windows(2).any(|w| w == ["--id", "libvirt"]));
        assert!(args.contains(&"--keyring".to_string()));
    }

    #[test]
    fn test_rbd_credentials_ignore_keyring_in_fingerprint() {
        let a = RbdConfig {
            keyring: Some("/etc/ceph/a.keyring".into()),
            ..Default::default()
        };
        let b = RbdConfig {
            keyring: Some("/etc/ceph/b.keyring".into()),
            ..Default::default()
        };
        assert_eq!(a.credentials().fingerprint(), b.credentials().fingerprint());
        assert_eq!(a.credentials().endpoint, "ceph");
    }

    #[test]
    fn test_xtremio_debug_redacts_password() {
        let config = XtremioConfig {
            password: "secret".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_config_yaml_parsing() {
        let yaml = r#"
backend: xtremio
instance_id: iqn.1994-05.com.redhat:node-a
rbd:
  default_pool: volumes
xtremio:
  endpoint: https://xms.local
  user_name: admin
  password: pw
  multipath: true
"#;
        let config: DriverConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.backend, BackendKind::Xtremio);
        assert_eq!(config.rbd.default_pool, "volumes");
        assert_eq!(config.rbd.cephx_user, "admin");
        assert!(config.xtremio.uses_dm_names());
        assert_eq!(config.xtremio.disk_by_id_path, "/dev/disk/by-id");
    }
}
