//! XtremIO Management Server REST client.

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::{Result, VolumeError};
use crate::resolver::WatcherProbe;
use crate::session::Credentials;

/// A volume entry from the volume list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRef {
    pub name: String,
    pub index: u64,
}

/// Volume details from `/api/json/types/volumes/<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XtremioVolume {
    pub name: String,
    pub index: u64,
    pub size_kib: u64,
    /// NAA identifier the volume is exported under
    pub naa_name: String,
    /// Initiator groups the volume is mapped to, when the XMS reports it
    pub lun_mappings: Option<u64>,
}

impl XtremioVolume {
    pub fn size_bytes(&self) -> u64 {
        self.size_kib.saturating_mul(1024)
    }

    /// Key the host's device links use for this volume: the trailing 16
    /// characters of the NAA name, lowercased.
    pub fn binding_key(&self) -> String {
        naa_suffix(&self.naa_name).unwrap_or_default()
    }
}

/// Trailing 16 characters of a device or NAA name, lowercased.
pub(crate) fn naa_suffix(name: &str) -> Option<String> {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() < 16 {
        return None;
    }
    Some(chars[chars.len() - 16..].iter().collect::<String>().to_lowercase())
}

/// Authenticated XMS client.
pub struct XtremioClient {
    http: reqwest::Client,
    endpoint: String,
    user_name: String,
    password: String,
}

impl XtremioClient {
    /// Build a client and confirm the XMS accepts the credentials.
    #[instrument(skip(credentials), fields(endpoint = %credentials.endpoint, user = %credentials.user_name))]
    pub async fn connect(credentials: &Credentials) -> Result<Self> {
        credentials.validate("xtremio")?;

        debug!("Beginning xtremio connection attempt");

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(credentials.insecure)
            .build()
            .map_err(|e| VolumeError::BackendUnavailable(format!("error creating xtremio client: {}", e)))?;

        let client = Self {
            http,
            endpoint: credentials.endpoint.trim_end_matches('/').to_string(),
            user_name: credentials.user_name.clone(),
            password: credentials.password.clone(),
        };

        client.get_json("/api/json/types").await.map_err(|e| match e {
            VolumeError::BackendUnavailable(_) => e,
            other => VolumeError::BackendUnavailable(format!("error creating xtremio client: {}", other)),
        })?;

        info!("xtremio connection created");
        Ok(client)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.endpoint, path);
        debug!(url = %url, "XMS request");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.user_name, Some(&self.password))
            .send()
            .await
            .map_err(|e| VolumeError::BackendUnavailable(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        match status {
            s if s.is_success() => response
                .json::<Value>()
                .await
                .map_err(|e| VolumeError::Internal(format!("Failed to parse XMS response from {}: {}", url, e))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VolumeError::BackendUnavailable(format!(
                "XMS rejected credentials for {}: {}",
                self.user_name, status
            ))),
            StatusCode::NOT_FOUND => Err(VolumeError::NotFound(path.to_string())),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(VolumeError::Internal(format!("XMS returned {} for {}: {}", status, url, body)))
            }
        }
    }

    /// Client that has not contacted the XMS.
    #[cfg(test)]
    pub(crate) fn unconnected(endpoint: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            user_name: "admin".into(),
            password: String::new(),
        }
    }

    /// Every volume on the array, by name and index.
    pub async fn volume_refs(&self) -> Result<Vec<VolumeRef>> {
        let body = self.get_json("/api/json/types/volumes").await?;
        parse_volume_refs(&body)
    }

    /// Details of the volume at `index`.
    pub async fn volume(&self, index: u64) -> Result<XtremioVolume> {
        let body = self
            .get_json(&format!("/api/json/types/volumes/{}", index))
            .await
            .map_err(|e| match e {
                VolumeError::NotFound(_) => VolumeError::NotFound(index.to_string()),
                other => other,
            })?;
        parse_volume(&body)
    }
}

impl fmt::Debug for XtremioClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XtremioClient")
            .field("endpoint", &self.endpoint)
            .field("user_name", &self.user_name)
            .finish()
    }
}

/// LUN mappings stand in for RBD watchers: a mapped volume is held by
/// some initiator group, which may or may not be this host's.
#[async_trait]
impl WatcherProbe for XtremioClient {
    type Target = XtremioVolume;

    async fn has_watchers(&self, target: &XtremioVolume) -> Result<bool> {
        target
            .lun_mappings
            .map(|n| n > 0)
            .ok_or_else(|| VolumeError::ProbeIndeterminate {
                volume_id: target.index.to_string(),
                reason: "XMS did not report num-of-lun-mappings".to_string(),
            })
    }
}

/// Trailing numeric segment of an href such as `.../volumes/12`.
fn index_from_href(href: &str) -> Result<u64> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| VolumeError::Internal(format!("No volume index in href {}", href)))
}

/// XMS reports most numbers as strings.
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_volume_refs(body: &Value) -> Result<Vec<VolumeRef>> {
    let volumes = body["volumes"]
        .as_array()
        .ok_or_else(|| VolumeError::Internal("XMS volume list has no volumes array".into()))?;

    volumes
        .iter()
        .map(|v| {
            let href = v["href"].as_str().unwrap_or_default();
            Ok(VolumeRef {
                name: v["name"].as_str().unwrap_or_default().to_string(),
                index: index_from_href(href)?,
            })
        })
        .collect()
}

fn parse_volume(body: &Value) -> Result<XtremioVolume> {
    let content = body
        .get("content")
        .ok_or_else(|| VolumeError::Internal("XMS volume response has no content".into()))?;

    let index = as_u64(&content["index"])
        .ok_or_else(|| VolumeError::Internal("XMS volume response has no index".into()))?;

    Ok(XtremioVolume {
        name: content["name"].as_str().unwrap_or_default().to_string(),
        index,
        size_kib: as_u64(&content["vol-size"]).unwrap_or(0),
        naa_name: content["naa-name"].as_str().unwrap_or_default().to_string(),
        lun_mappings: as_u64(&content["num-of-lun-mappings"]),
    })
}
