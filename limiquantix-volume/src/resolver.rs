//! Attachment state resolution.
//!
//! A volume bound on this host is `Attached`. Otherwise the backend is
//! asked whether any client holds the volume: yes means `Unavailable`, no
//! means `Available`. If that question cannot be answered the volume is
//! reported `Unknown` and the rest of the request carries on.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::attachments::{LocalAttachmentIndex, LocalDeviceEnumerator};
use crate::error::{Result, VolumeError};
use crate::types::{AttachmentRequest, AttachmentState, VolumeAttachment};

/// Asks the backend whether a volume has active remote clients.
#[async_trait]
pub trait WatcherProbe: Send + Sync {
    /// Backend coordinates of the volume being probed.
    type Target: Sync + ?Sized;

    async fn has_watchers(&self, target: &Self::Target) -> Result<bool>;
}

/// Outcome of resolving one volume.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub state: AttachmentState,
    pub attachments: Vec<VolumeAttachment>,
}

impl Resolution {
    /// Device path of the local attachment, when one was resolved.
    pub fn device_path(&self) -> Option<&str> {
        self.attachments
            .first()
            .and_then(|a| a.device_path.as_deref())
    }
}

/// Resolves attachment state for the volumes of one request.
///
/// The local index is captured once in [`AttachmentResolver::prepare`]
/// and reused for every volume of the request.
#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    request: AttachmentRequest,
    instance_id: String,
    index: Option<LocalAttachmentIndex>,
}

impl AttachmentResolver {
    /// Capture the host's bindings if `request` asks for attachments.
    ///
    /// When it does not, nothing is enumerated. Enumeration failure fails
    /// the whole request.
    pub async fn prepare(
        enumerator: &dyn LocalDeviceEnumerator,
        request: AttachmentRequest,
        instance_id: impl Into<String>,
    ) -> Result<Self> {
        let index = if request.requested() {
            let index = enumerator.snapshot().await?;
            debug!(bindings = index.len(), "Captured local attachment index");
            Some(index)
        } else {
            None
        };

        Ok(Self {
            request,
            instance_id: instance_id.into(),
            index,
        })
    }

    /// Resolver over an already captured index.
    pub fn with_index(
        request: AttachmentRequest,
        instance_id: impl Into<String>,
        index: LocalAttachmentIndex,
    ) -> Self {
        Self {
            request,
            instance_id: instance_id.into(),
            index: request.requested().then_some(index),
        }
    }

    pub fn request(&self) -> AttachmentRequest {
        self.request
    }

    /// Resolve one volume.
    ///
    /// `volume_id` is the public ID recorded on attachments, `binding_key`
    /// the key the local index uses for it, and `target` what `probe`
    /// needs to locate it on the backend.
    pub async fn resolve<P>(
        &self,
        volume_id: &str,
        binding_key: &str,
        probe: &P,
        target: &P::Target,
    ) -> Resolution
    where
        P: WatcherProbe + ?Sized,
    {
        let Some(index) = &self.index else {
            return Resolution::default();
        };

        if let Some(device) = index.device(binding_key) {
            let device_path = if !self.request.devices() {
                None
            } else if device.is_empty() {
                warn!(volume_id = %volume_id, "Device path requested but not resolvable");
                None
            } else {
                Some(device.to_string())
            };

            return Resolution {
                state: AttachmentState::Attached,
                attachments: vec![VolumeAttachment {
                    volume_id: volume_id.to_string(),
                    instance_id: self.instance_id.clone(),
                    device_path,
                }],
            };
        }

        let state = match probe.has_watchers(target).await {
            Ok(true) => AttachmentState::Unavailable,
            Ok(false) => AttachmentState::Available,
            Err(e) => {
                let e = match e {
                    e @ VolumeError::ProbeIndeterminate { .. } => e,
                    other => VolumeError::ProbeIndeterminate {
                        volume_id: volume_id.to_string(),
                        reason: other.to_string(),
                    },
                };
                warn!(volume_id = %volume_id, error = %e, "Watcher probe failed, attachment state unknown");
                AttachmentState::Unknown
            }
        };

        Resolution {
            state,
            attachments: Vec::new(),
        }
    }
}
