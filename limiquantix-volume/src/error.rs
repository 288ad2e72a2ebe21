//! Error types for volume drivers.

use thiserror::Error;

/// Errors that can occur during volume operations.
#[derive(Error, Debug)]
pub enum VolumeError {
    /// A required setting is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Malformed volume identifier. Rejected before any backend call.
    #[error("Invalid volume ID: {0}")]
    InvalidIdentifier(String),

    /// Connection or authentication against the backend failed.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Volume does not exist.
    #[error("Volume not found: {0}")]
    NotFound(String),

    /// Volume already exists.
    #[error("Volume already exists: {0}")]
    AlreadyExists(String),

    /// The backend does not support this capability.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// The remote watcher check could not be completed.
    #[error("Attachment probe indeterminate for {volume_id}: {reason}")]
    ProbeIndeterminate {
        volume_id: String,
        reason: String,
    },

    /// The host's device bindings could not be enumerated.
    #[error("Local device enumeration unavailable: {0}")]
    EnumerationUnavailable(String),

    /// Volume has no binding on this host.
    #[error("Volume not attached: {0}")]
    NotAttached(String),

    /// A cached session belongs to a different backend.
    #[error("Session type mismatch: expected {expected}, found {found}")]
    SessionMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// An external program exited unsuccessfully.
    #[error("{command} failed: {stderr}")]
    CommandFailed {
        command: String,
        stderr: String,
    },

    /// A backend call failed; carries enough context to diagnose.
    #[error("{operation} failed for {pool}/{image}: {source}")]
    Backend {
        operation: &'static str,
        pool: String,
        image: String,
        #[source]
        source: Box<VolumeError>,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VolumeError {
    /// Wrap an error with the operation and volume coordinates it hit.
    ///
    /// Errors that callers branch on (`NotFound`, `AlreadyExists`,
    /// `BackendUnavailable`, `NotImplemented`) pass through unchanged.
    pub fn backend(
        operation: &'static str,
        pool: impl Into<String>,
        image: impl Into<String>,
        source: VolumeError,
    ) -> Self {
        match source {
            VolumeError::NotFound(_)
            | VolumeError::AlreadyExists(_)
            | VolumeError::BackendUnavailable(_)
            | VolumeError::NotImplemented(_) => source,
            source => VolumeError::Backend {
                operation,
                pool: pool.into(),
                image: image.into(),
                source: Box::new(source),
            },
        }
    }

    /// True when the backend lacks the requested capability.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, VolumeError::NotImplemented(_))
    }

    /// True when the volume does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VolumeError::NotFound(_))
    }
}

/// Result type alias for volume operations.
pub type Result<T> = std::result::Result<T, VolumeError>;
