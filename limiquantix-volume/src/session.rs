//! Authenticated backend sessions, cached per credential fingerprint.
//!
//! Establishing a backend connection is expensive and connections are safe
//! to share, so each driver consults a [`SessionCache`] before connecting.
//! The cache is an ordinary value: drivers receive it as an
//! `Arc<SessionCache>`, and tests build a fresh one per case.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, VolumeError};
use crate::rbd::RbdConnection;
use crate::xtremio::XtremioClient;

/// Connection parameters for a backend login.
#[derive(Clone, Default)]
pub struct Credentials {
    pub endpoint: String,
    pub insecure: bool,
    pub user_name: String,
    pub password: String,
}

impl Credentials {
    /// Fail fast on settings a login can never succeed without.
    pub fn validate(&self, backend: &str) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(VolumeError::Configuration(format!(
                "No endpoint specified for {} cluster",
                backend
            )));
        }
        if self.user_name.is_empty() {
            return Err(VolumeError::Configuration(format!(
                "No userName specified for {} cluster",
                backend
            )));
        }
        Ok(())
    }

    /// Cache key for these credentials. The password is not part of it.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(&self.endpoint, self.insecure, &self.user_name)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "******" };
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("insecure", &self.insecure)
            .field("user_name", &self.user_name)
            .field("password", &password)
            .finish()
    }
}

/// One-way digest over `endpoint`, `insecure` and `user_name`, in that order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(endpoint: &str, insecure: bool, user_name: &str) -> Self {
        let mut ctx = md5::Context::new();
        ctx.consume(endpoint.as_bytes());
        ctx.consume(insecure.to_string().as_bytes());
        ctx.consume(user_name.as_bytes());
        Self(format!("{:x}", ctx.compute()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live backend connection, tagged with the backend it belongs to.
#[derive(Clone)]
pub enum SessionHandle {
    Rbd(Arc<RbdConnection>),
    Xtremio(Arc<XtremioClient>),
}

impl SessionHandle {
    /// Backend name, as used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionHandle::Rbd(_) => "rbd",
            SessionHandle::Xtremio(_) => "xtremio",
        }
    }

    pub fn into_rbd(self) -> Result<Arc<RbdConnection>> {
        match self {
            SessionHandle::Rbd(conn) => Ok(conn),
            other => Err(VolumeError::SessionMismatch {
                expected: "rbd",
                found: other.kind(),
            }),
        }
    }

    pub fn into_xtremio(self) -> Result<Arc<XtremioClient>> {
        match self {
            SessionHandle::Xtremio(client) => Ok(client),
            other => Err(VolumeError::SessionMismatch {
                expected: "xtremio",
                found: other.kind(),
            }),
        }
    }

    /// True when both handles point at the same connection.
    pub fn same_connection(&self, other: &SessionHandle) -> bool {
        match (self, other) {
            (SessionHandle::Rbd(a), SessionHandle::Rbd(b)) => Arc::ptr_eq(a, b),
            (SessionHandle::Xtremio(a), SessionHandle::Xtremio(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionHandle").field(&self.kind()).finish()
    }
}

/// Process-lifetime cache of backend sessions.
///
/// Entries are never evicted or health-checked; a connection that has gone
/// stale is handed out as-is until the process restarts.
///
/// The lock is held across the factory call, so first-time connects for
/// every fingerprint are serialized and a half-built session is never
/// visible.
#[derive(Default)]
pub struct SessionCache {
    sessions: Mutex<HashMap<Fingerprint, SessionHandle>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached session for `fingerprint`, or build one with `factory`.
    ///
    /// `factory` runs at most once per successful entry. Its error is
    /// returned as-is and nothing is stored, so the next call retries.
    pub async fn get_or_create<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        factory: F,
    ) -> Result<SessionHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionHandle>>,
    {
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(fingerprint) {
            debug!(cache_key = %fingerprint, "Using cached session");
            return Ok(session.clone());
        }

        let session = factory().await?;
        sessions.insert(fingerprint.clone(), session.clone());

        info!(cache_key = %fingerprint, backend = session.kind(), "Backend session created");
        Ok(session)
    }

    /// Number of cached sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
