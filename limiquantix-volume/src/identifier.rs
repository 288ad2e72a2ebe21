//! Compound volume identifiers.
//!
//! Image names are only unique within a pool, so the public volume ID is
//! `<pool>.<image>`. A bare `<image>` is accepted and placed in the
//! configured default pool.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VolumeError};

static POOL_AND_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Za-z_]+)\.([0-9A-Za-z_]+)$").expect("valid regex"));

static BARE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Za-z_]+$").expect("valid regex"));

/// A volume's pool and image name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeId {
    pub pool: String,
    pub image: String,
}

impl VolumeId {
    /// Build an identifier from already-valid parts.
    pub fn new(pool: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            image: image.into(),
        }
    }

    /// Serialized form, `<pool>.<image>`.
    pub fn encode(&self) -> String {
        format!("{}.{}", self.pool, self.image)
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pool, self.image)
    }
}

/// Parses volume IDs against a backend's default pool.
#[derive(Debug, Clone)]
pub struct VolumeIdCodec {
    default_pool: String,
}

impl VolumeIdCodec {
    pub fn new(default_pool: impl Into<String>) -> Self {
        Self {
            default_pool: default_pool.into(),
        }
    }

    pub fn default_pool(&self) -> &str {
        &self.default_pool
    }

    /// Encode a pool and image into a public volume ID.
    pub fn encode(&self, pool: &str, image: &str) -> String {
        VolumeId::new(pool, image).encode()
    }

    /// Decode a public volume ID.
    ///
    /// Anything other than `<pool>.<image>` or a bare `<image>` made of
    /// ASCII letters, digits and `_` is rejected; names with stray dots are never guessed at.
    pub fn decode(&self, id: &str) -> Result<VolumeId> {
        if let Some(caps) = POOL_AND_IMAGE.captures(id) {
            return Ok(VolumeId::new(&caps[1], &caps[2]));
        }

        if !BARE_NAME.is_match(id) {
            return Err(VolumeError::InvalidIdentifier(id.to_string()));
        }

        if self.default_pool.is_empty() {
            return Err(VolumeError::Configuration(format!(
                "volume ID {} has no pool and no default pool is configured",
                id
            )));
        }

        Ok(VolumeId::new(self.default_pool.clone(), id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> VolumeIdCodec {
        VolumeIdCodec::new("rbd")
    }

    #[test]
    fn test_decode_pool_and_image() {
        let id = codec().decode("pool1.vol1").unwrap();
        assert_eq!(id, VolumeId::new("pool1", "vol1"));
    }

    #[test]
    fn test_decode_bare_name_uses_default_pool() {
        let id = codec().decode("data").unwrap();
        assert_eq!(id, VolumeId::new("rbd", "data"));
    }

    #[test]
    fn test_decode_rejects_extra_dots() {
        for bad in ["pool1.vol1.extra", "pool1.", ".vol1", "a..b", "", "vol-1", "pool/vol", "pööl.vol", "données", "卷1", "pool.vol٣"] {
            let err = codec().decode(bad).unwrap_err();
            assert!(
                matches!(err, VolumeError::InvalidIdentifier(_)),
                "{:?} should be rejected, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_decode_bare_name_without_default_pool() {
        let err = VolumeIdCodec::new("").decode("data").unwrap_err();
        assert!(matches!(err, VolumeError::Configuration(_)));
    }

    #[test]
    fn test_round_trip() {
        let codec = codec();
        for (pool, image) in [("rbd", "vol1"), ("pool_2", "img_9"), ("a", "b"), ("Pool", "_x")] {
            let encoded = codec.encode(pool, image);
            assert_eq!(codec.decode(&encoded).unwrap(), VolumeId::new(pool, image));
        }
    }

    #[test]
    fn test_display_matches_encode() {
        let id = VolumeId::new("pool1", "vol1");
        assert_eq!(id.to_string(), id.encode());
    }
}
