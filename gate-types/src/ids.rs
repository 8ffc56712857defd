//! Identity types for 0k-Gate.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::GateError;

/// Number of hash bytes kept in a [`TenantId`].
pub const TENANT_ID_LEN: usize = 16;

/// Length of a [`TenantId`] rendered as URL-safe base64 (no padding).
pub const TENANT_ID_ENCODED_LEN: usize = 22;

/// Routing identifier for one decision-service / remote-device pairing.
///
/// Derived one-way from the tenant's symmetric key, so it can be published
/// as a URL path segment without revealing the key. Displayed as URL-safe
/// base64.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId([u8; TENANT_ID_LEN]);

impl TenantId {
    /// Derive a TenantId from raw key bytes.
    ///
    /// Domain-separated SHA-256, truncated to 128 bits.
    pub fn from_key(key: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"0k-gate-tenant-id-v1");
        hasher.update(key);
        let result = hasher.finalize();
        let mut bytes = [0u8; TENANT_ID_LEN];
        bytes.copy_from_slice(&result[..TENANT_ID_LEN]);
        Self(bytes)
    }

    /// Create a TenantId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == TENANT_ID_LEN {
            let mut arr = [0u8; TENANT_ID_LEN];
            arr.copy_from_slice(bytes);
            Some(Self(arr))
        } else {
            None
        }
    }

    /// Get the raw bytes of this TenantId.
    pub fn as_bytes(&self) -> &[u8; TENANT_ID_LEN] {
        &self.0
    }
}

impl FromStr for TenantId {
    type Err = GateError;

    /// Parse the URL path form. Anything that is not exactly 22 URL-safe
    /// base64 characters is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != TENANT_ID_ENCODED_LEN {
            return Err(GateError::InvalidTenantId(format!(
                "expected {} characters, got {}",
                TENANT_ID_ENCODED_LEN,
                s.len()
            )));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| GateError::InvalidTenantId(e.to_string()))?;
        Self::from_bytes(&bytes)
            .ok_or_else(|| GateError::InvalidTenantId("wrong decoded length".into()))
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", &self.to_string()[..8])
    }
}

/// Identifier of one in-flight authorization check.
///
/// UUID v7: time-ordered prefix plus random tail, so ids issued by one
/// service are distinguishable and never collide within a timeout window.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(uuid::Uuid);

impl CheckId {
    /// Create a fresh CheckId.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for CheckId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for CheckId {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| GateError::InvalidData(format!("check id: {e}")))
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckId({})", self.0)
    }
}
