//! Decision protocol messages.
//!
//! These are the plaintext JSON payloads exchanged between the decision
//! service and the remote device. They are always encrypted before they
//! reach the relay; the relay only ever sees ciphertext frames.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{CheckId, GateError};

/// Outbound check: one request the resource owner is asked to approve.
///
/// Wire shape: `{id, method, path, headers, sourceIP, timestamp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Check identifier, echoed back as `requestId` in the decision
    pub id: CheckId,
    /// HTTP method of the inbound request
    pub method: String,
    /// Path (including query) of the inbound request
    pub path: String,
    /// Request headers; keys are kept exactly as received
    pub headers: BTreeMap<String, String>,
    /// Address of the downstream client
    #[serde(rename = "sourceIP")]
    pub source_ip: String,
    /// Creation time, RFC 3339 in UTC on the wire
    #[serde(with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
}

impl CheckRequest {
    /// Create a check with a fresh id, stamped now.
    ///
    /// The timestamp is truncated to whole seconds, the precision it has
    /// on the wire.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        headers: BTreeMap<String, String>,
        source_ip: impl Into<String>,
    ) -> Self {
        Self {
            id: CheckId::new(),
            method: method.into(),
            path: path.into(),
            headers,
            source_ip: source_ip.into(),
            timestamp: Utc::now().trunc_subsecs(0),
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GateError> {
        serde_json::to_vec(self).map_err(GateError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GateError> {
        serde_json::from_slice(bytes).map_err(GateError::Deserialization)
    }
}

/// Inbound decision from the remote device.
///
/// Wire shape: `{requestId, approved}`. Unknown fields are ignored; both
/// fields are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The check this decision answers
    #[serde(rename = "requestId")]
    pub request_id: CheckId,
    /// `true` to let the request through
    pub approved: bool,
}

impl Decision {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GateError> {
        serde_json::to_vec(self).map_err(GateError::Serialization)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GateError> {
        serde_json::from_slice(bytes).map_err(GateError::Deserialization)
    }
}

/// RFC 3339 with second precision and a `Z` suffix.
mod rfc3339 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
