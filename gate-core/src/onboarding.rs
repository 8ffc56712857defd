//! Onboarding links for the remote device.
//!
//! The decision service hands its tenant key to the resource owner's device
//! through a URL of the form:
//!
//! ```text
//! <base>/s/<tenantID>#key=<encodedKey>
//! ```
//!
//! The key lives in the fragment, which compliant clients never send to any
//! server, so the relay that serves the device page never learns it. The
//! tenant id in the path is what the device uses to pick its relay route.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use zeroize::{Zeroize, ZeroizeOnDrop};
use zerok_gate_types::TenantId;

/// Path segment the device page is served under.
pub const DEVICE_PATH: &str = "s";

/// Size of a tenant key in bytes.
pub const KEY_LEN: usize = 32;

/// Error type for onboarding link handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingError {
    /// The URL does not have the `<base>/s/<tenant>#key=<key>` shape.
    InvalidUrl(String),
    /// The key could not be decoded.
    InvalidKey(String),
    /// The tenant id in the path is not the one derived from the key.
    TenantMismatch,
}

impl std::fmt::Display for OnboardingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnboardingError::InvalidUrl(msg) => write!(f, "invalid onboarding url: {}", msg),
            OnboardingError::InvalidKey(msg) => write!(f, "invalid key encoding: {}", msg),
            OnboardingError::TenantMismatch => {
                write!(f, "tenant id does not match the key in the fragment")
            }
        }
    }
}

impl std::error::Error for OnboardingError {}

/// Encode a tenant key for the URL fragment.
pub fn encode_key(key: &[u8; KEY_LEN]) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

/// Decode a tenant key from its fragment form.
pub fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN], OnboardingError> {
    let mut bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| OnboardingError::InvalidKey(e.to_string()))?;
    if bytes.len() != KEY_LEN {
        let len = bytes.len();
        bytes.zeroize();
        return Err(OnboardingError::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_LEN, len
        )));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(key)
}

/// Everything a remote device needs to join a tenant.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OnboardingLink {
    #[zeroize(skip)]
    base_url: String,
    #[zeroize(skip)]
    tenant_id: TenantId,
    key: [u8; KEY_LEN],
}

impl OnboardingLink {
    /// Build a link for the given device base URL and key.
    ///
    /// The tenant id is derived from the key, so the two can never disagree.
    pub fn new(base_url: &str, key: &[u8; KEY_LEN]) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant_id: TenantId::from_key(key),
            key: *key,
        }
    }

    /// Parse a link produced by [`OnboardingLink::to_url`].
    ///
    /// The fragment may carry other `&`-separated parameters; only `key` is
    /// read.
    pub fn parse(url: &str) -> Result<Self, OnboardingError> {
        let (location, fragment) = url
            .split_once('#')
            .ok_or_else(|| OnboardingError::InvalidUrl("missing #key fragment".into()))?;

        let encoded_key = fragment
            .split('&')
            .find_map(|pair| pair.strip_prefix("key="))
            .ok_or_else(|| OnboardingError::InvalidUrl("fragment has no key".into()))?;
        let key = decode_key(encoded_key)?;

        let (prefix, tenant) = location
            .trim_end_matches('/')
            .rsplit_once('/')
            .ok_or_else(|| OnboardingError::InvalidUrl("missing tenant path".into()))?;
        let base_url = prefix
            .strip_suffix(&format!("/{DEVICE_PATH}"))
            .ok_or_else(|| {
                OnboardingError::InvalidUrl(format!("expected /{DEVICE_PATH}/<tenant> path"))
            })?;
        let tenant_id: TenantId = tenant
            .parse()
            .map_err(|e: zerok_gate_types::GateError| OnboardingError::InvalidUrl(e.to_string()))?;

        let link = Self::new(base_url, &key);
        if link.tenant_id != tenant_id {
            return Err(OnboardingError::TenantMismatch);
        }
        Ok(link)
    }

    /// Render as `<base>/s/<tenantID>#key=<encodedKey>`.
    pub fn to_url(&self) -> String {
        format!(
            "{}/{}/{}#key={}",
            self.base_url,
            DEVICE_PATH,
            self.tenant_id,
            encode_key(&self.key)
        )
    }

    /// The device page URL without the fragment; safe to log.
    pub fn page_url(&self) -> String {
        format!("{}/{}/{}", self.base_url, DEVICE_PATH, self.tenant_id)
    }

    /// The tenant this link onboards onto.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The raw key bytes.
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// The device base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// Intentionally opaque debug to avoid logging the key
impl std::fmt::Debug for OnboardingLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnboardingLink")
            .field("base_url", &self.base_url)
            .field("tenant_id", &self.tenant_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
