//! Tenant key and frame encryption for 0k-Gate.
//!
//! Every payload crossing the relay is sealed under the tenant key with
//! XChaCha20-Poly1305. A frame on the wire is:
//!
//! ```text
//! nonce (24 bytes) || ciphertext + tag (16 bytes)
//! ```
//!
//! # Security Notes
//!
//! - XChaCha20 uses 192-bit nonces (24 bytes), safe for random generation
//! - Decryption failures never reveal which of key, nonce or tag was wrong
//! - The relay sees only frame lengths and the tenant id

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};
use zerok_gate_core::{decode_key, encode_key, OnboardingLink};
use zerok_gate_types::TenantId;

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Key size for XChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (short frame, wrong key or authentication error).
    #[error("decryption failed: authentication error")]
    DecryptionFailed,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Key could not be generated or decoded.
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),
}

/// The symmetric key shared by a decision service and its remote device.
///
/// The tenant id is derived from it, so holding the key is what makes a
/// party a member of the tenant.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TenantKey([u8; KEY_SIZE]);

impl TenantKey {
    /// Generate a fresh random key.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_SIZE];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(key))
    }

    /// Decode a key from its URL-safe base64 form.
    pub fn decode(encoded: &str) -> Result<Self, CryptoError> {
        decode_key(encoded)
            .map(Self)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))
    }

    /// Take the key out of an onboarding link.
    pub fn from_onboarding(link: &OnboardingLink) -> Self {
        Self(*link.key())
    }

    /// URL-safe base64 form, as carried in the onboarding fragment.
    pub fn encode(&self) -> String {
        encode_key(&self.0)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// The tenant id derived from this key.
    pub fn tenant_id(&self) -> TenantId {
        TenantId::from_key(&self.0)
    }

    /// Onboarding link for a device page served under `base_url`.
    pub fn onboarding_link(&self, base_url: &str) -> OnboardingLink {
        OnboardingLink::new(base_url, &self.0)
    }

    /// Seal a payload into a relay frame (`nonce || ciphertext`).
    ///
    /// A fresh random 192-bit nonce is drawn for every call.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let nonce = XNonce::from_slice(&nonce_bytes);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed("aead encrypt failed".into()))?;

        let mut frame = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        frame.extend_from_slice(&nonce_bytes);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Open a relay frame.
    ///
    /// Frames shorter than nonce + tag, tampered frames and frames sealed
    /// under another key all fail with [`CryptoError::DecryptionFailed`].
    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if frame.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }
        let (nonce, ciphertext) = frame.split_at(NONCE_SIZE);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

// Don't leak keys in debug output
impl std::fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TenantKey([REDACTED])")
    }
}
