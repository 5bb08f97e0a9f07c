//! Master key handling, tenant key material generation, and data-key
//! derivation.
//!
//! The master key is supplied from outside (an environment variable in
//! the CLI) and only ever wraps tenant keys.  Tenant raw key material is
//! `key_size` random bytes; the AES-256 data key used for values is
//! derived from it with HKDF-SHA256 so that any configured size in
//! `16..=64` yields a full-strength 256-bit key.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{Result, TenantEncError};

/// Length of the master key and of derived data keys (256 bits).
pub const KEY_LEN: usize = 32;

/// Smallest allowed tenant key size in bytes.
pub const MIN_KEY_SIZE: usize = 16;

/// Largest allowed tenant key size in bytes.
pub const MAX_KEY_SIZE: usize = 64;

/// Default tenant key size in bytes.
pub const DEFAULT_KEY_SIZE: usize = 32;

/// HKDF info string binding derived keys to the `tenantenc:v1` scheme.
/// Changing it breaks every existing token.
const DATA_KEY_INFO: &[u8] = b"tenantenc:v1:data-key";

/// Optional prefix accepted on encoded master keys.
const MASTER_KEY_PREFIX: &str = "base64:";

/// A wrapper around the 32-byte master key that automatically zeroes
/// its memory when dropped.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse an encoded master key: `base64:<b64>` or bare base64.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim();
        let b64 = trimmed.strip_prefix(MASTER_KEY_PREFIX).unwrap_or(trimmed);
        if b64.is_empty() {
            return Err(TenantEncError::InvalidMasterKey("master key is empty".into()));
        }

        let mut decoded = Zeroizing::new(
            BASE64
                .decode(b64)
                .map_err(|e| TenantEncError::InvalidMasterKey(format!("not valid base64: {e}")))?,
        );

        if decoded.len() != KEY_LEN {
            return Err(TenantEncError::InvalidMasterKey(format!(
                "master key must decode to {KEY_LEN} bytes, got {}",
                decoded.len()
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::new(bytes))
    }

    /// Generate a fresh random master key (`tenantenc keygen`).
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| TenantEncError::KeyGenerationFailed(format!("OS RNG failure: {e}")))?;
        Ok(Self::new(bytes))
    }

    /// Encode as `base64:<b64>`, the format accepted by `from_encoded`.
    pub fn to_encoded(&self) -> String {
        format!("{MASTER_KEY_PREFIX}{}", BASE64.encode(self.bytes))
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Check that a configured tenant key size is within `16..=64`.
pub fn validate_key_size(key_size: usize) -> Result<()> {
    if !(MIN_KEY_SIZE..=MAX_KEY_SIZE).contains(&key_size) {
        return Err(TenantEncError::ConfigError(format!(
            "key_size must be between {MIN_KEY_SIZE} and {MAX_KEY_SIZE} bytes (got {key_size})"
        )));
    }
    Ok(())
}

/// Generate `len` bytes of cryptographically secure key material.
pub fn generate_key_material(len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut material = Zeroizing::new(vec![0u8; len]);
    OsRng
        .try_fill_bytes(&mut material)
        .map_err(|e| TenantEncError::KeyGenerationFailed(format!("OS RNG failure: {e}")))?;
    Ok(material)
}

/// Derive the AES-256 data key from a tenant's raw key material.
///
/// The raw material already has full entropy, so the extract step runs
/// with no salt.
pub fn derive_data_key(raw_key: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, raw_key);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(DATA_KEY_INFO, &mut okm[..])
        .map_err(|e| TenantEncError::EncryptionFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_parses_prefixed_and_bare_base64() {
        let key = MasterKey::new([7u8; KEY_LEN]);
        let encoded = key.to_encoded();
        assert!(encoded.starts_with("base64:"));

        let parsed = MasterKey::from_encoded(&encoded).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());

        let bare = encoded.trim_start_matches("base64:");
        let parsed = MasterKey::from_encoded(bare).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn master_key_rejects_wrong_length_and_garbage() {
        let short = BASE64.encode([1u8; 16]);
        assert!(matches!(
            MasterKey::from_encoded(&short),
            Err(TenantEncError::InvalidMasterKey(_))
        ));
        assert!(MasterKey::from_encoded("base64:***").is_err());
        assert!(MasterKey::from_encoded("").is_err());
        assert!(MasterKey::from_encoded("base64:").is_err());
    }

    #[test]
    fn master_key_debug_is_redacted() {
        let key = MasterKey::new([9u8; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "MasterKey(<redacted>)");
    }

    #[test]
    fn key_size_bounds() {
        assert!(validate_key_size(16).is_ok());
        assert!(validate_key_size(32).is_ok());
        assert!(validate_key_size(64).is_ok());
        assert!(validate_key_size(15).is_err());
        assert!(validate_key_size(65).is_err());
    }

    #[test]
    fn generated_material_has_requested_length() {
        let a = generate_key_material(48).unwrap();
        let b = generate_key_material(48).unwrap();
        assert_eq!(a.len(), 48);
        assert_ne!(*a, *b);
    }

    #[test]
    fn data_key_derivation_is_deterministic() {
        let raw = [0x42u8; 16];
        let k1 = derive_data_key(&raw).unwrap();
        let k2 = derive_data_key(&raw).unwrap();
        assert_eq!(*k1, *k2);

        let other = derive_data_key(&[0x43u8; 16]).unwrap();
        assert_ne!(*k1, *other);
    }
}
