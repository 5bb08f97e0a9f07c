//! Envelope cipher: wraps tenant keys under the master key and encrypts
//! values under an unwrapped tenant key.
//!
//! ```text
//! master key ──wraps──> tenant raw key (key_size bytes, stored wrapped)
//!                            │ HKDF-SHA256
//!                            ▼
//!                       AES-256 data key ──encrypts──> setting values
//! ```

use zeroize::{Zeroize, Zeroizing};

use super::encryption::{decrypt, encrypt};
use super::keys::{derive_data_key, generate_key_material, validate_key_size, MasterKey};
use crate::errors::{Result, TenantEncError};
use crate::store::{ActorId, KeyProvider, KeyRecord, NewKey};

/// Wraps, unwraps and uses tenant keys.
#[derive(Debug, Clone)]
pub struct EnvelopeCipher {
    master_key: MasterKey,
    key_size: usize,
}

impl EnvelopeCipher {
    /// Build a cipher for tenant keys of `key_size` bytes (16..=64).
    pub fn new(master_key: MasterKey, key_size: usize) -> Result<Self> {
        validate_key_size(key_size)?;
        Ok(Self {
            master_key,
            key_size,
        })
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Encrypt raw tenant key material under the master key.
    pub fn wrap_raw_key(&self, raw: &[u8]) -> Result<Vec<u8>> {
        if raw.len() != self.key_size {
            return Err(TenantEncError::EncryptionFailed(format!(
                "raw key must be {} bytes, got {}",
                self.key_size,
                raw.len()
            )));
        }
        encrypt(self.master_key.as_bytes(), raw)
    }

    /// Generate fresh key material and return it wrapped, ready to persist.
    pub fn new_key(&self, rotated_by: Option<ActorId>) -> Result<NewKey> {
        let raw = generate_key_material(self.key_size)?;
        Ok(NewKey {
            key_provider: KeyProvider::Local,
            key_reference: None,
            wrapped_key: self.wrap_raw_key(&raw)?,
            rotated_by,
        })
    }

    /// Decrypt a record's wrapped key with the master key.
    ///
    /// `KeyMaterialCorrupt` means the master key cannot open the blob
    /// (usually a misconfigured master key); `KeyMaterialInvalidLength`
    /// means it opened but holds the wrong amount of material.
    pub fn unwrap_raw_key(&self, record: &KeyRecord) -> Result<Zeroizing<Vec<u8>>> {
        let raw = decrypt(self.master_key.as_bytes(), &record.wrapped_key)
            .map(Zeroizing::new)
            .ok_or(TenantEncError::KeyMaterialCorrupt {
                tenant_id: record.tenant_id,
                version: record.key_version,
            })?;

        if raw.len() != self.key_size {
            return Err(TenantEncError::KeyMaterialInvalidLength {
                tenant_id: record.tenant_id,
                version: record.key_version,
                expected: self.key_size,
                actual: raw.len(),
            });
        }

        Ok(raw)
    }

    /// Authenticated encryption of `plaintext` under a tenant raw key.
    pub fn encrypt_with_key(&self, raw_key: &[u8], plaintext: &str) -> Result<Vec<u8>> {
        let data_key = derive_data_key(raw_key)?;
        encrypt(&data_key[..], plaintext.as_bytes())
    }

    /// Inverse of `encrypt_with_key`.  Any failure (tag mismatch, short
    /// input, non-UTF-8 plaintext) yields `None`.
    pub fn decrypt_with_key(&self, raw_key: &[u8], ciphertext: &[u8]) -> Option<String> {
        let data_key = derive_data_key(raw_key).ok()?;
        let plaintext = decrypt(&data_key[..], ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| {
                let mut bad_bytes = e.into_bytes();
                bad_bytes.zeroize();
            })
            .ok()
    }
}
