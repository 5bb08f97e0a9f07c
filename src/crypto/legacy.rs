//! Read-only support for values written before per-tenant keys existed.
//!
//! The old scheme encrypted every value directly under the single
//! application key and stored `base64(nonce || ciphertext + tag)`.  Nothing
//! writes this format any more; it is only decrypted so that existing
//! settings stay readable until a rotation re-encrypts them.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroize;

use super::encryption::decrypt;
use super::keys::MasterKey;

/// Decrypts legacy application-key ciphertext.
#[derive(Debug, Clone)]
pub struct LegacyDecryptor {
    app_key: MasterKey,
}

impl LegacyDecryptor {
    pub fn new(app_key: MasterKey) -> Self {
        Self { app_key }
    }

    /// Attempt to decrypt a legacy value.  `None` if it is not valid
    /// base64, does not authenticate, or is not UTF-8.
    pub fn try_legacy_decrypt(&self, ciphertext: &str) -> Option<String> {
        let bytes = BASE64.decode(ciphertext.trim()).ok()?;
        let plaintext = decrypt(self.app_key.as_bytes(), &bytes)?;
        String::from_utf8(plaintext)
            .map_err(|e| e.into_bytes().zeroize())
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encryption::encrypt;

    fn legacy_value(key: &MasterKey, plaintext: &str) -> String {
        BASE64.encode(encrypt(key.as_bytes(), plaintext.as_bytes()).unwrap())
    }

    #[test]
    fn decrypts_legacy_values() {
        let key = MasterKey::new([0x21u8; 32]);
        let legacy = LegacyDecryptor::new(key.clone());
        let value = legacy_value(&key, "old-smtp-password");

        assert_eq!(
            legacy.try_legacy_decrypt(&value).as_deref(),
            Some("old-smtp-password")
        );
    }

    #[test]
    fn rejects_garbage_and_foreign_keys() {
        let legacy = LegacyDecryptor::new(MasterKey::new([0x21u8; 32]));
        assert_eq!(legacy.try_legacy_decrypt("not-a-token"), None);
        assert_eq!(legacy.try_legacy_decrypt(""), None);

        let other = MasterKey::new([0x22u8; 32]);
        assert_eq!(legacy.try_legacy_decrypt(&legacy_value(&other, "x")), None);
    }
}
