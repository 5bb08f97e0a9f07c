//! Cryptographic primitives for tenantenc.
//!
//! This module provides:
//! - AES-256-GCM encryption and decryption (`encryption`)
//! - Master key parsing, key material generation, HKDF data keys (`keys`)
//! - The envelope cipher that wraps and uses tenant keys (`envelope`)
//! - Read-only decryption of pre-tenant-key legacy values (`legacy`)

pub mod encryption;
pub mod envelope;
pub mod keys;
pub mod legacy;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{EnvelopeCipher, MasterKey, ...};
pub use encryption::{decrypt, encrypt};
pub use envelope::EnvelopeCipher;
pub use keys::{derive_data_key, generate_key_material, MasterKey, DEFAULT_KEY_SIZE};
pub use legacy::LegacyDecryptor;
