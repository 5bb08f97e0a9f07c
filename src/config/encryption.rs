//! Validated runtime configuration handed to `TenantEncryption::new`.

use std::collections::HashSet;

use crate::crypto::keys::{validate_key_size, MasterKey, DEFAULT_KEY_SIZE};
use crate::errors::{Result, TenantEncError};
use crate::store::settings::parse_path;
use crate::store::KeyProvider;

/// Everything the encryption core needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    /// Wraps tenant keys.  Loaded once, never mutated.
    pub master_key: MasterKey,

    /// Application key of the legacy scheme; the master key when `None`.
    pub legacy_key: Option<MasterKey>,

    pub provider: KeyProvider,

    /// Raw tenant key size in bytes.
    pub key_size: usize,

    /// Settings paths that hold encrypted values and are re-encrypted on
    /// rotation.  A fixed allow-list; nothing else is ever scanned.
    pub encrypted_paths: Vec<String>,

    pub skip_unreadable_on_rotate: bool,
}

impl EncryptionConfig {
    /// Config with defaults and an empty allow-list.
    pub fn new(master_key: MasterKey) -> Self {
        Self {
            master_key,
            legacy_key: None,
            provider: KeyProvider::Local,
            key_size: DEFAULT_KEY_SIZE,
            encrypted_paths: Vec::new(),
            skip_unreadable_on_rotate: false,
        }
    }

    pub fn with_encrypted_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encrypted_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key_size(mut self, key_size: usize) -> Self {
        self.key_size = key_size;
        self
    }

    pub fn with_legacy_key(mut self, legacy_key: MasterKey) -> Self {
        self.legacy_key = Some(legacy_key);
        self
    }

    pub fn with_skip_unreadable_on_rotate(mut self, skip: bool) -> Self {
        self.skip_unreadable_on_rotate = skip;
        self
    }

    /// Reject key sizes outside 16..=64 and malformed or duplicate paths.
    pub fn validate(&self) -> Result<()> {
        validate_key_size(self.key_size)?;

        let mut seen = HashSet::new();
        for path in &self.encrypted_paths {
            parse_path(path).map_err(|_| {
                TenantEncError::ConfigError(format!("invalid encrypted path '{path}'"))
            })?;
            if !seen.insert(path.as_str()) {
                return Err(TenantEncError::ConfigError(format!(
                    "encrypted path '{path}' is listed twice"
                )));
            }
        }
        Ok(())
    }

    /// Whether `path` is on the rotation allow-list.
    pub fn is_encrypted_path(&self, path: &str) -> bool {
        self.encrypted_paths.iter().any(|p| p == path)
    }
}
