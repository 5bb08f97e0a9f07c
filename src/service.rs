//! Public entry point: encrypt, decrypt, rotate, and inspect tenant keys.
//!
//! `TenantEncryption` ties together the token codec, the key store, the
//! envelope cipher and the legacy decryptor.  Callers only ever see token
//! strings and plaintext; key records and raw key material stay inside.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EncryptionConfig;
use crate::crypto::{EnvelopeCipher, LegacyDecryptor};
use crate::errors::{Result, TenantEncError};
use crate::rotation::{self, RotationReport, RotationRequest};
use crate::store::{
    ActorId, KeyProvider, KeyRecord, KeyStore, KeySummary, SettingsStore, SqliteStore, TenantId,
};
use crate::token;

/// Read-only view of a tenant's key state.
#[derive(Debug, Clone, Serialize)]
pub struct TenantKeyMetadata {
    pub tenant_id: TenantId,
    pub provider: KeyProvider,
    /// `None` until the tenant's first encryption or rotation.
    pub active_key_version: Option<u32>,
    pub active_key_activated_at: Option<DateTime<Utc>>,
    pub supports_rotation: bool,
}

/// The tenant encryption facade.  Safe to share across threads
/// (`Arc<TenantEncryption>`); every call is tenant-scoped.
pub struct TenantEncryption {
    store: SqliteStore,
    cipher: EnvelopeCipher,
    legacy: LegacyDecryptor,
    config: EncryptionConfig,
}

impl TenantEncryption {
    pub fn new(store: SqliteStore, config: EncryptionConfig) -> Result<Self> {
        config.validate()?;
        let cipher = EnvelopeCipher::new(config.master_key.clone(), config.key_size)?;
        let legacy_key = config
            .legacy_key
            .clone()
            .unwrap_or_else(|| config.master_key.clone());

        Ok(Self {
            store,
            cipher,
            legacy: LegacyDecryptor::new(legacy_key),
            config,
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn config(&self) -> &EncryptionConfig {
        &self.config
    }

    pub(crate) fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    // ------------------------------------------------------------------
    // Encryption
    // ------------------------------------------------------------------

    /// Encrypt `plaintext` under the tenant's active key, creating the
    /// tenant's first key if needed.  Returns a `tenantenc:v1:<version>:...`
    /// token.
    pub fn encrypt_for_tenant(&self, tenant_id: TenantId, plaintext: &str) -> Result<String> {
        let record = self
            .resolve_active_key(tenant_id)
            .map_err(|e| key_initialization_failed(tenant_id, e))?;
        self.encrypt_with_record(&record, plaintext)
    }

    /// Encrypt `plaintext` and store the token at `path` in the tenant's
    /// settings, in one transaction.
    pub fn store_encrypted_setting(
        &self,
        tenant_id: TenantId,
        path: &str,
        plaintext: &str,
    ) -> Result<String> {
        if !self.config.is_encrypted_path(path) {
            warn!(
                tenant_id,
                path, "storing encrypted value outside the rotation allow-list"
            );
        }

        self.store.write(|tx| {
            let record = self
                .active_key_or_create(tx, tenant_id)
                .map_err(|e| key_initialization_failed(tenant_id, e))?;
            let token = self.encrypt_with_record(&record, plaintext)?;
            tx.set_path(tenant_id, path, &token)?;
            Ok(token)
        })
    }

    fn encrypt_with_record(&self, record: &KeyRecord, plaintext: &str) -> Result<String> {
        let raw = self
            .cipher
            .unwrap_raw_key(record)
            .map_err(|e| key_initialization_failed(record.tenant_id, e))?;
        let ciphertext = self.cipher.encrypt_with_key(&raw, plaintext)?;
        Ok(token::encode(record.key_version, &ciphertext))
    }

    /// Fast path without the write lock; only first use takes it.
    fn resolve_active_key(&self, tenant_id: TenantId) -> Result<KeyRecord> {
        if let Some(record) = self.store.read(|tx| tx.active_key(tenant_id))? {
            return Ok(record);
        }
        self.store
            .write(|tx| self.active_key_or_create(tx, tenant_id))
    }

    /// Must run inside a write transaction.
    pub(crate) fn active_key_or_create(
        &self,
        keys: &mut impl KeyStore,
        tenant_id: TenantId,
    ) -> Result<KeyRecord> {
        let mut created = false;
        let record = keys.active_key_or_create(tenant_id, &mut || {
            created = true;
            self.cipher.new_key(None)
        })?;

        if created {
            info!(
                tenant_id,
                key_version = record.key_version,
                provider = %record.key_provider,
                "created tenant encryption key"
            );
        }
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Decryption
    // ------------------------------------------------------------------

    /// Decrypt a token (or legacy value) for a tenant.
    ///
    /// Unreadable input (foreign strings, malformed tokens, unknown key
    /// versions, tampered payloads) yields `Ok(None)`.  `Err` is reserved
    /// for storage failures and broken key material.
    pub fn decrypt_for_tenant(&self, tenant_id: TenantId, value: &str) -> Result<Option<String>> {
        let Some((version, payload)) = token::decode(value) else {
            return Ok(self.decrypt_unversioned(tenant_id, value));
        };
        self.store
            .read(|tx| self.decrypt_token(tx, tenant_id, version, &payload))
    }

    /// Read `path` from the tenant's settings and decrypt it.
    pub fn read_encrypted_setting(&self, tenant_id: TenantId, path: &str) -> Result<Option<String>> {
        self.store.read(|tx| match tx.get_path(tenant_id, path)? {
            Some(value) => self.decrypt_value(tx, tenant_id, &value),
            None => Ok(None),
        })
    }

    /// Decrypt using an already open transaction.  Retired keys are still
    /// looked up by version, so old tokens keep working after rotation.
    pub(crate) fn decrypt_value(
        &self,
        keys: &impl KeyStore,
        tenant_id: TenantId,
        value: &str,
    ) -> Result<Option<String>> {
        match token::decode(value) {
            Some((version, payload)) => self.decrypt_token(keys, tenant_id, version, &payload),
            None => Ok(self.decrypt_unversioned(tenant_id, value)),
        }
    }

    fn decrypt_token(
        &self,
        keys: &impl KeyStore,
        tenant_id: TenantId,
        version: u32,
        payload: &[u8],
    ) -> Result<Option<String>> {
        let Some(record) = keys.key_by_version(tenant_id, version)? else {
            debug!(tenant_id, key_version = version, "token names an unknown key version");
            return Ok(None);
        };

        let raw = self.cipher.unwrap_raw_key(&record)?;
        let plaintext = self.cipher.decrypt_with_key(&raw, payload);
        if plaintext.is_none() {
            debug!(tenant_id, key_version = version, "token failed authentication");
        }
        Ok(plaintext)
    }

    fn decrypt_unversioned(&self, tenant_id: TenantId, value: &str) -> Option<String> {
        if token::has_prefix(value) {
            debug!(tenant_id, "malformed versioned token");
            return None;
        }
        let plaintext = self.legacy.try_legacy_decrypt(value);
        if plaintext.is_none() {
            debug!(tenant_id, "value is neither a token nor legacy ciphertext");
        }
        plaintext
    }

    // ------------------------------------------------------------------
    // Rotation and introspection
    // ------------------------------------------------------------------

    /// Rotate the tenant's key and re-encrypt every allow-listed setting,
    /// atomically.  On failure nothing changes and no audit row is written.
    pub fn rotate(
        &self,
        tenant_id: TenantId,
        actor: Option<ActorId>,
        reason: Option<&str>,
    ) -> Result<RotationReport> {
        let request = RotationRequest {
            tenant_id,
            actor,
            reason: reason.map(str::to_string),
        };

        let result = self.store.write(|tx| rotation::run(self, tx, &request));

        match result {
            Ok(report) => {
                info!(
                    tenant_id,
                    old_version = report.old_version,
                    new_version = report.new_version,
                    reencrypted = report.reencrypted,
                    skipped = report.skipped_paths.len(),
                    "rotated tenant encryption key"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(tenant_id, error = %e, "key rotation rolled back");
                Err(TenantEncError::RotationFailed {
                    tenant_id,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Provider and active key of a tenant.  Never creates a key.
    pub fn metadata_for_tenant(&self, tenant_id: TenantId) -> Result<TenantKeyMetadata> {
        let active = self.store.read(|tx| tx.active_key(tenant_id))?;
        let provider = active
            .as_ref()
            .map_or(self.config.provider, |record| record.key_provider);

        Ok(TenantKeyMetadata {
            tenant_id,
            provider,
            active_key_version: active.as_ref().map(|r| r.key_version),
            active_key_activated_at: active.as_ref().map(|r| r.activated_at),
            supports_rotation: provider.supports_rotation(),
        })
    }

    /// Every key version of the tenant, without key material.
    pub fn keys_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<KeySummary>> {
        let keys = self.store.read(|tx| tx.list_keys(tenant_id))?;
        Ok(keys.iter().map(KeyRecord::summary).collect())
    }
}

fn key_initialization_failed(tenant_id: TenantId, e: TenantEncError) -> TenantEncError {
    match e {
        already @ TenantEncError::KeyInitializationFailed { .. } => already,
        other => TenantEncError::KeyInitializationFailed {
            tenant_id,
            source: Box::new(other),
        },
    }
}
