//! Key rotation.
//!
//! `run` performs one rotation inside a write transaction opened by
//! `TenantEncryption::rotate`.  It never commits anything itself: an error
//! from any step drops the transaction, which restores the old active key,
//! removes the new one, undoes rewritten settings and leaves no audit row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use zeroize::Zeroizing;

use crate::audit::{AuditSink, RotationAudit};
use crate::errors::{Result, TenantEncError};
use crate::service::TenantEncryption;
use crate::store::{ActorId, KeyProvider, KeyStore, SettingsStore, TenantId};
use crate::token;

/// Who asked for a rotation, and why.
#[derive(Debug, Clone)]
pub struct RotationRequest {
    pub tenant_id: TenantId,
    pub actor: Option<ActorId>,
    pub reason: Option<String>,
}

/// Outcome of a committed rotation.
#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub tenant_id: TenantId,
    pub old_version: u32,
    pub new_version: u32,
    pub provider: KeyProvider,
    /// Allow-listed values rewritten under the new key.
    pub reencrypted: usize,
    /// Unreadable values left untouched (only with
    /// `skip_unreadable_on_rotate`).
    pub skipped_paths: Vec<String>,
    pub reason: Option<String>,
    pub rotated_by: Option<ActorId>,
    pub rotated_at: DateTime<Utc>,
}

/// Rotate the tenant's key and re-encrypt the allow-listed settings.
///
/// `store` must be an exclusive write transaction.
pub fn run<S>(
    service: &TenantEncryption,
    store: &mut S,
    request: &RotationRequest,
) -> Result<RotationReport>
where
    S: KeyStore + SettingsStore + AuditSink,
{
    let tenant_id = request.tenant_id;
    let cipher = service.cipher();
    let config = service.config();

    // Unknown providers never get this far: loading the key row fails with
    // `UnsupportedProvider`.
    let old = service.active_key_or_create(store, tenant_id)?;
    store.retire(tenant_id, old.key_version, request.actor)?;
    let new = store.create_active_key(tenant_id, cipher.new_key(request.actor)?)?;
    let new_raw = cipher.unwrap_raw_key(&new)?;

    let mut reencrypted = 0;
    let mut skipped_paths = Vec::new();

    for path in &config.encrypted_paths {
        let Some(current) = store.get_path(tenant_id, path)? else {
            continue;
        };
        if current.is_empty() {
            continue;
        }

        // Old tokens resolve to the retired key by version; legacy values
        // fall through to the legacy decryptor and get migrated here.
        let plaintext = match service.decrypt_value(&*store, tenant_id, &current)? {
            Some(plaintext) => Zeroizing::new(plaintext),
            None if config.skip_unreadable_on_rotate => {
                warn!(tenant_id, path = %path, "leaving unreadable value in place");
                skipped_paths.push(path.clone());
                continue;
            }
            None => {
                return Err(TenantEncError::UnreadableSetting {
                    tenant_id,
                    path: path.clone(),
                })
            }
        };

        if token::decode(&current).is_none() {
            warn!(tenant_id, path = %path, "migrating legacy value to a versioned token");
        }

        let ciphertext = cipher.encrypt_with_key(&new_raw, &plaintext)?;
        store.set_path(tenant_id, path, &token::encode(new.key_version, &ciphertext))?;
        reencrypted += 1;
    }

    store.record_rotation(&RotationAudit {
        tenant_id,
        actor_id: request.actor,
        old_version: old.key_version,
        new_version: new.key_version,
        provider: new.key_provider,
        reencrypted,
        reason: request.reason.as_deref(),
    })?;

    Ok(RotationReport {
        tenant_id,
        old_version: old.key_version,
        new_version: new.key_version,
        provider: new.key_provider,
        reencrypted,
        skipped_paths,
        reason: request.reason.clone(),
        rotated_by: request.actor,
        rotated_at: new.activated_at,
    })
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    use super::*;
    use crate::config::EncryptionConfig;
    use crate::crypto::{encrypt, MasterKey};
    use crate::store::{KeyStatus, SqliteStore};

    const SMTP: &str = "mail.smtp.password";
    const STRIPE: &str = "billing.stripe.secret_key";

    fn master() -> MasterKey {
        MasterKey::new([0x42u8; 32])
    }

    fn service(skip_unreadable: bool) -> TenantEncryption {
        let config = EncryptionConfig::new(master())
            .with_encrypted_paths([SMTP, STRIPE])
            .with_skip_unreadable_on_rotate(skip_unreadable);
        TenantEncryption::new(SqliteStore::open_in_memory().unwrap(), config).unwrap()
    }

    fn stored(service: &TenantEncryption, tenant: TenantId, path: &str) -> Option<String> {
        service.store().read(|tx| tx.get_path(tenant, path)).unwrap()
    }

    fn put_raw(service: &TenantEncryption, tenant: TenantId, path: &str, value: &str) {
        service
            .store()
            .write(|tx| tx.set_path(tenant, path, value))
            .unwrap();
    }

    #[test]
    fn rotation_of_tenant_without_key_creates_then_rotates() {
        let service = service(false);
        let report = service.rotate(4, Some(1), None).unwrap();

        assert_eq!(report.old_version, 1);
        assert_eq!(report.new_version, 2);
        assert_eq!(report.reencrypted, 0);
        assert!(report.skipped_paths.is_empty());

        let keys = service.keys_for_tenant(4).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].status, KeyStatus::Retired);
        assert_eq!(keys[0].rotated_by, Some(1));
        assert_eq!(keys[1].status, KeyStatus::Active);
    }

    #[test]
    fn rewrites_allow_listed_values_under_new_version() {
        let service = service(false);
        service.store_encrypted_setting(9, SMTP, "smtp-pass").unwrap();
        service.store_encrypted_setting(9, STRIPE, "sk_live_1").unwrap();
        let before = stored(&service, 9, SMTP).unwrap();

        let report = service.rotate(9, Some(2), Some("scheduled")).unwrap();
        assert_eq!(report.reencrypted, 2);
        assert_eq!(report.reason.as_deref(), Some("scheduled"));

        let after = stored(&service, 9, SMTP).unwrap();
        assert_ne!(before, after);
        assert!(after.starts_with("tenantenc:v1:2:"));
        assert_eq!(
            service.read_encrypted_setting(9, STRIPE).unwrap().as_deref(),
            Some("sk_live_1")
        );
        assert_eq!(
            service.decrypt_for_tenant(9, &before).unwrap().as_deref(),
            Some("smtp-pass")
        );
    }

    #[test]
    fn empty_and_non_listed_values_are_left_alone() {
        let service = service(false);
        put_raw(&service, 3, SMTP, "");
        let outside = service
            .store_encrypted_setting(3, "crm.webhook.secret", "hook")
            .unwrap();

        let report = service.rotate(3, None, None).unwrap();
        assert_eq!(report.reencrypted, 0);
        assert_eq!(stored(&service, 3, SMTP).as_deref(), Some(""));
        assert_eq!(stored(&service, 3, "crm.webhook.secret"), Some(outside));
    }

    #[test]
    fn legacy_values_are_migrated_to_tokens() {
        let service = service(false);
        let legacy = BASE64.encode(encrypt(master().as_bytes(), b"legacy-secret").unwrap());
        put_raw(&service, 5, SMTP, &legacy);

        let report = service.rotate(5, None, None).unwrap();
        assert_eq!(report.reencrypted, 1);

        let migrated = stored(&service, 5, SMTP).unwrap();
        assert!(migrated.starts_with("tenantenc:v1:2:"));
        assert_eq!(
            service.decrypt_for_tenant(5, &migrated).unwrap().as_deref(),
            Some("legacy-secret")
        );
    }

    #[test]
    fn unreadable_value_rolls_back_everything() {
        let service = service(false);
        service.store_encrypted_setting(6, SMTP, "smtp-pass").unwrap();
        put_raw(&service, 6, STRIPE, "tenantenc:v1:99:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        let smtp_before = stored(&service, 6, SMTP);

        let err = service.rotate(6, Some(1), None).unwrap_err();
        match err {
            TenantEncError::RotationFailed { tenant_id, source } => {
                assert_eq!(tenant_id, 6);
                assert!(matches!(
                    *source,
                    TenantEncError::UnreadableSetting { ref path, .. } if path == STRIPE
                ));
            }
            other => panic!("unexpected error: {other}"),
        }

        let keys = service.keys_for_tenant(6).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].status, KeyStatus::Active);
        assert_eq!(stored(&service, 6, SMTP), smtp_before);
        assert!(service.store().audit_entries(Some(6), 10, None).unwrap().is_empty());
    }

    #[test]
    fn unreadable_value_is_skipped_when_configured() {
        let service = service(true);
        service.store_encrypted_setting(8, SMTP, "smtp-pass").unwrap();
        put_raw(&service, 8, STRIPE, "not-a-token");

        let report = service.rotate(8, None, None).unwrap();
        assert_eq!(report.new_version, 2);
        assert_eq!(report.reencrypted, 1);
        assert_eq!(report.skipped_paths, vec![STRIPE.to_string()]);
        assert_eq!(stored(&service, 8, STRIPE).as_deref(), Some("not-a-token"));
    }

    #[test]
    fn unknown_provider_row_blocks_rotation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("keys.db");
        let config = EncryptionConfig::new(master()).with_encrypted_paths([SMTP]);
        let service = TenantEncryption::new(SqliteStore::open(&path).unwrap(), config).unwrap();
        service.encrypt_for_tenant(12, "x").unwrap();

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute(
                "UPDATE tenant_encryption_keys SET key_provider = 'vault' WHERE tenant_id = 12",
                [],
            )
            .unwrap();

        let err = service.rotate(12, None, None).unwrap_err();
        assert!(matches!(
            err,
            TenantEncError::RotationFailed { ref source, .. }
                if matches!(**source, TenantEncError::UnsupportedProvider(ref p) if p == "vault")
        ));
        assert!(service.store().audit_entries(Some(12), 10, None).unwrap().is_empty());
    }

    #[test]
    fn audit_row_matches_report() {
        let service = service(false);
        service.store_encrypted_setting(2, SMTP, "smtp-pass").unwrap();
        service.rotate(2, Some(11), Some("compromise")).unwrap();

        let entries = service.store().audit_entries(Some(2), 10, None).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.operation, "rotate");
        assert_eq!(entry.actor_id, Some(11));
        assert_eq!(entry.old_version, Some(1));
        assert_eq!(entry.new_version, Some(2));
        assert_eq!(entry.provider, "local");
        assert_eq!(entry.reencrypted, 1);
        assert_eq!(entry.reason.as_deref(), Some("compromise"));
    }
}
