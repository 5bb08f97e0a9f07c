//! Persistence-facing types and traits.
//!
//! This module provides:
//! - `KeyRecord` and friends, one row per tenant per key version
//! - the `KeyStore` trait the facade and rotation coordinator talk to
//! - the `SettingsStore` collaborator trait (`settings`)
//! - a SQLite implementation of both (`sqlite`)

pub mod settings;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TenantEncError};

pub use settings::SettingsStore;
pub use sqlite::{SqliteStore, StoreTx};

/// Identifier of the owning tenant.
pub type TenantId = i64;

/// Identifier of the actor (user) that triggered a rotation.
pub type ActorId = i64;

/// Where a tenant key's material lives.
///
/// Only `local` (material wrapped under the master key and stored in the
/// key row) exists.  Any other provider name is rejected instead of being
/// treated as local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyProvider {
    Local,
}

impl KeyProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyProvider::Local => "local",
        }
    }

    /// Every provider this build supports can rotate.
    pub fn supports_rotation(self) -> bool {
        match self {
            KeyProvider::Local => true,
        }
    }
}

impl fmt::Display for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyProvider {
    type Err = TenantEncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(KeyProvider::Local),
            other => Err(TenantEncError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Lifecycle state of a key row.  `Active -> Retired` happens exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Retired,
}

impl KeyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Retired => "retired",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = TenantEncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(KeyStatus::Active),
            "retired" => Ok(KeyStatus::Retired),
            other => Err(TenantEncError::SerializationError(format!(
                "unknown key status '{other}'"
            ))),
        }
    }
}

/// A persisted tenant encryption key.
///
/// `wrapped_key` is the raw key material encrypted under the master key;
/// only the envelope cipher knows how to open it.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub id: i64,
    pub tenant_id: TenantId,
    pub key_version: u32,
    pub key_provider: KeyProvider,
    pub key_reference: Option<String>,
    pub wrapped_key: Vec<u8>,
    pub status: KeyStatus,
    pub activated_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
    pub rotated_by: Option<ActorId>,
}

impl KeyRecord {
    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }

    /// Metadata view without key material.
    pub fn summary(&self) -> KeySummary {
        KeySummary {
            key_version: self.key_version,
            key_provider: self.key_provider,
            key_reference: self.key_reference.clone(),
            status: self.status,
            activated_at: self.activated_at,
            retired_at: self.retired_at,
            rotated_by: self.rotated_by,
        }
    }
}

/// Lightweight metadata about a key version (no wrapped material).
#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    pub key_version: u32,
    pub key_provider: KeyProvider,
    pub key_reference: Option<String>,
    pub status: KeyStatus,
    pub activated_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
    pub rotated_by: Option<ActorId>,
}

/// Fields supplied by the caller when a new active key is persisted.
/// The version is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewKey {
    pub key_provider: KeyProvider,
    pub key_reference: Option<String>,
    pub wrapped_key: Vec<u8>,
    pub rotated_by: Option<ActorId>,
}

/// Tenant-scoped access to key records.
///
/// Mutating methods must run inside an exclusive transaction (see
/// `SqliteStore::write`); that is what makes `active_key_or_create` and
/// rotation race-free across threads and processes.
pub trait KeyStore {
    /// The single active key of the tenant, if one exists yet.
    fn active_key(&self, tenant_id: TenantId) -> Result<Option<KeyRecord>>;

    /// Point lookup of any key version, active or retired.
    fn key_by_version(&self, tenant_id: TenantId, version: u32) -> Result<Option<KeyRecord>>;

    /// Highest version ever created for the tenant.
    fn max_version(&self, tenant_id: TenantId) -> Result<Option<u32>>;

    /// Persist `new_key` as the tenant's active key with version
    /// `max_version + 1` (or 1).  Fails if an active key already exists.
    fn create_active_key(&mut self, tenant_id: TenantId, new_key: NewKey) -> Result<KeyRecord>;

    /// Flip a key to `retired`, stamping `retired_at` and `rotated_by`.
    /// Retiring an already retired key is a no-op.
    fn retire(&mut self, tenant_id: TenantId, version: u32, actor: Option<ActorId>) -> Result<()>;

    /// Every key version of the tenant, oldest first.
    fn list_keys(&self, tenant_id: TenantId) -> Result<Vec<KeyRecord>>;

    /// Return the active key, creating it with `mint` if the tenant has
    /// none.  `mint` only runs when a key is actually created.
    fn active_key_or_create(
        &mut self,
        tenant_id: TenantId,
        mint: &mut dyn FnMut() -> Result<NewKey>,
    ) -> Result<KeyRecord> {
        if let Some(record) = self.active_key(tenant_id)? {
            return Ok(record);
        }
        let new_key = mint()?;
        self.create_active_key(tenant_id, new_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_local_only() {
        assert_eq!("local".parse::<KeyProvider>().unwrap(), KeyProvider::Local);
        assert_eq!(" LOCAL ".parse::<KeyProvider>().unwrap(), KeyProvider::Local);
        assert!(matches!(
            "aws-kms".parse::<KeyProvider>(),
            Err(TenantEncError::UnsupportedProvider(name)) if name == "aws-kms"
        ));
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in [KeyStatus::Active, KeyStatus::Retired] {
            assert_eq!(status.as_str().parse::<KeyStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<KeyStatus>().is_err());
    }
}
