use thiserror::Error;

use crate::store::TenantId;

/// All errors that can occur in tenantenc.
///
/// Per-value decryption failures are not errors: `decrypt_for_tenant`
/// reports them as `Ok(None)`. Everything here is structural or a
/// configuration problem and is meant to abort loudly.
#[derive(Debug, Error)]
pub enum TenantEncError {
    // --- Key lifecycle errors ---
    #[error("Cannot initialize encryption key for tenant {tenant_id}: {source}")]
    KeyInitializationFailed {
        tenant_id: TenantId,
        #[source]
        source: Box<TenantEncError>,
    },

    #[error("Wrapped key v{version} for tenant {tenant_id} cannot be unwrapped (check the master key)")]
    KeyMaterialCorrupt { tenant_id: TenantId, version: u32 },

    #[error("Key v{version} for tenant {tenant_id} has invalid length {actual} (expected {expected})")]
    KeyMaterialInvalidLength {
        tenant_id: TenantId,
        version: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported key provider '{0}' (only 'local' is supported)")]
    UnsupportedProvider(String),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid master key: {0}")]
    InvalidMasterKey(String),

    // --- Rotation errors ---
    #[error("Key rotation for tenant {tenant_id} failed and was rolled back: {source}")]
    RotationFailed {
        tenant_id: TenantId,
        #[source]
        source: Box<TenantEncError>,
    },

    #[error("Encrypted setting '{path}' of tenant {tenant_id} cannot be decrypted")]
    UnreadableSetting { tenant_id: TenantId, path: String },

    // --- Settings document errors ---
    #[error("Settings error: {0}")]
    SettingsError(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- Audit errors ---
    #[error("Audit error: {0}")]
    AuditError(String),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

/// Convenience type alias for tenantenc results.
pub type Result<T> = std::result::Result<T, TenantEncError>;
