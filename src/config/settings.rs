use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::encryption::EncryptionConfig;
use crate::crypto::keys::{MasterKey, DEFAULT_KEY_SIZE};
use crate::errors::{Result, TenantEncError};

/// Deployment configuration, loaded from `tenantenc.toml`.
///
/// Every field has a sensible default so tenantenc works out-of-the-box
/// without any config file at all.  Key material is never read from the
/// file, only the names of the environment variables that hold it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database holding keys, settings documents, and the audit log.
    #[serde(default = "default_database")]
    pub database: String,

    /// Key provider for new tenant keys.  Only "local" is supported.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Size of tenant raw key material in bytes (16..=64).
    #[serde(default = "default_key_size")]
    pub key_size: usize,

    /// Environment variable holding the master key.
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,

    /// Environment variable holding the pre-tenant-key application key, if
    /// it differs from the master key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_key_env: Option<String>,

    /// Settings paths re-encrypted on rotation.
    #[serde(default = "default_encrypted_paths")]
    pub encrypted_paths: Vec<String>,

    /// Leave unreadable values in place during rotation instead of failing.
    #[serde(default)]
    pub skip_unreadable_on_rotate: bool,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_database() -> String {
    "tenantenc.db".to_string()
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_key_size() -> usize {
    DEFAULT_KEY_SIZE
}

fn default_master_key_env() -> String {
    "TENANTENC_MASTER_KEY".to_string()
}

fn default_encrypted_paths() -> Vec<String> {
    [
        "mail.smtp.password",
        "mail.mailgun.secret",
        "integrations.openai.api_key",
        "integrations.telegram.bot_token",
        "billing.stripe.secret_key",
        "billing.stripe.webhook_secret",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database(),
            provider: default_provider(),
            key_size: default_key_size(),
            master_key_env: default_master_key_env(),
            legacy_key_env: None,
            encrypted_paths: default_encrypted_paths(),
            skip_unreadable_on_rotate: false,
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the working directory.
    pub const FILE_NAME: &'static str = "tenantenc.toml";

    /// Load settings from `<dir>/tenantenc.toml`.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_file(&dir.join(Self::FILE_NAME))
    }

    /// Load settings from an explicit file path.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load_file(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            TenantEncError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Resolve the database path against `base_dir` (absolute paths win).
    pub fn database_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.database)
    }

    /// Build the validated runtime config, reading keys from the process
    /// environment.
    pub fn encryption_config(&self) -> Result<EncryptionConfig> {
        self.encryption_config_with(|name| std::env::var(name).ok())
    }

    /// Same as `encryption_config`, with an explicit variable lookup.
    pub fn encryption_config_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<EncryptionConfig> {
        let encoded = lookup(&self.master_key_env)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                TenantEncError::InvalidMasterKey(format!(
                    "environment variable {} is not set",
                    self.master_key_env
                ))
            })?;
        let master_key = MasterKey::from_encoded(&encoded)?;

        let legacy_key = match &self.legacy_key_env {
            Some(name) => {
                let encoded = lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| {
                        TenantEncError::InvalidMasterKey(format!(
                            "environment variable {name} is not set"
                        ))
                    })?;
                Some(MasterKey::from_encoded(&encoded)?)
            }
            None => None,
        };

        let config = EncryptionConfig {
            master_key,
            legacy_key,
            provider: self.provider.parse()?,
            key_size: self.key_size,
            encrypted_paths: self.encrypted_paths.clone(),
            skip_unreadable_on_rotate: self.skip_unreadable_on_rotate,
        };
        config.validate()?;
        Ok(config)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
