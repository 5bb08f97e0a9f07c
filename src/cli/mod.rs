//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::Parser;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::{Result, TenantEncError};
use crate::service::TenantEncryption;
use crate::store::{ActorId, SqliteStore, TenantId};

/// tenantenc CLI: operate tenant encryption keys and encrypted settings.
#[derive(Parser)]
#[command(
    name = "tenantenc",
    about = "Tenant-scoped envelope encryption and key rotation",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ./tenantenc.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Database file (overrides `database` from the config file)
    #[arg(long, global = true)]
    pub database: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Encrypt a value for a tenant and print the token
    Encrypt {
        #[arg(short, long)]
        tenant: TenantId,
        /// Plaintext (omit for stdin or an interactive prompt)
        value: Option<String>,
    },

    /// Decrypt a token or legacy value for a tenant
    Decrypt {
        #[arg(short, long)]
        tenant: TenantId,
        /// Token to decrypt
        token: String,
    },

    /// Encrypt a value and store it at a settings path
    Put {
        #[arg(short, long)]
        tenant: TenantId,
        /// Dot-separated settings path (e.g. mail.smtp.password)
        path: String,
        /// Plaintext (omit for stdin or an interactive prompt)
        value: Option<String>,
    },

    /// Read and decrypt a settings path
    Get {
        #[arg(short, long)]
        tenant: TenantId,
        /// Dot-separated settings path
        path: String,
    },

    /// Rotate a tenant's key and re-encrypt its encrypted settings
    Rotate {
        #[arg(short, long)]
        tenant: TenantId,
        /// Actor recorded in the audit log
        #[arg(long)]
        actor: Option<ActorId>,
        /// Reason recorded in the audit log
        #[arg(long)]
        reason: Option<String>,
        /// Print the rotation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a tenant's key provider and active key
    Metadata {
        #[arg(short, long)]
        tenant: TenantId,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every key version of a tenant
    Keys {
        #[arg(short, long)]
        tenant: TenantId,
    },

    /// View the key rotation audit log
    Audit {
        /// Only show entries for this tenant
        #[arg(short, long)]
        tenant: Option<TenantId>,
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
    },

    /// Generate a new random master key
    Keygen,
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Load settings from `--config`, or `tenantenc.toml` in the working
/// directory.  Also returns the directory relative database paths resolve
/// against.
pub fn load_settings(cli: &Cli) -> Result<(Settings, PathBuf)> {
    let cwd = std::env::current_dir()?;
    match &cli.config {
        Some(path) => {
            let path = cwd.join(path);
            if !path.exists() {
                return Err(TenantEncError::ConfigError(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            let base = path.parent().map_or_else(|| cwd.clone(), Path::to_path_buf);
            Ok((Settings::load_file(&path)?, base))
        }
        None => Ok((Settings::load(&cwd)?, cwd)),
    }
}

/// Path of the database the command operates on.
pub fn database_path(cli: &Cli, settings: &Settings, base: &Path) -> Result<PathBuf> {
    match &cli.database {
        Some(path) => Ok(std::env::current_dir()?.join(path)),
        None => Ok(settings.database_path(base)),
    }
}

/// Build the encryption facade from settings, environment, and flags.
pub fn open_service(cli: &Cli) -> Result<TenantEncryption> {
    let (settings, base) = load_settings(cli)?;
    let config = settings.encryption_config()?;
    let store = SqliteStore::open(&database_path(cli, &settings, &base)?)?;
    TenantEncryption::new(store, config)
}

/// Open only the database (commands that never touch key material).
pub fn open_store(cli: &Cli) -> Result<SqliteStore> {
    let (settings, base) = load_settings(cli)?;
    SqliteStore::open(&database_path(cli, &settings, &base)?)
}

/// Get a plaintext value from one of three sources: the argument, piped
/// stdin, or a hidden interactive prompt.
///
/// Returns `Zeroizing<String>` so the value is wiped from memory on drop.
pub fn read_value(value: Option<&str>, prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(v) = value {
        output::warning("Value provided on command line; it may appear in shell history.");
        return Ok(Zeroizing::new(v.to_string()));
    }

    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        return Ok(Zeroizing::new(buf.trim_end().to_string()));
    }

    let value = dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| TenantEncError::CommandFailed(format!("input prompt: {e}")))?;
    Ok(Zeroizing::new(value))
}
