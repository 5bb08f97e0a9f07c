//! `tenantenc get`: read and decrypt a tenant settings path.

use crate::cli::{open_service, Cli};
use crate::errors::{Result, TenantEncError};
use crate::store::TenantId;

/// Execute the `get` command.
pub fn execute(cli: &Cli, tenant: TenantId, path: &str) -> Result<()> {
    let service = open_service(cli)?;

    // Absent and unreadable look the same to the caller.
    let value = service
        .read_encrypted_setting(tenant, path)?
        .ok_or_else(|| {
            TenantEncError::CommandFailed(format!(
                "'{path}' is not set or unreadable for tenant {tenant}"
            ))
        })?;
    println!("{value}");

    Ok(())
}
