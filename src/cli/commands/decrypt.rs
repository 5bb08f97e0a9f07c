//! `tenantenc decrypt`: decrypt a token (or legacy value) for a tenant.

use crate::cli::{open_service, Cli};
use crate::errors::{Result, TenantEncError};
use crate::store::TenantId;

/// Execute the `decrypt` command.
pub fn execute(cli: &Cli, tenant: TenantId, token: &str) -> Result<()> {
    let service = open_service(cli)?;

    let plaintext = service.decrypt_for_tenant(tenant, token)?.ok_or_else(|| {
        TenantEncError::CommandFailed(format!("value unreadable for tenant {tenant}"))
    })?;
    println!("{plaintext}");

    Ok(())
}
