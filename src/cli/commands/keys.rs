//! `tenantenc keys`: list every key version of a tenant.

use crate::cli::output;
use crate::cli::{open_service, Cli};
use crate::errors::Result;
use crate::store::TenantId;

/// Execute the `keys` command.
pub fn execute(cli: &Cli, tenant: TenantId) -> Result<()> {
    let service = open_service(cli)?;
    let keys = service.keys_for_tenant(tenant)?;

    if !keys.is_empty() {
        output::info(&format!("Tenant {tenant}: {} key version(s)", keys.len()));
    }
    output::print_keys_table(&keys);

    Ok(())
}
