//! `tenantenc put`: encrypt a value and store it in a tenant's settings.

use crate::cli::output;
use crate::cli::{open_service, read_value, Cli};
use crate::errors::Result;
use crate::store::TenantId;
use crate::token;

/// Execute the `put` command.
pub fn execute(cli: &Cli, tenant: TenantId, path: &str, value: Option<&str>) -> Result<()> {
    let plaintext = read_value(value, &format!("Enter value for {path}"))?;
    let service = open_service(cli)?;

    let stored = service.store_encrypted_setting(tenant, path, &plaintext)?;
    match token::decode(&stored) {
        Some((version, _)) => output::success(&format!(
            "Stored '{path}' for tenant {tenant} (key v{version})"
        )),
        None => output::success(&format!("Stored '{path}' for tenant {tenant}")),
    }

    if !service.config().is_encrypted_path(path) {
        output::tip("Add this path to `encrypted_paths` so rotation re-encrypts it.");
    }

    Ok(())
}
