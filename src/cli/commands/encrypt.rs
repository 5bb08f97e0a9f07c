//! `tenantenc encrypt`: encrypt a value for a tenant and print the token.

use crate::cli::{open_service, read_value, Cli};
use crate::errors::Result;
use crate::store::TenantId;

/// Execute the `encrypt` command.
pub fn execute(cli: &Cli, tenant: TenantId, value: Option<&str>) -> Result<()> {
    let plaintext = read_value(value, "Value to encrypt")?;
    let service = open_service(cli)?;

    let token = service.encrypt_for_tenant(tenant, &plaintext)?;
    println!("{token}");

    Ok(())
}
