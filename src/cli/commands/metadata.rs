//! `tenantenc metadata`: show a tenant's key provider and active key.

use crate::cli::output;
use crate::cli::{open_service, Cli};
use crate::errors::{Result, TenantEncError};
use crate::store::TenantId;

/// Execute the `metadata` command.
pub fn execute(cli: &Cli, tenant: TenantId, json: bool) -> Result<()> {
    let service = open_service(cli)?;
    let meta = service.metadata_for_tenant(tenant)?;

    if json {
        let text = serde_json::to_string_pretty(&meta)
            .map_err(|e| TenantEncError::SerializationError(format!("metadata: {e}")))?;
        println!("{text}");
    } else {
        output::print_metadata(&meta);
    }

    Ok(())
}
