//! `tenantenc rotate`: rotate a tenant's key.
//!
//! Retires the active key, creates the next version, re-encrypts every
//! allow-listed settings path and writes an audit row, all in one
//! transaction.  A failure leaves the tenant exactly as it was.

use crate::cli::output;
use crate::cli::{open_service, Cli};
use crate::errors::{Result, TenantEncError};
use crate::store::{ActorId, TenantId};

/// Execute the `rotate` command.
pub fn execute(
    cli: &Cli,
    tenant: TenantId,
    actor: Option<ActorId>,
    reason: Option<&str>,
    json: bool,
) -> Result<()> {
    let service = open_service(cli)?;
    let report = service.rotate(tenant, actor, reason)?;

    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| TenantEncError::SerializationError(format!("rotation report: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    output::success(&format!(
        "Rotated tenant {tenant}: v{} -> v{} ({} value(s) re-encrypted)",
        report.old_version, report.new_version, report.reencrypted
    ));

    for path in &report.skipped_paths {
        output::warning(&format!("Left unreadable value at '{path}' untouched"));
    }

    Ok(())
}
