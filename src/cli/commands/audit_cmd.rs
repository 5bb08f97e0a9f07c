//! `tenantenc audit`: display the key rotation audit log.
//!
//! Usage:
//!   tenantenc audit                  # show last 50 entries
//!   tenantenc audit --tenant 7       # one tenant only
//!   tenantenc audit --since 7d       # entries from last 7 days

use chrono::Utc;

use crate::audit::AuditEntry;
use crate::cli::output;
use crate::cli::{open_store, Cli};
use crate::errors::{Result, TenantEncError};
use crate::store::TenantId;

/// Execute the `audit` command.
pub fn execute(cli: &Cli, tenant: Option<TenantId>, last: usize, since: Option<&str>) -> Result<()> {
    let since_dt = match since {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let store = open_store(cli)?;

    let entries = store.audit_entries(tenant, last, since_dt)?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);

    Ok(())
}

/// Parse a human-friendly duration string like "7d", "24h", "30m".
fn parse_duration(input: &str) -> Result<chrono::DateTime<Utc>> {
    let input = input.trim();

    let (num_str, unit) = if let Some(s) = input.strip_suffix('d') {
        (s, 'd')
    } else if let Some(s) = input.strip_suffix('h') {
        (s, 'h')
    } else if let Some(s) = input.strip_suffix('m') {
        (s, 'm')
    } else {
        return Err(TenantEncError::CommandFailed(format!(
            "invalid duration '{input}': use a format like 7d, 24h, or 30m"
        )));
    };

    let num: i64 = num_str.parse().map_err(|_| {
        TenantEncError::CommandFailed(format!(
            "invalid duration '{input}': number part is not valid"
        ))
    })?;

    let duration = match unit {
        'd' => chrono::Duration::try_days(num),
        'h' => chrono::Duration::try_hours(num),
        _ => chrono::Duration::try_minutes(num),
    };

    duration
        .and_then(|d| Utc::now().checked_sub_signed(d))
        .ok_or_else(|| {
            TenantEncError::CommandFailed(format!("invalid duration '{input}': out of range"))
        })
}

/// Print audit entries in a formatted table.
pub fn print_audit_table(entries: &[AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Time", "Tenant", "Operation", "Actor", "Versions", "Provider", "Re-encrypted", "Reason",
    ]);

    for entry in entries {
        let time = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let versions = match (entry.old_version, entry.new_version) {
            (Some(old), Some(new)) => format!("v{old} -> v{new}"),
            (None, Some(new)) => format!("v{new}"),
            _ => "-".to_string(),
        };

        table.add_row(vec![
            time,
            entry.tenant_id.to_string(),
            style(&entry.operation).yellow().to_string(),
            entry.actor_id.map_or_else(|| "-".to_string(), |a| a.to_string()),
            versions,
            entry.provider.clone(),
            entry.reencrypted.to_string(),
            entry.reason.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!(
        "{}",
        style(format!("{} audit entries:", entries.len())).bold()
    );
    println!("{table}");
}
