//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::service::TenantKeyMetadata;
use crate::store::{KeyStatus, KeySummary};

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Print a table of key versions (Version, Status, Activated, Retired, Rotated by).
pub fn print_keys_table(keys: &[KeySummary]) {
    if keys.is_empty() {
        info("This tenant has no keys yet.");
        tip("A key is created on first encryption, or run `tenantenc rotate`.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Version", "Provider", "Status", "Activated", "Retired", "Rotated by"]);

    for k in keys {
        let status = match k.status {
            KeyStatus::Active => style(k.status.as_str()).green().to_string(),
            KeyStatus::Retired => style(k.status.as_str()).dim().to_string(),
        };
        table.add_row(vec![
            k.key_version.to_string(),
            k.key_provider.to_string(),
            status,
            k.activated_at.format(TIME_FORMAT).to_string(),
            k.retired_at
                .map_or_else(|| "-".to_string(), |t| t.format(TIME_FORMAT).to_string()),
            k.rotated_by.map_or_else(|| "-".to_string(), |a| a.to_string()),
        ]);
    }

    println!("{table}");
}

/// Print tenant key metadata as a two-column table.
pub fn print_metadata(meta: &TenantKeyMetadata) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Field", "Value"]);

    table.add_row(vec!["Tenant".to_string(), meta.tenant_id.to_string()]);
    table.add_row(vec!["Provider".to_string(), meta.provider.to_string()]);
    table.add_row(vec![
        "Active key version".to_string(),
        meta.active_key_version
            .map_or_else(|| "none".to_string(), |v| v.to_string()),
    ]);
    table.add_row(vec![
        "Activated at".to_string(),
        meta.active_key_activated_at
            .map_or_else(|| "-".to_string(), |t| t.format(TIME_FORMAT).to_string()),
    ]);
    table.add_row(vec![
        "Supports rotation".to_string(),
        if meta.supports_rotation { "yes" } else { "no" }.to_string(),
    ]);

    println!("{table}");
}
