//! `tenantenc keygen`: print a fresh master key.

use crate::cli::output;
use crate::crypto::MasterKey;
use crate::errors::Result;

/// Execute the `keygen` command.
pub fn execute() -> Result<()> {
    let key = MasterKey::generate()?;
    println!("{}", key.to_encoded());

    output::warning("Store this key safely: losing it makes every tenant key unreadable.");

    Ok(())
}
