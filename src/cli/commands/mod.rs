//! One module per subcommand.  Each exposes an `execute` function.

pub mod audit_cmd;
pub mod decrypt;
pub mod encrypt;
pub mod get;
pub mod keygen;
pub mod keys;
pub mod metadata;
pub mod put;
pub mod rotate;
