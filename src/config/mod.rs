//! Configuration: the `tenantenc.toml` file (`settings`) and the validated
//! runtime config built from it (`encryption`).

pub mod encryption;
pub mod settings;

pub use encryption::EncryptionConfig;
pub use settings::Settings;
