pub mod audit;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod rotation;
pub mod service;
pub mod store;
pub mod token;

pub use config::{EncryptionConfig, Settings};
pub use crypto::MasterKey;
pub use errors::{Result, TenantEncError};
pub use rotation::RotationReport;
pub use service::{TenantEncryption, TenantKeyMetadata};
pub use store::{ActorId, KeyProvider, KeyStatus, SqliteStore, TenantId};
