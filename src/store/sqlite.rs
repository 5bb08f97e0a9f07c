//! SQLite-backed key store and settings documents.
//!
//! All tenant state lives in one database so that a rotation (key rows,
//! rewritten settings, audit record) commits or rolls back as a unit.
//!
//! Write transactions start with `BEGIN IMMEDIATE`, which takes SQLite's
//! database-wide write lock up front.  That lock is shared by every
//! process that opens the same file, and is the SQLite equivalent of
//! locking the tenant and key rows with `SELECT ... FOR UPDATE`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde_json::Value;

use super::settings::{self, SettingsStore};
use super::{ActorId, KeyRecord, KeyStatus, KeyStore, NewKey, TenantId};
use crate::audit::{self, AuditEntry, AuditSink, RotationAudit};
use crate::errors::{Result, TenantEncError};

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS tenant_encryption_keys (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id     INTEGER NOT NULL,
    key_version   INTEGER NOT NULL CHECK (key_version > 0),
    key_provider  TEXT NOT NULL,
    key_reference TEXT,
    wrapped_key   BLOB NOT NULL,
    status        TEXT NOT NULL CHECK (status IN ('active', 'retired')),
    activated_at  TEXT NOT NULL,
    retired_at    TEXT,
    rotated_by    INTEGER,
    UNIQUE (tenant_id, key_version)
);
CREATE UNIQUE INDEX IF NOT EXISTS tenant_encryption_keys_one_active
    ON tenant_encryption_keys (tenant_id) WHERE status = 'active';
CREATE TRIGGER IF NOT EXISTS tenant_encryption_keys_never_deleted
    BEFORE DELETE ON tenant_encryption_keys
BEGIN
    SELECT RAISE(ABORT, 'tenant encryption keys are never deleted');
END;
CREATE TABLE IF NOT EXISTS tenant_settings (
    tenant_id   INTEGER PRIMARY KEY,
    document    TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);";

const KEY_COLUMNS: &str = "id, tenant_id, key_version, key_provider, key_reference, wrapped_key, \
                           status, activated_at, retired_at, rotated_by";

fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Handle to the tenantenc database.
///
/// One connection per handle, guarded by a mutex.  Open one handle per
/// process (or per worker); cross-process serialization comes from
/// SQLite's own locking.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let store = Self::init(Connection::open(path)?)?;

        // Restrict the database to the owner; it holds wrapped keys.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(store)
    }

    /// Open a private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(audit::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A panic inside a closure drops its `Transaction`, which rolls back,
    /// so the connection is still consistent after poisoning.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` in a read transaction.
    pub fn read<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let store_tx = StoreTx { tx };
        let value = f(&store_tx)?;
        store_tx.tx.commit()?;
        Ok(value)
    }

    /// Run `f` in an exclusive write transaction.
    ///
    /// Commits if `f` returns `Ok`; any error (or panic) rolls back every
    /// change `f` made.
    pub fn write<T>(&self, f: impl FnOnce(&mut StoreTx<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut store_tx = StoreTx { tx };
        let value = f(&mut store_tx)?;
        store_tx.tx.commit()?;
        Ok(value)
    }

    /// Query the rotation audit log.
    pub fn audit_entries(
        &self,
        tenant_id: Option<TenantId>,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>> {
        let conn = self.lock();
        audit::query(&conn, tenant_id, limit, since)
    }
}

/// An open transaction.  Implements every storage trait the core uses.
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl StoreTx<'_> {
    fn load_document(&self, tenant_id: TenantId) -> Result<Value> {
        let raw: Option<String> = self
            .tx
            .query_row(
                "SELECT document FROM tenant_settings WHERE tenant_id = ?1",
                [tenant_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(text) => serde_json::from_str(&text).map_err(|e| {
                TenantEncError::SettingsError(format!(
                    "settings document of tenant {tenant_id} is not valid JSON: {e}"
                ))
            }),
            None => Ok(Value::Object(serde_json::Map::new())),
        }
    }

    fn save_document(&self, tenant_id: TenantId, document: &Value) -> Result<()> {
        let text = serde_json::to_string(document)
            .map_err(|e| TenantEncError::SerializationError(format!("settings document: {e}")))?;
        self.tx.execute(
            "INSERT INTO tenant_settings (tenant_id, document, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (tenant_id) DO UPDATE
                SET document = excluded.document, updated_at = excluded.updated_at",
            rusqlite::params![tenant_id, text, now_str()],
        )?;
        Ok(())
    }

    fn query_key(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<KeyRecord>> {
        self.tx
            .query_row(sql, params, key_from_row)
            .optional()?
            .map(KeyRow::into_record)
            .transpose()
    }
}

impl KeyStore for StoreTx<'_> {
    fn active_key(&self, tenant_id: TenantId) -> Result<Option<KeyRecord>> {
        self.query_key(
            &format!(
                "SELECT {KEY_COLUMNS} FROM tenant_encryption_keys
                 WHERE tenant_id = ?1 AND status = 'active'"
            ),
            [tenant_id],
        )
    }

    fn key_by_version(&self, tenant_id: TenantId, version: u32) -> Result<Option<KeyRecord>> {
        self.query_key(
            &format!(
                "SELECT {KEY_COLUMNS} FROM tenant_encryption_keys
                 WHERE tenant_id = ?1 AND key_version = ?2"
            ),
            rusqlite::params![tenant_id, version],
        )
    }

    fn max_version(&self, tenant_id: TenantId) -> Result<Option<u32>> {
        let max: Option<u32> = self.tx.query_row(
            "SELECT MAX(key_version) FROM tenant_encryption_keys WHERE tenant_id = ?1",
            [tenant_id],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn create_active_key(&mut self, tenant_id: TenantId, new_key: NewKey) -> Result<KeyRecord> {
        let version = match self.max_version(tenant_id)? {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                TenantEncError::KeyGenerationFailed(format!(
                    "tenant {tenant_id} has exhausted key versions"
                ))
            })?,
            None => 1,
        };

        // The partial unique index rejects a second active key.
        self.tx.execute(
            "INSERT INTO tenant_encryption_keys
                (tenant_id, key_version, key_provider, key_reference, wrapped_key,
                 status, activated_at, rotated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7)",
            rusqlite::params![
                tenant_id,
                version,
                new_key.key_provider.as_str(),
                new_key.key_reference,
                new_key.wrapped_key,
                now_str(),
                new_key.rotated_by,
            ],
        )?;

        self.key_by_version(tenant_id, version)?.ok_or_else(|| {
            TenantEncError::SerializationError(format!(
                "key v{version} for tenant {tenant_id} vanished after insert"
            ))
        })
    }

    fn retire(&mut self, tenant_id: TenantId, version: u32, actor: Option<ActorId>) -> Result<()> {
        self.tx.execute(
            "UPDATE tenant_encryption_keys
                SET status = 'retired', retired_at = ?3, rotated_by = ?4
              WHERE tenant_id = ?1 AND key_version = ?2 AND status = 'active'",
            rusqlite::params![tenant_id, version, now_str(), actor],
        )?;
        Ok(())
    }

    fn list_keys(&self, tenant_id: TenantId) -> Result<Vec<KeyRecord>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {KEY_COLUMNS} FROM tenant_encryption_keys
             WHERE tenant_id = ?1 ORDER BY key_version ASC"
        ))?;
        let rows = stmt.query_map([tenant_id], key_from_row)?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?.into_record()?);
        }
        Ok(keys)
    }
}

impl SettingsStore for StoreTx<'_> {
    fn get_path(&self, tenant_id: TenantId, path: &str) -> Result<Option<String>> {
        let document = self.load_document(tenant_id)?;
        settings::get_string(&document, path)
    }

    fn set_path(&mut self, tenant_id: TenantId, path: &str, value: &str) -> Result<()> {
        let mut document = self.load_document(tenant_id)?;
        settings::set_string(&mut document, path, value)?;
        self.save_document(tenant_id, &document)
    }
}

impl AuditSink for StoreTx<'_> {
    fn record_rotation(&mut self, record: &RotationAudit<'_>) -> Result<()> {
        audit::insert_rotation(&self.tx, record)
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

/// A key row as stored.  The provider stays a string until
/// `into_record`, so an unknown provider surfaces as `UnsupportedProvider`
/// instead of a generic decoding failure.
struct KeyRow {
    id: i64,
    tenant_id: TenantId,
    key_version: u32,
    key_provider: String,
    key_reference: Option<String>,
    wrapped_key: Vec<u8>,
    status: KeyStatus,
    activated_at: DateTime<Utc>,
    retired_at: Option<DateTime<Utc>>,
    rotated_by: Option<ActorId>,
}

impl KeyRow {
    fn into_record(self) -> Result<KeyRecord> {
        Ok(KeyRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            key_version: self.key_version,
            key_provider: self.key_provider.parse()?,
            key_reference: self.key_reference,
            wrapped_key: self.wrapped_key,
            status: self.status,
            activated_at: self.activated_at,
            retired_at: self.retired_at,
            rotated_by: self.rotated_by,
        })
    }
}

fn key_from_row(row: &Row<'_>) -> rusqlite::Result<KeyRow> {
    let status: String = row.get(6)?;
    let retired_at = match row.get::<_, Option<String>>(8)? {
        Some(_) => Some(timestamp_at(row, 8)?),
        None => None,
    };

    Ok(KeyRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        key_version: row.get(2)?,
        key_provider: row.get(3)?,
        key_reference: row.get(4)?,
        wrapped_key: row.get(5)?,
        status: status.parse::<KeyStatus>().map_err(|e| conversion_error(6, e))?,
        activated_at: timestamp_at(row, 7)?,
        retired_at,
        rotated_by: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyProvider;

    fn new_key(byte: u8) -> NewKey {
        NewKey {
            key_provider: KeyProvider::Local,
            key_reference: None,
            wrapped_key: vec![byte; 60],
            rotated_by: None,
        }
    }

    #[test]
    fn create_assigns_increasing_versions() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                let first = tx.create_active_key(1, new_key(1))?;
                assert_eq!(first.key_version, 1);
                assert!(first.is_active());

                tx.retire(1, 1, Some(9))?;
                let second = tx.create_active_key(1, new_key(2))?;
                assert_eq!(second.key_version, 2);
                Ok(())
            })
            .unwrap();

        let keys = store.read(|tx| tx.list_keys(1)).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].status, KeyStatus::Retired);
        assert_eq!(keys[0].rotated_by, Some(9));
        assert!(keys[0].retired_at.is_some());
        assert_eq!(keys[1].status, KeyStatus::Active);
        assert_eq!(keys[1].wrapped_key, vec![2u8; 60]);
    }

    #[test]
    fn second_active_key_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write(|tx| tx.create_active_key(1, new_key(1))).unwrap();

        let result = store.write(|tx| tx.create_active_key(1, new_key(2)));
        assert!(matches!(result, Err(TenantEncError::Storage(_))));
    }

    #[test]
    fn tenants_are_isolated() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.create_active_key(1, new_key(1))?;
                tx.create_active_key(2, new_key(2))?;
                Ok(())
            })
            .unwrap();

        let (a, b, none) = store
            .read(|tx| Ok((tx.active_key(1)?, tx.active_key(2)?, tx.active_key(3)?)))
            .unwrap();
        assert_eq!(a.unwrap().key_version, 1);
        assert_eq!(b.unwrap().key_version, 1);
        assert!(none.is_none());
    }

    #[test]
    fn retire_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.create_active_key(1, new_key(1))?;
                tx.retire(1, 1, Some(3))?;
                tx.retire(1, 1, Some(4))?;
                Ok(())
            })
            .unwrap();

        let key = store.read(|tx| tx.key_by_version(1, 1)).unwrap().unwrap();
        assert_eq!(key.status, KeyStatus::Retired);
        assert_eq!(key.rotated_by, Some(3));
    }

    #[test]
    fn failed_write_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: Result<()> = store.write(|tx| {
            tx.create_active_key(1, new_key(1))?;
            tx.set_path(1, "mail.password", "x")?;
            Err(TenantEncError::CommandFailed("boom".into()))
        });
        assert!(result.is_err());

        let (key, value) = store
            .read(|tx| Ok((tx.active_key(1)?, tx.get_path(1, "mail.password")?)))
            .unwrap();
        assert!(key.is_none());
        assert!(value.is_none());
    }

    #[test]
    fn unknown_provider_rows_are_reported_as_unsupported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write(|tx| tx.create_active_key(1, new_key(1))).unwrap();
        store
            .lock()
            .execute(
                "UPDATE tenant_encryption_keys SET key_provider = 'vault' WHERE tenant_id = 1",
                [],
            )
            .unwrap();

        let result = store.read(|tx| tx.active_key(1));
        assert!(matches!(result, Err(TenantEncError::UnsupportedProvider(p)) if p == "vault"));
    }

    #[test]
    fn keys_cannot_be_deleted() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write(|tx| tx.create_active_key(1, new_key(1))).unwrap();

        let conn = store.lock();
        let result = conn.execute("DELETE FROM tenant_encryption_keys WHERE tenant_id = 1", []);
        assert!(result.is_err());
    }

    #[test]
    fn settings_documents_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                tx.set_path(5, "mail.smtp.password", "tok-a")?;
                tx.set_path(5, "mail.smtp.host", "smtp.example.com")?;
                Ok(())
            })
            .unwrap();

        let (password, host, other) = store
            .read(|tx| {
                Ok((
                    tx.get_path(5, "mail.smtp.password")?,
                    tx.get_path(5, "mail.smtp.host")?,
                    tx.get_path(6, "mail.smtp.password")?,
                ))
            })
            .unwrap();
        assert_eq!(password.as_deref(), Some("tok-a"));
        assert_eq!(host.as_deref(), Some("smtp.example.com"));
        assert!(other.is_none());
    }

    #[test]
    fn open_file_database_is_owner_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tenantenc.db");
        let _store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::metadata(&path).unwrap().permissions();
            assert_eq!(perms.mode() & 0o777, 0o600);
        }
    }
}
