//! Audit log: SQLite-based key rotation history.
//!
//! Every successful rotation writes one row to `encryption_audit_log`
//! inside the rotation transaction, so a rolled-back rotation leaves no
//! trace and a committed one always has its record.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;

use crate::errors::{Result, TenantEncError};
use crate::store::{ActorId, KeyProvider, TenantId};

/// Operation name recorded for key rotations.
pub const OP_ROTATE: &str = "rotate";

/// Schema for the audit table.  Applied by `SqliteStore::open`.
pub(crate) const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS encryption_audit_log (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id     INTEGER NOT NULL,
    timestamp     TEXT NOT NULL,
    operation     TEXT NOT NULL,
    actor_id      INTEGER,
    old_version   INTEGER,
    new_version   INTEGER,
    provider      TEXT NOT NULL,
    reencrypted   INTEGER NOT NULL DEFAULT 0,
    reason        TEXT
);
CREATE INDEX IF NOT EXISTS encryption_audit_log_tenant
    ON encryption_audit_log (tenant_id, id);";

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub tenant_id: TenantId,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub actor_id: Option<ActorId>,
    pub old_version: Option<u32>,
    pub new_version: Option<u32>,
    pub provider: String,
    pub reencrypted: usize,
    pub reason: Option<String>,
}

/// What the rotation coordinator records.
#[derive(Debug, Clone)]
pub struct RotationAudit<'a> {
    pub tenant_id: TenantId,
    pub actor_id: Option<ActorId>,
    pub old_version: u32,
    pub new_version: u32,
    pub provider: KeyProvider,
    pub reencrypted: usize,
    pub reason: Option<&'a str>,
}

/// Destination for audit records written during a transaction.
pub trait AuditSink {
    fn record_rotation(&mut self, record: &RotationAudit<'_>) -> Result<()>;
}

/// Insert a rotation record.  Errors propagate so the enclosing
/// transaction rolls back.
pub fn insert_rotation(conn: &Connection, record: &RotationAudit<'_>) -> Result<()> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let reencrypted = i64::try_from(record.reencrypted).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT INTO encryption_audit_log
            (tenant_id, timestamp, operation, actor_id, old_version, new_version,
             provider, reencrypted, reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            record.tenant_id,
            now,
            OP_ROTATE,
            record.actor_id,
            record.old_version,
            record.new_version,
            record.provider.as_str(),
            reencrypted,
            record.reason,
        ],
    )
    .map_err(|e| TenantEncError::AuditError(format!("insert: {e}")))?;
    Ok(())
}

/// Query recent audit entries.
///
/// - `tenant_id`: restrict to one tenant, or all tenants when `None`.
/// - `limit`: maximum number of entries to return (most recent first).
/// - `since`: if provided, only return entries newer than this timestamp.
pub fn query(
    conn: &Connection,
    tenant_id: Option<TenantId>,
    limit: usize,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<AuditEntry>> {
    let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
    let since_str = since.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true));

    let mut stmt = conn
        .prepare(
            "SELECT id, tenant_id, timestamp, operation, actor_id, old_version, new_version,
                    provider, reencrypted, reason
             FROM encryption_audit_log
             WHERE (?1 IS NULL OR tenant_id = ?1)
               AND (?2 IS NULL OR timestamp >= ?2)
             ORDER BY id DESC
             LIMIT ?3",
        )
        .map_err(|e| TenantEncError::AuditError(format!("query prepare: {e}")))?;

    let rows = stmt
        .query_map(rusqlite::params![tenant_id, since_str, limit_i64], |row| {
            let ts_str: String = row.get(2)?;
            let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
            let reencrypted: i64 = row.get(8)?;

            Ok(AuditEntry {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                timestamp,
                operation: row.get(3)?,
                actor_id: row.get(4)?,
                old_version: row.get(5)?,
                new_version: row.get(6)?,
                provider: row.get(7)?,
                reencrypted: usize::try_from(reencrypted).unwrap_or(0),
                reason: row.get(9)?,
            })
        })
        .map_err(|e| TenantEncError::AuditError(format!("query exec: {e}")))?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.map_err(|e| TenantEncError::AuditError(format!("row parse: {e}")))?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    fn record(tenant_id: TenantId, old_version: u32) -> RotationAudit<'static> {
        RotationAudit {
            tenant_id,
            actor_id: Some(3),
            old_version,
            new_version: old_version + 1,
            provider: KeyProvider::Local,
            reencrypted: 2,
            reason: Some("scheduled"),
        }
    }

    #[test]
    fn insert_and_query_roundtrip() {
        let conn = conn();
        insert_rotation(&conn, &record(7, 1)).unwrap();
        insert_rotation(&conn, &record(7, 2)).unwrap();

        let entries = query(&conn, Some(7), 10, None).unwrap();
        assert_eq!(entries.len(), 2);

        // Most recent first.
        assert_eq!(entries[0].old_version, Some(2));
        assert_eq!(entries[0].new_version, Some(3));
        assert_eq!(entries[1].old_version, Some(1));
        assert_eq!(entries[0].operation, OP_ROTATE);
        assert_eq!(entries[0].provider, "local");
        assert_eq!(entries[0].reencrypted, 2);
        assert_eq!(entries[0].actor_id, Some(3));
        assert_eq!(entries[0].reason.as_deref(), Some("scheduled"));
    }

    #[test]
    fn query_filters_by_tenant_and_limit() {
        let conn = conn();
        for v in 1..=5 {
            insert_rotation(&conn, &record(1, v)).unwrap();
        }
        insert_rotation(&conn, &record(2, 1)).unwrap();

        assert_eq!(query(&conn, Some(1), 10, None).unwrap().len(), 5);
        assert_eq!(query(&conn, Some(2), 10, None).unwrap().len(), 1);
        assert_eq!(query(&conn, None, 10, None).unwrap().len(), 6);
        assert_eq!(query(&conn, Some(1), 3, None).unwrap().len(), 3);
    }

    #[test]
    fn query_with_since_filter() {
        let conn = conn();
        insert_rotation(&conn, &record(1, 1)).unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(query(&conn, None, 10, Some(past)).unwrap().len(), 1);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(query(&conn, None, 10, Some(future)).unwrap().is_empty());
    }

    #[test]
    fn unparseable_timestamp_is_an_error() {
        let conn = conn();
        insert_rotation(&conn, &record(1, 1)).unwrap();
        conn.execute("UPDATE encryption_audit_log SET timestamp = 'yesterday'", [])
            .unwrap();

        let result = query(&conn, Some(1), 10, None);
        assert!(matches!(result, Err(TenantEncError::AuditError(msg)) if msg.contains("row parse")));
    }
}
