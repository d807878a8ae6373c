//! Shared SQLite connection setup and column decoding.

use crate::config::DatabaseConfig;
use crate::{Result, TextcloudError};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

/// Open a database file, creating parent directories if they don't exist.
pub(crate) fn open_at(db_path: &Path) -> Result<SharedConnection> {
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| TextcloudError::Io {
                message: format!("Failed to create database directory: {}", parent.display()),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(&format!(
        "PRAGMA journal_mode=WAL;\n\
         PRAGMA busy_timeout={};\n\
         PRAGMA synchronous=NORMAL;\n\
         PRAGMA foreign_keys=ON;",
        DatabaseConfig::BUSY_TIMEOUT_MS,
    ))?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Open a private in-memory database.
pub(crate) fn open_in_memory() -> Result<SharedConnection> {
    let conn = Connection::open_in_memory()?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub(crate) fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| TextcloudError::Database {
        message: "Failed to acquire database connection lock".to_string(),
        source: None,
    })
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

pub(crate) fn to_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_uuid(idx: usize, value: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
