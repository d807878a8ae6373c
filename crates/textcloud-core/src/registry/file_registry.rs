//! SQLite-backed registry of stored files.

use super::connection::{self, SharedConnection};
use crate::models::{FileMetadata, NewFile};
use crate::{Result, TextcloudError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, original_filename, file_hash, file_location, mime_type, size_bytes, uploaded_at
     FROM file_metadata";

/// Registry of [`FileMetadata`] rows, one per distinct content hash.
///
/// Thread-safe via `Arc<Mutex<Connection>>`; cloning shares the connection.
#[derive(Clone)]
pub struct FileRegistry {
    conn: SharedConnection,
}

impl FileRegistry {
    /// Open the registry at a specific path.
    ///
    /// Creates the database and parent directories if they don't exist.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        let conn = connection::open_at(db_path)?;
        Self::init(conn)
    }

    /// Open a registry backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::init(connection::open_in_memory()?)
    }

    fn init(conn: SharedConnection) -> Result<Self> {
        {
            let guard = connection::lock(&conn)?;
            Self::ensure_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS file_metadata (
                id TEXT PRIMARY KEY,
                original_filename TEXT NOT NULL,
                file_hash TEXT NOT NULL UNIQUE,
                file_location TEXT NOT NULL UNIQUE,
                mime_type TEXT,
                size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
                uploaded_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<FileMetadata> {
        let size: i64 = row.get(5)?;
        Ok(FileMetadata {
            id: connection::parse_uuid(0, row.get(0)?)?,
            original_filename: row.get(1)?,
            file_hash: row.get(2)?,
            file_location: row.get(3)?,
            mime_type: row.get(4)?,
            size_bytes: size.max(0) as u64,
            uploaded_at: connection::parse_timestamp(6, row.get(6)?)?,
        })
    }

    /// Dedup lookup by content hash.
    pub fn find_by_hash(&self, file_hash: &str) -> Result<Option<FileMetadata>> {
        let conn = connection::lock(&self.conn)?;
        let result = conn
            .query_row(
                &format!("{} WHERE file_hash = ?1", SELECT_COLUMNS),
                params![file_hash],
                Self::map_row,
            )
            .optional()?;
        Ok(result)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<FileMetadata>> {
        let conn = connection::lock(&self.conn)?;
        let result = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id.to_string()],
                Self::map_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Insert a new row.
    ///
    /// Fails with [`TextcloudError::DuplicateHash`] if the hash is already
    /// registered. Callers check [`Self::find_by_hash`] first; the unique
    /// constraint only catches concurrent first uploads.
    pub fn create(&self, new_file: NewFile) -> Result<FileMetadata> {
        let size = i64::try_from(new_file.size_bytes).map_err(|_| {
            TextcloudError::invalid("size_bytes", format!("File too large: {} bytes", new_file.size_bytes))
        })?;

        let metadata = FileMetadata {
            id: Uuid::new_v4(),
            original_filename: new_file.original_filename,
            file_hash: new_file.file_hash,
            file_location: new_file.file_location,
            mime_type: new_file.mime_type,
            size_bytes: new_file.size_bytes,
            uploaded_at: Utc::now(),
        };

        let conn = connection::lock(&self.conn)?;
        let inserted = conn.execute(
            "INSERT INTO file_metadata
                (id, original_filename, file_hash, file_location, mime_type, size_bytes, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                metadata.id.to_string(),
                metadata.original_filename,
                metadata.file_hash,
                metadata.file_location,
                metadata.mime_type,
                size,
                connection::to_timestamp(&metadata.uploaded_at),
            ],
        );

        match inserted {
            Ok(_) => {
                debug!(
                    "Registered file {} ({}) with hash {}",
                    metadata.id, metadata.original_filename, metadata.file_hash
                );
                Ok(metadata)
            }
            Err(e) if connection::is_constraint_violation(&e) => Err(TextcloudError::DuplicateHash {
                hash: metadata.file_hash,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count(&self) -> Result<usize> {
        let conn = connection::lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM file_metadata", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{sha256_hex, ContentStore};
    use tempfile::TempDir;

    fn new_file(content: &[u8], name: &str) -> NewFile {
        let hash = sha256_hex(content);
        NewFile {
            original_filename: name.to_string(),
            file_location: ContentStore::location_for(&hash).unwrap(),
            file_hash: hash,
            mime_type: Some("text/plain".to_string()),
            size_bytes: content.len() as u64,
        }
    }

    #[test]
    fn test_create_and_find() {
        let registry = FileRegistry::in_memory().unwrap();
        let created = registry.create(new_file(b"hello", "a.txt")).unwrap();

        let by_id = registry.find_by_id(created.id).unwrap().unwrap();
        assert_eq!(by_id, created);

        let by_hash = registry.find_by_hash(&created.file_hash).unwrap().unwrap();
        assert_eq!(by_hash.id, created.id);
        assert_eq!(by_hash.size_bytes, 5);
        assert_eq!(by_hash.mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_find_missing() {
        let registry = FileRegistry::in_memory().unwrap();
        assert!(registry.find_by_id(Uuid::new_v4()).unwrap().is_none());
        assert!(registry.find_by_hash(&sha256_hex(b"nope")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_hash_conflicts() {
        let registry = FileRegistry::in_memory().unwrap();
        registry.create(new_file(b"same", "a.txt")).unwrap();

        let err = registry.create(new_file(b"same", "b.txt")).unwrap_err();
        assert!(matches!(err, TextcloudError::DuplicateHash { .. }));
        assert_eq!(registry.count().unwrap(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("db").join("files.db");

        let id = {
            let registry = FileRegistry::open_at(&db_path).unwrap();
            registry.create(new_file(b"durable", "d.txt")).unwrap().id
        };

        let reopened = FileRegistry::open_at(&db_path).unwrap();
        let row = reopened.find_by_id(id).unwrap().unwrap();
        assert_eq!(row.original_filename, "d.txt");
    }
}
