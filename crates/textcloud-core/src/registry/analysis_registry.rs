//! SQLite-backed registry of analysis records.

use super::connection::{self, SharedConnection};
use crate::analysis::trigger::{self, TriggerDecision};
use crate::models::{apply_update, AnalysisResult, AnalysisStatus, AnalysisUpdate, TextStatistics};
use crate::{Result, TextcloudError};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, original_file_id, analysis_status, word_cloud_image_location,
            other_analysis_data, error_message, created_at, updated_at
     FROM analysis_results";

/// Registry of [`AnalysisResult`] rows.
///
/// A partial unique index keeps at most one PENDING/PROCESSING row per
/// original file, and [`Self::begin_analysis`] runs its check-then-create
/// inside a single IMMEDIATE transaction.
#[derive(Clone)]
pub struct AnalysisRegistry {
    conn: SharedConnection,
}

impl AnalysisRegistry {
    /// Open the registry at a specific path.
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
            "CREATE TABLE IF NOT EXISTS analysis_results (
                id TEXT PRIMARY KEY,
                original_file_id TEXT NOT NULL,
                analysis_status TEXT NOT NULL
                    CHECK (analysis_status IN ('PENDING', 'PROCESSING', 'COMPLETED', 'FAILED')),
                word_cloud_image_location TEXT,
                other_analysis_data TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analysis_original_file
                ON analysis_results(original_file_id);

            CREATE UNIQUE INDEX IF NOT EXISTS idx_analysis_one_in_flight
                ON analysis_results(original_file_id)
                WHERE analysis_status IN ('PENDING', 'PROCESSING');",
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<AnalysisResult> {
        let status: String = row.get(2)?;
        let status = AnalysisStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown analysis status {:?}", status).into(),
            )
        })?;

        let data: Option<String> = row.get(4)?;
        let analysis_data = data
            .map(|json| serde_json::from_str::<TextStatistics>(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        Ok(AnalysisResult {
            id: connection::parse_uuid(0, row.get(0)?)?,
            original_file_id: connection::parse_uuid(1, row.get(1)?)?,
            status,
            artifact_location: row.get(3)?,
            analysis_data,
            error_message: row.get(5)?,
            created_at: connection::parse_timestamp(6, row.get(6)?)?,
            updated_at: connection::parse_timestamp(7, row.get(7)?)?,
        })
    }

    fn insert(conn: &Connection, result: &AnalysisResult) -> Result<()> {
        let data = result
            .analysis_data
            .map(|d| serde_json::to_string(&d))
            .transpose()?;

        conn.execute(
            "INSERT INTO analysis_results
                (id, original_file_id, analysis_status, word_cloud_image_location,
                 other_analysis_data, error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result.id.to_string(),
                result.original_file_id.to_string(),
                result.status.as_str(),
                result.artifact_location,
                data,
                result.error_message,
                connection::to_timestamp(&result.created_at),
                connection::to_timestamp(&result.updated_at),
            ],
        )?;
        Ok(())
    }

    fn select_by_file(conn: &Connection, original_file_id: Uuid) -> Result<Vec<AnalysisResult>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE original_file_id = ?1 ORDER BY rowid",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![original_file_id.to_string()], Self::map_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn select_by_id(conn: &Connection, id: Uuid) -> Result<Option<AnalysisResult>> {
        let result = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id.to_string()],
                Self::map_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Insert a PENDING record for `original_file_id`.
    ///
    /// Fails with a conflict if the file already has an in-flight record.
    pub fn create(&self, original_file_id: Uuid) -> Result<AnalysisResult> {
        let conn = connection::lock(&self.conn)?;
        let result = AnalysisResult::new_pending(original_file_id);

        match Self::insert(&conn, &result) {
            Ok(()) => {
                debug!("Created PENDING analysis {} for file {}", result.id, original_file_id);
                Ok(result)
            }
            Err(TextcloudError::Database {
                source: Some(ref e),
                ..
            }) if connection::is_constraint_violation(e) => {
                let status = Self::select_by_file(&conn, original_file_id)?
                    .into_iter()
                    .find(|r| r.status.is_in_flight())
                    .map(|r| r.status.to_string())
                    .unwrap_or_else(|| AnalysisStatus::Pending.to_string());
                Err(TextcloudError::AnalysisInProgress {
                    file_id: original_file_id,
                    status,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Apply the trigger policy for `original_file_id` atomically.
    ///
    /// Reads the file's records, decides reuse/conflict/create and inserts the
    /// new PENDING record in one transaction, so two concurrent triggers can
    /// never both create an in-flight record.
    pub fn begin_analysis(&self, original_file_id: Uuid) -> Result<TriggerDecision> {
        let mut conn = connection::lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = Self::select_by_file(&tx, original_file_id)?;
        if let Some(done) = trigger::decide(original_file_id, &existing)? {
            return Ok(TriggerDecision::Reused(done));
        }

        let result = AnalysisResult::new_pending(original_file_id);
        Self::insert(&tx, &result)?;
        tx.commit()?;

        debug!(
            "Created PENDING analysis {} for file {} ({} earlier attempts)",
            result.id,
            original_file_id,
            existing.len()
        );
        Ok(TriggerDecision::Created(result))
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisResult>> {
        let conn = connection::lock(&self.conn)?;
        Self::select_by_id(&conn, id)
    }

    /// All records for a file, in insertion order.
    pub fn find_by_original_file_id(&self, original_file_id: Uuid) -> Result<Vec<AnalysisResult>> {
        let conn = connection::lock(&self.conn)?;
        Self::select_by_file(&conn, original_file_id)
    }

    /// Apply a partial update.
    ///
    /// Returns `Ok(None)` when the record does not exist.
    pub fn update(&self, id: Uuid, update: &AnalysisUpdate) -> Result<Option<AnalysisResult>> {
        let conn = connection::lock(&self.conn)?;
        let previous = match Self::select_by_id(&conn, id)? {
            Some(previous) => previous,
            None => {
                debug!("Analysis {} vanished before update", id);
                return Ok(None);
            }
        };

        let next = apply_update(&previous, update, Utc::now())?;
        let data = next
            .analysis_data
            .map(|d| serde_json::to_string(&d))
            .transpose()?;

        conn.execute(
            "UPDATE analysis_results
             SET analysis_status = ?1, word_cloud_image_location = ?2,
                 other_analysis_data = ?3, error_message = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                next.status.as_str(),
                next.artifact_location,
                data,
                next.error_message,
                connection::to_timestamp(&next.updated_at),
                id.to_string(),
            ],
        )?;

        debug!("Analysis {} {} -> {}", id, previous.status, next.status);
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn stats() -> TextStatistics {
        TextStatistics {
            paragraphs: 1,
            words: 2,
            characters: 9,
        }
    }

    #[test]
    fn test_create_is_pending() {
        let registry = AnalysisRegistry::in_memory().unwrap();
        let file_id = Uuid::new_v4();
        let created = registry.create(file_id).unwrap();

        assert_eq!(created.status, AnalysisStatus::Pending);
        assert_eq!(created.original_file_id, file_id);
        assert_eq!(registry.find_by_id(created.id).unwrap(), Some(created));
    }

    #[test]
    fn test_schema_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("db").join("analysis.db");
        let file_id = Uuid::new_v4();

        let id = {
            let registry = AnalysisRegistry::open_at(&db_path).unwrap();
            registry.create(file_id).unwrap().id
        };

        let reopened = AnalysisRegistry::open_at(&db_path).unwrap();
        assert_eq!(reopened.find_by_id(id).unwrap().unwrap().original_file_id, file_id);
        // The in-flight index is still in place after reopening
        assert!(matches!(
            reopened.create(file_id).unwrap_err(),
            TextcloudError::AnalysisInProgress { .. }
        ));
    }

    #[test]
    fn test_unique_in_flight_per_file() {
        let registry = AnalysisRegistry::in_memory().unwrap();
        let file_id = Uuid::new_v4();
        registry.create(file_id).unwrap();

        let err = registry.create(file_id).unwrap_err();
        assert!(matches!(err, TextcloudError::AnalysisInProgress { .. }));
        assert_eq!(registry.find_by_original_file_id(file_id).unwrap().len(), 1);

        // Other files are unaffected
        registry.create(Uuid::new_v4()).unwrap();
    }

    #[test]
    fn test_lifecycle_updates() {
        let registry = AnalysisRegistry::in_memory().unwrap();
        let row = registry.create(Uuid::new_v4()).unwrap();

        let processing = registry
            .update(row.id, &AnalysisUpdate::processing())
            .unwrap()
            .unwrap();
        assert_eq!(processing.status, AnalysisStatus::Processing);

        let done = registry
            .update(row.id, &AnalysisUpdate::completed("a.png".into(), stats()))
            .unwrap()
            .unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);

        let stored = registry.find_by_id(row.id).unwrap().unwrap();
        assert_eq!(stored.artifact_location.as_deref(), Some("a.png"));
        assert_eq!(stored.analysis_data, Some(stats()));
        assert!(stored.updated_at >= stored.created_at);
    }

    #[test]
    fn test_update_missing_is_none() {
        let registry = AnalysisRegistry::in_memory().unwrap();
        let result = registry
            .update(Uuid::new_v4(), &AnalysisUpdate::processing())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_update_rejects_leaving_terminal_state() {
        let registry = AnalysisRegistry::in_memory().unwrap();
        let row = registry.create(Uuid::new_v4()).unwrap();
        registry.update(row.id, &AnalysisUpdate::failed("x", None)).unwrap();

        let err = registry
            .update(row.id, &AnalysisUpdate::processing())
            .unwrap_err();
        assert!(matches!(err, TextcloudError::InvalidTransition { .. }));
        assert_eq!(
            registry.find_by_id(row.id).unwrap().unwrap().status,
            AnalysisStatus::Failed
        );
    }

    #[test]
    fn test_find_by_file_preserves_insertion_order() {
        let registry = AnalysisRegistry::in_memory().unwrap();
        let file_id = Uuid::new_v4();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let row = registry.create(file_id).unwrap();
            registry.update(row.id, &AnalysisUpdate::failed("nope", None)).unwrap();
            ids.push(row.id);
        }

        let listed: Vec<Uuid> = registry
            .find_by_original_file_id(file_id)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, ids);
        assert!(registry.find_by_original_file_id(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_begin_analysis_policy() {
        let registry = AnalysisRegistry::in_memory().unwrap();
        let file_id = Uuid::new_v4();

        let first = registry.begin_analysis(file_id).unwrap();
        assert!(first.is_created());

        let err = registry.begin_analysis(file_id).unwrap_err();
        assert!(err.to_string().contains("PENDING"));

        let id = first.result().id;
        registry.update(id, &AnalysisUpdate::failed("broken", None)).unwrap();

        let retry = registry.begin_analysis(file_id).unwrap();
        assert!(retry.is_created());
        assert_ne!(retry.result().id, id);

        let retry_id = retry.result().id;
        registry.update(retry_id, &AnalysisUpdate::processing()).unwrap();
        registry
            .update(retry_id, &AnalysisUpdate::completed("w.png".into(), stats()))
            .unwrap();

        match registry.begin_analysis(file_id).unwrap() {
            TriggerDecision::Reused(done) => assert_eq!(done.id, retry_id),
            other => panic!("expected reuse, got {:?}", other),
        }
        // The failed attempt is retained
        assert_eq!(registry.find_by_original_file_id(file_id).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_begin_analysis_creates_one() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(AnalysisRegistry::open_at(&temp_dir.path().join("a.db")).unwrap());
        let file_id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.begin_analysis(file_id))
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| matches!(r, Ok(TriggerDecision::Created(_))))
            .count();

        assert_eq!(created, 1);
        assert_eq!(registry.find_by_original_file_id(file_id).unwrap().len(), 1);
    }
}
