//! Re-trigger policy for analysis requests.

use crate::models::{AnalysisResult, AnalysisStatus};
use crate::{Result, TextcloudError};
use uuid::Uuid;

/// Outcome of an analysis trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerDecision {
    /// A completed analysis already exists; no job was scheduled.
    Reused(AnalysisResult),
    /// A fresh PENDING record was created and must be scheduled.
    Created(AnalysisResult),
}

impl TriggerDecision {
    pub fn result(&self) -> &AnalysisResult {
        match self {
            TriggerDecision::Reused(result) | TriggerDecision::Created(result) => result,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, TriggerDecision::Created(_))
    }
}

/// Decide what a trigger for `file_id` does given its existing records.
///
/// - any COMPLETED record is returned for reuse;
/// - otherwise any PENDING or PROCESSING record is a conflict;
/// - otherwise (none, or all FAILED) `Ok(None)` asks for a new record.
pub fn decide(file_id: Uuid, existing: &[AnalysisResult]) -> Result<Option<AnalysisResult>> {
    if let Some(done) = existing
        .iter()
        .find(|r| r.status == AnalysisStatus::Completed)
    {
        return Ok(Some(done.clone()));
    }

    if let Some(active) = existing.iter().find(|r| r.status.is_in_flight()) {
        return Err(TextcloudError::AnalysisInProgress {
            file_id,
            status: active.status.to_string(),
        });
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_status(file_id: Uuid, status: AnalysisStatus) -> AnalysisResult {
        let mut row = AnalysisResult::new_pending(file_id);
        row.status = status;
        row
    }

    #[test]
    fn test_no_records_creates() {
        assert!(decide(Uuid::new_v4(), &[]).unwrap().is_none());
    }

    #[test]
    fn test_failed_records_allow_retrigger() {
        let file_id = Uuid::new_v4();
        let rows = vec![
            with_status(file_id, AnalysisStatus::Failed),
            with_status(file_id, AnalysisStatus::Failed),
        ];
        assert!(decide(file_id, &rows).unwrap().is_none());
    }

    #[test]
    fn test_completed_is_reused() {
        let file_id = Uuid::new_v4();
        let done = with_status(file_id, AnalysisStatus::Completed);
        let rows = vec![with_status(file_id, AnalysisStatus::Failed), done.clone()];
        assert_eq!(decide(file_id, &rows).unwrap(), Some(done));
    }

    #[test]
    fn test_in_flight_conflicts() {
        let file_id = Uuid::new_v4();
        for status in [AnalysisStatus::Pending, AnalysisStatus::Processing] {
            let rows = vec![
                with_status(file_id, AnalysisStatus::Failed),
                with_status(file_id, status),
            ];
            let err = decide(file_id, &rows).unwrap_err();
            assert!(err.to_string().contains(status.as_str()));
            assert_eq!(err.http_status(), 409);
        }
    }
}
