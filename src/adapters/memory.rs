use crate::domain::model::{SubmissionMessage, SubmissionRecord, SubmissionStatus};
use crate::domain::ports::{SubmissionSink, SubmissionStore};
use crate::utils::error::{AllocError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-local submission table, used when no DynamoDB table is available.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubmissionStore {
    records: Arc<Mutex<Vec<SubmissionRecord>>>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<SubmissionRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn put(&self, record: SubmissionRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        // (user_id, timestamp) 是主鍵，重複寫入即覆蓋
        records.retain(|r| !(r.user_id == record.user_id && r.timestamp == record.timestamp));
        records.push(record);
        Ok(())
    }

    async fn latest_pending(&self, user_id: &str, step: u32) -> Result<Option<SubmissionRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| {
                r.user_id == user_id && r.step == step && r.status == SubmissionStatus::Pending
            })
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
            .cloned())
    }

    async fn set_status(
        &self,
        user_id: &str,
        timestamp: &str,
        status: SubmissionStatus,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.user_id == user_id && r.timestamp == timestamp)
            .ok_or_else(|| AllocError::StateError {
                message: format!("No submission for {} at {}", user_id, timestamp),
            })?;
        record.status = status;
        Ok(())
    }
}

/// Sink used when no queue is configured: the submission is only logged.
#[derive(Debug, Clone, Default)]
pub struct LogOnlySink;

#[async_trait]
impl SubmissionSink for LogOnlySink {
    async fn submit(&self, message: &SubmissionMessage) -> Result<()> {
        tracing::info!(
            "📭 No queue configured, submission of {} for step {} kept local",
            message.user_id,
            message.step.unwrap_or(1)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_id: &str, timestamp: &str, step: u32) -> SubmissionRecord {
        SubmissionRecord {
            user_id: user_id.to_string(),
            timestamp: timestamp.to_string(),
            allocation_vector: vec![1, 1, 0, 0, 0],
            expected_utility: 0.2,
            step,
            status: SubmissionStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_latest_pending_picks_most_recent() {
        let store = InMemorySubmissionStore::new();
        store.put(record("S1", "2024-01-01T10:00:00.000000", 1)).await.unwrap();
        store.put(record("S1", "2024-01-01T11:00:00.000000", 1)).await.unwrap();
        store.put(record("S1", "2024-01-01T12:00:00.000000", 2)).await.unwrap();

        let latest = store.latest_pending("S1", 1).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, "2024-01-01T11:00:00.000000");
        assert!(store.latest_pending("S2", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_processed_records_are_skipped() {
        let store = InMemorySubmissionStore::new();
        store.put(record("S1", "2024-01-01T10:00:00.000000", 1)).await.unwrap();
        store.put(record("S1", "2024-01-01T11:00:00.000000", 1)).await.unwrap();
        store
            .set_status("S1", "2024-01-01T11:00:00.000000", SubmissionStatus::Processed)
            .await
            .unwrap();

        let latest = store.latest_pending("S1", 1).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, "2024-01-01T10:00:00.000000");
    }

    #[tokio::test]
    async fn test_set_status_on_unknown_record() {
        let store = InMemorySubmissionStore::new();
        assert!(store
            .set_status("S9", "never", SubmissionStatus::Processed)
            .await
            .is_err());
    }
}
