use crate::domain::messages::{HandlerResponse, SqsEvent};
use crate::domain::model::{SubmissionMessage, SubmissionRecord};
use crate::domain::ports::{StepTrigger, SubmissionStore};
use crate::utils::error::Result;
use serde_json::json;

/// Stores queued submissions and starts get-and-send once every user has
/// a pending submission for the step.
pub struct SubmissionHandler<S: SubmissionStore, T: StepTrigger> {
    store: S,
    trigger: T,
    user_ids: Vec<String>,
}

impl<S: SubmissionStore, T: StepTrigger> SubmissionHandler<S, T> {
    pub fn new(store: S, trigger: T, user_ids: Vec<String>) -> Self {
        Self {
            store,
            trigger,
            user_ids,
        }
    }

    pub async fn handle(&self, event: SqsEvent) -> HandlerResponse {
        tracing::info!("Received {} SQS records", event.records.len());
        let mut processed = 0usize;

        for (index, record) in event.records.iter().enumerate() {
            match self.process_record(&record.body).await {
                Ok(()) => processed += 1,
                // 壞掉的訊息略過，繼續處理其他紀錄
                Err(e) => tracing::error!("❌ Error processing record {}: {}", index, e),
            }
        }

        HandlerResponse::json(
            200,
            &json!({
                "message": format!("Processed {} allocations", processed),
                "processed": processed,
            }),
        )
    }

    async fn process_record(&self, body: &str) -> Result<()> {
        let message: SubmissionMessage = serde_json::from_str(body)?;
        let record = SubmissionRecord::pending_from(message);
        let step = record.step;
        tracing::info!(
            "Processing allocation for {}, step {}",
            record.user_id,
            step
        );

        self.store.put(record).await?;

        if self.all_users_submitted(step).await {
            tracing::info!("All users submitted for step {}, triggering get-and-send", step);
            self.trigger.trigger(step).await?;
        }
        Ok(())
    }

    async fn all_users_submitted(&self, step: u32) -> bool {
        let mut submitted = Vec::new();
        for user_id in &self.user_ids {
            match self.store.latest_pending(user_id, step).await {
                Ok(Some(_)) => submitted.push(user_id.as_str()),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Error checking submissions: {}", e);
                    return false;
                }
            }
        }
        tracing::info!(
            "Step {} - submitted: [{}], all submitted: {}",
            step,
            submitted.join(", "),
            submitted.len() == self.user_ids.len()
        );
        submitted.len() == self.user_ids.len()
    }
}
