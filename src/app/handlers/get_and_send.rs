use crate::domain::messages::{CalculateMatricesRequest, HandlerResponse, StepEvent};
use crate::domain::model::{AllocationVector, SubmissionRecord, SubmissionStatus};
use crate::domain::ports::{ResourceManagerClient, SubmissionStore};
use crate::utils::error::Result;
use serde_json::json;
use std::collections::BTreeMap;

/// Collects the latest pending allocation of every user for a step and
/// forwards them to the resource manager.
pub struct GetAndSendHandler<S: SubmissionStore, C: ResourceManagerClient> {
    store: S,
    /// `None` when no resource manager URL is configured.
    client: Option<C>,
    user_ids: Vec<String>,
}

impl<S: SubmissionStore, C: ResourceManagerClient> GetAndSendHandler<S, C> {
    pub fn new(store: S, client: Option<C>, user_ids: Vec<String>) -> Self {
        Self {
            store,
            client,
            user_ids,
        }
    }

    pub async fn handle(&self, event: StepEvent) -> HandlerResponse {
        tracing::info!(
            "Get-and-send for step {} (source: {})",
            event.step,
            event.trigger_source.as_deref().unwrap_or("manual")
        );

        match self.process(event.step).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("❌ Error in get-and-send: {}", e);
                HandlerResponse::json(500, &json!({ "error": e.to_string() }))
            }
        }
    }

    async fn process(&self, step: u32) -> Result<HandlerResponse> {
        let records = self.pending_records(step).await;
        let allocations: BTreeMap<String, AllocationVector> = records
            .iter()
            .map(|r| (r.user_id.clone(), r.allocation_vector.clone()))
            .collect();

        if allocations.len() != self.user_ids.len() {
            return Ok(HandlerResponse::json(
                400,
                &json!({
                    "error": format!(
                        "Expected {} allocations, got {}",
                        self.user_ids.len(),
                        allocations.len()
                    ),
                    "allocations": allocations,
                }),
            ));
        }

        let Some(client) = &self.client else {
            tracing::warn!("⚠️ RESOURCE_MANAGER_URL not configured");
            return Ok(HandlerResponse::json(
                200,
                &json!({
                    "message": "Retrieved allocations but Resource Manager URL not configured",
                    "allocations": allocations,
                }),
            ));
        };

        let request = CalculateMatricesRequest {
            allocations: Some(allocations.clone()),
            step: Some(step),
        };
        let manager_response = client.calculate_matrices(&request).await?;

        for record in &records {
            if let Err(e) = self
                .store
                .set_status(&record.user_id, &record.timestamp, SubmissionStatus::Processed)
                .await
            {
                tracing::error!("Error updating status for {}: {}", record.user_id, e);
            }
        }

        Ok(HandlerResponse::json(
            200,
            &json!({
                "message": format!("Successfully processed step {}", step),
                "allocations": allocations,
                "resource_manager_response": manager_response,
            }),
        ))
    }

    /// 查不到或查詢失敗的使用者只記 log，由呼叫端檢查數量
    async fn pending_records(&self, step: u32) -> Vec<SubmissionRecord> {
        let mut records = Vec::with_capacity(self.user_ids.len());
        for user_id in &self.user_ids {
            match self.store.latest_pending(user_id, step).await {
                Ok(Some(record)) => {
                    tracing::info!(
                        "Found allocation for {}: {:?}",
                        user_id,
                        record.allocation_vector
                    );
                    records.push(record);
                }
                Ok(None) => {
                    tracing::warn!("No pending allocation found for {} in step {}", user_id, step)
                }
                Err(e) => tracing::error!("Error retrieving allocation for {}: {}", user_id, e),
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{HttpResourceManagerClient, InMemorySubmissionStore};
    use crate::utils::error::AllocError;
    use async_trait::async_trait;

    struct FailingClient;

    #[async_trait]
    impl ResourceManagerClient for FailingClient {
        async fn calculate_matrices(
            &self,
            _request: &CalculateMatricesRequest,
        ) -> Result<serde_json::Value> {
            Err(AllocError::StepFailed {
                step: "calculate_matrices".to_string(),
                detail: "HTTP 500".to_string(),
            })
        }
    }

    fn users() -> Vec<String> {
        vec!["S1".to_string(), "S2".to_string(), "S3".to_string()]
    }

    async fn seeded_store(user_ids: &[&str]) -> InMemorySubmissionStore {
        let store = InMemorySubmissionStore::new();
        for (i, user_id) in user_ids.iter().enumerate() {
            store
                .put(SubmissionRecord {
                    user_id: user_id.to_string(),
                    timestamp: format!("2024-01-01T10:00:0{}.000000", i),
                    allocation_vector: vec![0, 0, 1, 1, 1],
                    expected_utility: 0.2,
                    step: 1,
                    status: SubmissionStatus::Pending,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_incomplete_submissions_are_rejected() {
        let store = seeded_store(&["S1", "S2"]).await;
        let handler: GetAndSendHandler<_, FailingClient> =
            GetAndSendHandler::new(store, None, users());

        let response = handler.handle(StepEvent::from_submission_handler(1)).await;
        assert_eq!(response.status_code, 400);
        let body = response.body_json();
        assert_eq!(body["error"], "Expected 3 allocations, got 2");
        assert!(body["allocations"]["S1"].is_array());
    }

    #[tokio::test]
    async fn test_without_manager_url_returns_allocations() {
        let store = seeded_store(&["S1", "S2", "S3"]).await;
        let handler: GetAndSendHandler<_, FailingClient> =
            GetAndSendHandler::new(store.clone(), None, users());

        let response = handler.handle(StepEvent::from_submission_handler(1)).await;
        assert_eq!(response.status_code, 200);
        assert!(response.body_json()["message"]
            .as_str()
            .unwrap()
            .contains("not configured"));
        // 沒有送出就不標記 processed
        assert!(store.latest_pending("S1", 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_manager_failure_is_500_and_keeps_pending() {
        let store = seeded_store(&["S1", "S2", "S3"]).await;
        let handler = GetAndSendHandler::new(store.clone(), Some(FailingClient), users());

        let response = handler.handle(StepEvent::from_submission_handler(1)).await;
        assert_eq!(response.status_code, 500);
        assert!(response.body_json()["error"]
            .as_str()
            .unwrap()
            .contains("HTTP 500"));
        assert!(store.latest_pending("S3", 1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sends_to_manager_and_marks_processed() {
        let server = httpmock::MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/calculate_matrices")
                .json_body_partial(r#"{"step": 1}"#);
            then.status(200)
                .json_body(json!({"step": 1, "user_responses": {}}));
        });

        let store = seeded_store(&["S1", "S2", "S3"]).await;
        let client = HttpResourceManagerClient::new(&format!("{}/", server.base_url())).unwrap();
        let handler = GetAndSendHandler::new(store.clone(), Some(client), users());

        let response = handler.handle(StepEvent::from_submission_handler(1)).await;
        api_mock.assert();
        assert_eq!(response.status_code, 200);
        let body = response.body_json();
        assert_eq!(body["message"], "Successfully processed step 1");
        assert_eq!(body["resource_manager_response"]["step"], 1);

        for user_id in ["S1", "S2", "S3"] {
            assert!(store.latest_pending(user_id, 1).await.unwrap().is_none());
        }
    }
}
