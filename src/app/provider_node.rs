use crate::app::error::{NodeError, NodeResult};
use crate::config::GameConfig;
use crate::core::resource_manager::ResourceManager;
use crate::domain::messages::{
    CalculateMatricesRequest, CalculateMatricesResponse, MatrixPayload, ProviderHealth,
    ProviderResults, Step2Preparation,
};
use crate::domain::model::{AllocationResults, AllocationVector, Matrix};
use crate::domain::ports::MatrixDispatcher;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct ProviderState {
    step: u32,
    allocations: BTreeMap<String, AllocationVector>,
    results: Option<AllocationResults>,
    step1_time_matrix: Option<Matrix>,
}

/// The resource provider: turns submitted allocations into actual
/// (multiplexed) matrices and pushes each user's row back to it.
pub struct ProviderNode {
    manager: ResourceManager,
    dispatcher: Arc<dyn MatrixDispatcher>,
    state: Mutex<ProviderState>,
}

impl ProviderNode {
    pub fn new(config: &GameConfig, dispatcher: Arc<dyn MatrixDispatcher>) -> Self {
        Self {
            manager: ResourceManager::new(config),
            dispatcher,
            state: Mutex::new(ProviderState::default()),
        }
    }

    pub async fn health(&self) -> ProviderHealth {
        ProviderHealth {
            status: "healthy".to_string(),
            role: "resource_manager".to_string(),
            step: self.state.lock().await.step,
        }
    }

    pub async fn calculate_matrices(
        &self,
        request: CalculateMatricesRequest,
    ) -> NodeResult<CalculateMatricesResponse> {
        let allocations = request
            .allocations
            .ok_or_else(|| NodeError::BadRequest("Missing allocations".to_string()))?;
        let step = request.step.unwrap_or(1);
        tracing::info!("📥 Calculate matrices request (step {})", step);

        let missing = self.manager.missing_users(&allocations);
        if !missing.is_empty() {
            return Err(NodeError::BadRequest(format!(
                "Missing allocations for: {}",
                missing.join(", ")
            )));
        }

        let results = self.manager.process_allocations(&allocations)?;
        let multiplexing = self.manager.check_multiplexing(&results.allocation_matrix);

        {
            let mut state = self.state.lock().await;
            state.step = step;
            state.allocations = allocations;
            state.results = Some(results.clone());
            if step == 1 {
                state.step1_time_matrix = Some(results.time_matrix.clone());
            }
        }

        let user_responses = self.send_to_users(&results, step).await;

        Ok(CalculateMatricesResponse {
            allocation_matrix: results.allocation_matrix,
            time_matrix: results.time_matrix,
            expense_matrix: results.expense_matrix,
            user_results: results.user_results,
            multiplexing,
            step,
            user_responses,
        })
    }

    async fn send_to_users(
        &self,
        results: &AllocationResults,
        step: u32,
    ) -> BTreeMap<String, serde_json::Value> {
        let mut responses = BTreeMap::new();

        for user_id in self.dispatcher.targets() {
            let Some(result) = results.user_results.get(&user_id) else {
                continue;
            };
            let payload = MatrixPayload {
                time_vector: result.time_vector.clone(),
                expense_vector: result.expense_vector.clone(),
                step,
            };

            let response = match self.dispatcher.dispatch(&user_id, &payload).await {
                Ok(body) => {
                    tracing::info!("✅ Sent matrices to {}", user_id);
                    body
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to send matrices to {}: {}", user_id, e);
                    serde_json::json!({ "error": e.to_string() })
                }
            };
            responses.insert(user_id, response);
        }
        responses
    }

    pub async fn prepare_step2(&self) -> NodeResult<Step2Preparation> {
        let state = self.state.lock().await;
        let step1 = state
            .step1_time_matrix
            .as_ref()
            .ok_or_else(|| NodeError::BadRequest("Step 1 must be completed first".to_string()))?;

        let updated = self.manager.step2_execution_times(step1);
        let updated_execution_times = self
            .manager
            .user_ids()
            .iter()
            .cloned()
            .zip(updated)
            .collect();

        Ok(Step2Preparation {
            updated_execution_times,
            step: 2,
            message: "Send these to users for Step 2 optimization".to_string(),
        })
    }

    pub async fn results(&self) -> NodeResult<ProviderResults> {
        let state = self.state.lock().await;
        let results = state
            .results
            .clone()
            .ok_or_else(|| NodeError::NotFound("No results available yet".to_string()))?;

        Ok(ProviderResults {
            step: state.step,
            allocations: state.allocations.clone(),
            allocation_matrix: results.allocation_matrix,
            time_matrix: results.time_matrix,
            expense_matrix: results.expense_matrix,
            user_results: results.user_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::{AllocError, Result};
    use async_trait::async_trait;

    /// S1 回應成功，S2 失敗，S3 沒有設定端點
    #[derive(Default)]
    struct ScriptedDispatcher {
        sent: std::sync::Mutex<Vec<(String, MatrixPayload)>>,
    }

    #[async_trait]
    impl MatrixDispatcher for ScriptedDispatcher {
        fn targets(&self) -> Vec<String> {
            vec!["S1".to_string(), "S2".to_string()]
        }

        async fn dispatch(&self, user_id: &str, payload: &MatrixPayload) -> Result<serde_json::Value> {
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), payload.clone()));
            if user_id == "S2" {
                return Err(AllocError::StateError {
                    message: "connection refused".to_string(),
                });
            }
            Ok(serde_json::json!({ "user_id": user_id }))
        }
    }

    fn step1_request() -> CalculateMatricesRequest {
        CalculateMatricesRequest {
            allocations: Some(BTreeMap::from([
                ("S1".to_string(), vec![0, 0, 0, 1, 1]),
                ("S2".to_string(), vec![0, 0, 1, 1, 1]),
                ("S3".to_string(), vec![0, 1, 1, 1, 1]),
            ])),
            step: Some(1),
        }
    }

    #[tokio::test]
    async fn test_calculate_matrices_dispatches_rows() {
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let node = ProviderNode::new(&GameConfig::default(), dispatcher.clone());

        let response = node.calculate_matrices(step1_request()).await.unwrap();
        assert_eq!(response.step, 1);
        assert_eq!(response.multiplexing["R5"].count, 3);
        assert_eq!(response.user_responses["S1"]["user_id"], "S1");
        assert!(response.user_responses["S2"]["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
        assert!(!response.user_responses.contains_key("S3"));

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent[0].1.time_vector, vec![0.0, 0.0, 0.0, 9.0, 8.4]);
        assert_eq!(node.health().await.step, 1);
    }

    #[tokio::test]
    async fn test_missing_allocations_are_bad_requests() {
        let node = ProviderNode::new(&GameConfig::default(), Arc::new(ScriptedDispatcher::default()));

        let err = node
            .calculate_matrices(CalculateMatricesRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let mut request = step1_request();
        request.allocations.as_mut().unwrap().remove("S3");
        let err = node.calculate_matrices(request).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("S3"));
    }

    #[tokio::test]
    async fn test_prepare_step2_needs_step1() {
        let node = ProviderNode::new(&GameConfig::default(), Arc::new(ScriptedDispatcher::default()));
        assert_eq!(node.prepare_step2().await.unwrap_err().status_code(), 400);

        node.calculate_matrices(step1_request()).await.unwrap();
        let prepared = node.prepare_step2().await.unwrap();
        assert_eq!(prepared.step, 2);
        assert_eq!(prepared.updated_execution_times["S1"][0], 5.0);
        assert!((prepared.updated_execution_times["S3"][4] - 10.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_step2_processing_keeps_step1_times() {
        let node = ProviderNode::new(&GameConfig::default(), Arc::new(ScriptedDispatcher::default()));
        node.calculate_matrices(step1_request()).await.unwrap();

        let step2 = CalculateMatricesRequest {
            allocations: Some(BTreeMap::from([
                ("S1".to_string(), vec![1, 1, 0, 0, 0]),
                ("S2".to_string(), vec![1, 1, 1, 0, 0]),
                ("S3".to_string(), vec![1, 1, 1, 1, 0]),
            ])),
            step: Some(2),
        };
        node.calculate_matrices(step2).await.unwrap();

        let prepared = node.prepare_step2().await.unwrap();
        assert_eq!(prepared.updated_execution_times["S1"][0], 5.0);
        assert_eq!(node.results().await.unwrap().step, 2);
    }

    #[tokio::test]
    async fn test_results_before_processing_is_not_found() {
        let node = ProviderNode::new(&GameConfig::default(), Arc::new(ScriptedDispatcher::default()));
        assert_eq!(node.results().await.unwrap_err().status_code(), 404);
    }
}
