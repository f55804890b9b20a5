use crate::app::error::{NodeError, NodeResult};
use crate::config::GameConfig;
use crate::core::calculations::{max_value, total};
use crate::core::optimizer::UserOptimizer;
use crate::domain::messages::{
    AllocationStatus, OptimizeRequest, OptimizeResponse, ReceiveMatricesRequest,
    ReceiveMatricesResponse, UserHealth, UserResultsReport,
};
use crate::domain::model::{current_timestamp, SubmissionMessage};
use crate::domain::ports::SubmissionSink;
use crate::utils::error::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

struct UserState {
    optimizer: UserOptimizer,
    step: u32,
    actual_utility: Option<f64>,
    time_vector: Option<Vec<f64>>,
    expense_vector: Option<Vec<f64>>,
}

/// One user of the game: optimizes its own allocation, submits it, and
/// scores the matrices the provider sends back.
pub struct UserNode {
    user_id: String,
    sink: Arc<dyn SubmissionSink>,
    state: Mutex<UserState>,
}

impl UserNode {
    pub fn new(config: &GameConfig, user_id: &str, sink: Arc<dyn SubmissionSink>) -> Result<Self> {
        let optimizer = UserOptimizer::new(config, user_id)?;
        Ok(Self {
            user_id: user_id.to_string(),
            sink,
            state: Mutex::new(UserState {
                optimizer,
                step: 0,
                actual_utility: None,
                time_vector: None,
                expense_vector: None,
            }),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn health(&self) -> UserHealth {
        UserHealth {
            status: "healthy".to_string(),
            user_id: self.user_id.clone(),
            step: self.state.lock().await.step,
        }
    }

    pub async fn optimize(&self, request: OptimizeRequest) -> NodeResult<OptimizeResponse> {
        let step = request.step.unwrap_or(1);
        tracing::info!("🧮 {} optimizing for step {}", self.user_id, step);

        let (allocation, expected_utility) = {
            let mut state = self.state.lock().await;
            let result = state
                .optimizer
                .optimize(request.custom_execution_times.as_deref())?;
            state.step = step;
            // 舊的實際效用屬於上一個配置
            state.actual_utility = None;
            state.time_vector = None;
            state.expense_vector = None;
            result
        };

        let message = SubmissionMessage {
            user_id: self.user_id.clone(),
            allocation_vector: allocation.clone(),
            expected_utility,
            timestamp: Some(current_timestamp()),
            step: Some(step),
        };
        if let Err(e) = self.sink.submit(&message).await {
            tracing::warn!("⚠️ Submission of {} failed: {}", self.user_id, e);
        }

        Ok(OptimizeResponse {
            user_id: self.user_id.clone(),
            allocation_vector: allocation,
            expected_utility,
            step,
            status: "submitted".to_string(),
        })
    }

    pub async fn receive_matrices(
        &self,
        request: ReceiveMatricesRequest,
    ) -> NodeResult<ReceiveMatricesResponse> {
        let (time_vector, expense_vector) = match (request.time_vector, request.expense_vector) {
            (Some(t), Some(e)) if !t.is_empty() && !e.is_empty() => (t, e),
            _ => {
                return Err(NodeError::BadRequest(
                    "Missing time_vector or expense_vector".to_string(),
                ))
            }
        };

        let mut state = self.state.lock().await;
        if state.optimizer.optimal_allocation().is_none() {
            return Err(NodeError::Conflict(format!(
                "{} has not optimized yet, call /optimize first",
                self.user_id
            )));
        }

        let actual_utility = state
            .optimizer
            .actual_utility_from_matrices(&time_vector, &expense_vector)?;
        let expected_utility = state.optimizer.optimal_utility();
        let step = request.step.unwrap_or(state.step);

        let response = ReceiveMatricesResponse {
            user_id: self.user_id.clone(),
            actual_utility,
            expected_utility: Some(expected_utility),
            utility_loss: expected_utility - actual_utility,
            max_time: max_value(&time_vector),
            total_expense: total(&expense_vector),
            step,
        };

        state.step = step;
        state.actual_utility = Some(actual_utility);
        state.time_vector = Some(time_vector);
        state.expense_vector = Some(expense_vector);
        Ok(response)
    }

    pub async fn allocation(&self) -> AllocationStatus {
        let state = self.state.lock().await;
        let allocation = state.optimizer.optimal_allocation().cloned();
        AllocationStatus {
            user_id: self.user_id.clone(),
            expected_utility: allocation.as_ref().map(|_| state.optimizer.optimal_utility()),
            allocation_vector: allocation,
            actual_utility: state.actual_utility,
            step: state.step,
        }
    }

    pub async fn results(&self) -> UserResultsReport {
        let state = self.state.lock().await;
        let summary = state.optimizer.results();
        let expected_utility = summary
            .allocation_vector
            .as_ref()
            .map(|_| summary.expected_utility);

        UserResultsReport {
            user_id: self.user_id.clone(),
            allocation_vector: summary.allocation_vector,
            expected_utility,
            actual_utility: state.actual_utility,
            utility_loss: expected_utility
                .zip(state.actual_utility)
                .map(|(expected, actual)| expected - actual),
            max_time: state.time_vector.as_deref().map(max_value),
            total_expense: state.expense_vector.as_deref().map(total),
            step: state.step,
            constraints: summary.constraints,
            weights: summary.weights,
        }
    }
}
