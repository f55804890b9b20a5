// Wire-level request / response bodies shared by the nodes and the Lambda handlers.

use crate::domain::model::{
    AllocationVector, Constraints, Matrix, MultiplexInfo, UserResult, WeightPair,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_step() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub step: Option<u32>,
    #[serde(default)]
    pub custom_execution_times: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub user_id: String,
    pub allocation_vector: AllocationVector,
    pub expected_utility: f64,
    pub step: u32,
    pub status: String,
}

/// Body the provider sends to every user after computing the matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixPayload {
    pub time_vector: Vec<f64>,
    pub expense_vector: Vec<f64>,
    pub step: u32,
}

/// Incoming form of [`MatrixPayload`]; fields are optional so that missing
/// vectors can be answered with a client error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiveMatricesRequest {
    #[serde(default)]
    pub time_vector: Option<Vec<f64>>,
    #[serde(default)]
    pub expense_vector: Option<Vec<f64>>,
    #[serde(default)]
    pub step: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveMatricesResponse {
    pub user_id: String,
    pub actual_utility: f64,
    pub expected_utility: Option<f64>,
    pub utility_loss: f64,
    pub max_time: f64,
    pub total_expense: f64,
    pub step: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserHealth {
    pub status: String,
    pub user_id: String,
    pub step: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationStatus {
    pub user_id: String,
    pub allocation_vector: Option<AllocationVector>,
    pub expected_utility: Option<f64>,
    pub actual_utility: Option<f64>,
    pub step: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResultsReport {
    pub user_id: String,
    pub allocation_vector: Option<AllocationVector>,
    pub expected_utility: Option<f64>,
    pub actual_utility: Option<f64>,
    pub utility_loss: Option<f64>,
    pub max_time: Option<f64>,
    pub total_expense: Option<f64>,
    pub step: u32,
    pub constraints: Constraints,
    pub weights: WeightPair,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculateMatricesRequest {
    #[serde(default)]
    pub allocations: Option<BTreeMap<String, AllocationVector>>,
    #[serde(default)]
    pub step: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculateMatricesResponse {
    pub allocation_matrix: Vec<AllocationVector>,
    pub time_matrix: Matrix,
    pub expense_matrix: Matrix,
    pub user_results: BTreeMap<String, UserResult>,
    pub multiplexing: BTreeMap<String, MultiplexInfo>,
    pub step: u32,
    pub user_responses: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: String,
    pub role: String,
    pub step: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step2Preparation {
    pub updated_execution_times: BTreeMap<String, Vec<f64>>,
    pub step: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResults {
    pub step: u32,
    pub allocations: BTreeMap<String, AllocationVector>,
    pub allocation_matrix: Vec<AllocationVector>,
    pub time_matrix: Matrix,
    pub expense_matrix: Matrix,
    pub user_results: BTreeMap<String, UserResult>,
}

/// SQS event delivered to the submission handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqsRecord {
    pub body: String,
}

/// Event for the get-and-send function, sent by the submission handler or by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    #[serde(default = "default_step")]
    pub step: u32,
    #[serde(default)]
    pub trigger_source: Option<String>,
}

impl StepEvent {
    pub fn from_submission_handler(step: u32) -> Self {
        Self {
            step,
            trigger_source: Some("submission_handler".to_string()),
        }
    }
}

/// API Gateway style response returned by both handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    pub fn json(status_code: u16, body: &serde_json::Value) -> Self {
        Self {
            status_code,
            body: body.to_string(),
        }
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}
