use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// 0/1 向量，長度等於資源數
pub type AllocationVector = Vec<u8>;

/// n 個使用者 x m 個資源
pub type Matrix = Vec<Vec<f64>>;

/// Provisioning profile selected on the bootstrap command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Request-originating host running a user node.
    User,
    /// Resource-providing host running the resource manager.
    Provider,
    /// Anything else. Common setup still runs, no launch instructions follow.
    Unrecognized(String),
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value {
            "user" => Role::User,
            "provider" => Role::Provider,
            _ => Role::Unrecognized(value.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Provider => write!(f, "provider"),
            Role::Unrecognized(other) => write!(f, "{}", other),
        }
    }
}

/// One external command in a deployment workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(description: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.command_line())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResult {
    pub time_vector: Vec<f64>,
    pub expense_vector: Vec<f64>,
    pub max_time: f64,
    pub total_expense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResults {
    pub allocation_matrix: Vec<AllocationVector>,
    pub time_matrix: Matrix,
    pub expense_matrix: Matrix,
    pub user_results: BTreeMap<String, UserResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplexInfo {
    pub count: u32,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightPair {
    pub time: f64,
    pub expense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub deadline: f64,
    pub budget: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub user_id: String,
    pub allocation_vector: Option<AllocationVector>,
    pub expected_utility: f64,
    pub num_subtasks: usize,
    pub weights: WeightPair,
    pub constraints: Constraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Processed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Processed => "processed",
        }
    }
}

/// Message a user node publishes after optimizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMessage {
    pub user_id: String,
    pub allocation_vector: AllocationVector,
    pub expected_utility: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
}

/// Stored form of a submission, keyed by (user_id, timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub user_id: String,
    pub timestamp: String,
    pub allocation_vector: AllocationVector,
    pub expected_utility: f64,
    pub step: u32,
    pub status: SubmissionStatus,
}

impl SubmissionRecord {
    pub fn pending_from(message: SubmissionMessage) -> Self {
        Self {
            user_id: message.user_id,
            timestamp: message.timestamp.unwrap_or_else(current_timestamp),
            allocation_vector: message.allocation_vector,
            expected_utility: message.expected_utility,
            step: message.step.unwrap_or(1),
            status: SubmissionStatus::Pending,
        }
    }
}

/// ISO-8601 UTC 時間戳，字串排序即時間排序
pub fn current_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}
