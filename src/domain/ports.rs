use crate::domain::messages::{CalculateMatricesRequest, MatrixPayload};
use crate::domain::model::{CommandSpec, SubmissionMessage, SubmissionRecord, SubmissionStatus};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// 給使用者看的完整位置 (本地路徑或 s3:// URI)
    fn location(&self, path: &str) -> String;
}

/// Executes one external command and blocks until it finishes.
/// A non-zero exit must surface as `AllocError::StepFailed`.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &CommandSpec) -> Result<()>;

    /// 只記錄不執行的 runner 回傳 true，bootstrap 據此跳過目錄重建
    fn is_dry_run(&self) -> bool {
        false
    }
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn put(&self, record: SubmissionRecord) -> Result<()>;

    /// Most recent pending submission of `user_id` for `step`, if any.
    async fn latest_pending(&self, user_id: &str, step: u32) -> Result<Option<SubmissionRecord>>;

    async fn set_status(
        &self,
        user_id: &str,
        timestamp: &str,
        status: SubmissionStatus,
    ) -> Result<()>;
}

#[async_trait]
pub trait StepTrigger: Send + Sync {
    async fn trigger(&self, step: u32) -> Result<()>;
}

#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, message: &SubmissionMessage) -> Result<()>;
}

#[async_trait]
pub trait MatrixDispatcher: Send + Sync {
    /// Users that have an endpoint configured, in dispatch order.
    fn targets(&self) -> Vec<String>;

    async fn dispatch(&self, user_id: &str, payload: &MatrixPayload) -> Result<serde_json::Value>;
}

#[async_trait]
pub trait ResourceManagerClient: Send + Sync {
    async fn calculate_matrices(
        &self,
        request: &CalculateMatricesRequest,
    ) -> Result<serde_json::Value>;
}
