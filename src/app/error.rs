use crate::utils::error::AllocError;
use thiserror::Error;

/// Failure of a node or handler operation, carrying the HTTP status it maps to.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] AllocError),
}

impl NodeError {
    pub fn status_code(&self) -> u16 {
        match self {
            NodeError::BadRequest(_) => 400,
            NodeError::Conflict(_) => 409,
            NodeError::NotFound(_) => 404,
            // 使用者送來的配置不合法
            NodeError::Internal(AllocError::AllocationError { .. }) => 400,
            NodeError::Internal(_) => 500,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;
