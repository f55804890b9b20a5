use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllocError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Step '{step}' failed: {detail}")]
    StepFailed { step: String, detail: String },

    #[error("Allocation error: {message}")]
    AllocationError { message: String },

    #[error("Invalid state: {message}")]
    StateError { message: String },

    #[error("AWS service error: {message}")]
    AwsError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Deployment,
    Network,
    Data,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AllocError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AllocError::ConfigError { .. }
            | AllocError::ConfigValidationError { .. }
            | AllocError::InvalidConfigValueError { .. }
            | AllocError::MissingConfigError { .. } => ErrorCategory::Configuration,
            AllocError::StepFailed { .. } | AllocError::ZipError(_) => ErrorCategory::Deployment,
            AllocError::ApiError(_) | AllocError::AwsError { .. } => ErrorCategory::Network,
            AllocError::SerializationError(_)
            | AllocError::AllocationError { .. }
            | AllocError::StateError { .. } => ErrorCategory::Data,
            AllocError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Deployment | ErrorCategory::Data => {
                ErrorSeverity::High
            }
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AllocError::StepFailed { .. } => {
                "Check the output of the failing command above, fix the host and rerun"
            }
            AllocError::ZipError(_) => "Make sure the staging directory is readable and retry",
            AllocError::ApiError(_) => "Check that the peer node is running and reachable",
            AllocError::AwsError { .. } => {
                "Check AWS credentials, region and that the target resource exists"
            }
            AllocError::IoError(_) => "Check file permissions and available disk space",
            AllocError::SerializationError(_) => "Check the request body is valid JSON",
            AllocError::MissingConfigError { .. } => {
                "Provide the missing value via flag, config file or environment"
            }
            AllocError::ConfigError { .. }
            | AllocError::ConfigValidationError { .. }
            | AllocError::InvalidConfigValueError { .. } => {
                "Review the configuration file and command line arguments"
            }
            AllocError::AllocationError { .. } => {
                "Make sure every user submitted one allocation vector per configured resource"
            }
            AllocError::StateError { .. } => "Run the earlier step of the game first",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            AllocError::StepFailed { step, .. } => format!("Step '{}' failed, aborting", step),
            AllocError::MissingConfigError { field } => {
                format!("Missing required setting: {}", field)
            }
            other => other.to_string(),
        }
    }

    /// 對應到 CLI 的退出碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, AllocError>;
