use crate::config::GameConfig;
use crate::utils::error::{AllocError, Result};
use crate::utils::validation::{
    validate_aws_region, validate_non_empty_string, validate_optional_url, Validate,
};
use std::env;

/// Environment of the two Lambda handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaConfig {
    pub table_name: String,
    /// Function the submission handler invokes once every user has submitted.
    pub get_and_send_function: String,
    /// 空字串代表未設定
    pub resource_manager_url: String,
    pub region: String,
    /// Users that must submit before a step is processed.
    pub user_ids: Vec<String>,
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            table_name: "ResourceAllocations".to_string(),
            get_and_send_function: "get-and-send".to_string(),
            resource_manager_url: String::new(),
            region: "us-east-1".to_string(),
            user_ids: GameConfig::default().user_ids(),
        }
    }
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            table_name: env::var("DYNAMODB_TABLE").unwrap_or(defaults.table_name),
            get_and_send_function: env::var("LAMBDA_FUNCTION_2")
                .unwrap_or(defaults.get_and_send_function),
            resource_manager_url: env::var("RESOURCE_MANAGER_URL")
                .unwrap_or(defaults.resource_manager_url),
            region: env::var("AWS_REGION").unwrap_or(defaults.region),
            user_ids: match env::var("USER_IDS") {
                Ok(ids) => parse_user_ids(&ids),
                Err(_) => defaults.user_ids,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn resource_manager_url(&self) -> Option<&str> {
        let url = self.resource_manager_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// `S1,S2,S3` -> `["S1", "S2", "S3"]`
pub fn parse_user_ids(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

impl Validate for LambdaConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("DYNAMODB_TABLE", &self.table_name)?;
        validate_non_empty_string("LAMBDA_FUNCTION_2", &self.get_and_send_function)?;
        validate_optional_url("RESOURCE_MANAGER_URL", &self.resource_manager_url)?;
        validate_aws_region("AWS_REGION", &self.region)?;
        if self.user_ids.is_empty() {
            return Err(AllocError::MissingConfigError {
                field: "USER_IDS".to_string(),
            });
        }

        tracing::info!("✅ Lambda configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_without_manager_url() {
        let config = LambdaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resource_manager_url(), None);
    }

    #[test]
    fn test_manager_url_is_trimmed() {
        let config = LambdaConfig {
            resource_manager_url: " http://10.0.0.5:5001 ".to_string(),
            ..LambdaConfig::default()
        };
        assert_eq!(config.resource_manager_url(), Some("http://10.0.0.5:5001"));
    }

    #[test]
    fn test_parse_user_ids() {
        assert_eq!(parse_user_ids(" S1, S2,,S3 "), vec!["S1", "S2", "S3"]);
        let config = LambdaConfig {
            user_ids: parse_user_ids(""),
            ..LambdaConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_region_is_rejected() {
        let config = LambdaConfig {
            region: "Mars North".to_string(),
            ..LambdaConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
