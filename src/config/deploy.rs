use crate::config::substitute_env_vars;
use crate::domain::model::CommandSpec;
use crate::utils::error::{AllocError, Result};
use crate::utils::validation::{
    validate_aws_region, validate_non_empty_string, validate_optional_url, validate_path,
    validate_range, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Settings for the operator-facing workflows (bootstrap, package) and the
/// cloud endpoints the nodes talk to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeployConfig {
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub packaging: PackagingConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// 每次執行都會被清空重建
    pub target_dir: PathBuf,
    /// Package manager update and runtime installation, in order.
    pub setup_commands: Vec<CommandSpec>,
    /// Installs the manifest; runs inside `target_dir`.
    pub install_command: CommandSpec,
    pub user_port: u16,
    pub provider_port: u16,
    /// Name of the binary the printed instructions launch.
    pub launcher: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("CloudResourceAllocation"),
            setup_commands: vec![
                CommandSpec::new("update package manager", "sudo").args(["yum", "update", "-y"]),
                CommandSpec::new("install runtime", "sudo").args([
                    "yum",
                    "install",
                    "-y",
                    "python3",
                    "python3-pip",
                ]),
            ],
            install_command: CommandSpec::new("install dependencies", "pip3").args([
                "install",
                "--user",
                "-r",
                "requirements.txt",
            ]),
            user_port: 5000,
            provider_port: 5001,
            launcher: "cloud-alloc".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingConfig {
    /// Staging area, wiped once at the start of every run.
    pub build_dir: PathBuf,
    /// Where the archives land (or the key prefix when uploading).
    pub output_dir: PathBuf,
    /// Dependency installer. `{target}` is replaced with the staging directory
    /// and the handler's dependencies are appended.
    pub installer: CommandSpec,
    pub handlers: Vec<HandlerSpec>,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            output_dir: PathBuf::from("."),
            installer: CommandSpec::new("install handler dependencies", "pip3").args([
                "install",
                "--target",
                "{target}",
            ]),
            handlers: vec![
                HandlerSpec::new(
                    "submission_handler",
                    "target/lambda/submission_handler/bootstrap",
                ),
                HandlerSpec::new("get_and_send", "target/lambda/get_and_send/bootstrap"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerSpec {
    pub name: String,
    pub source: PathBuf,
    /// File name inside the archive; defaults to the source's file name.
    #[serde(default)]
    pub entry_name: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl HandlerSpec {
    pub fn new(name: &str, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            source: source.into(),
            entry_name: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.name)
    }

    pub fn entry_name(&self) -> Result<String> {
        if let Some(name) = &self.entry_name {
            return Ok(name.clone());
        }
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AllocError::InvalidConfigValueError {
                field: format!("packaging.handlers.{}.source", self.name),
                value: self.source.display().to_string(),
                reason: "Source path has no file name".to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub region: String,
    /// 空字串代表不送 SQS
    #[serde(default)]
    pub queue_url: String,
    pub table_name: String,
    #[serde(default)]
    pub resource_manager_url: String,
    #[serde(default)]
    pub user_urls: BTreeMap<String, String>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            queue_url: String::new(),
            table_name: "ResourceAllocations".to_string(),
            resource_manager_url: String::new(),
            user_urls: BTreeMap::new(),
        }
    }
}

impl CloudConfig {
    /// Parses `S1=http://host:5000,S2=http://host2:5000`.
    pub fn parse_user_urls(value: &str) -> Result<BTreeMap<String, String>> {
        let mut urls = BTreeMap::new();
        for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (user, url) = pair
                .split_once('=')
                .ok_or_else(|| AllocError::InvalidConfigValueError {
                    field: "USER_URLS".to_string(),
                    value: pair.to_string(),
                    reason: "Expected <user_id>=<url>".to_string(),
                })?;
            urls.insert(user.trim().to_string(), url.trim().to_string());
        }
        Ok(urls)
    }
}

impl DeployConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AllocError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| AllocError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(region) = env::var("AWS_REGION") {
            self.cloud.region = region;
        }
        if let Ok(queue_url) = env::var("SQS_QUEUE_URL") {
            self.cloud.queue_url = queue_url;
        }
        if let Ok(table) = env::var("DYNAMODB_TABLE") {
            self.cloud.table_name = table;
        }
        if let Ok(url) = env::var("RESOURCE_MANAGER_URL") {
            self.cloud.resource_manager_url = url;
        }
        if let Ok(urls) = env::var("USER_URLS") {
            self.cloud.user_urls = CloudConfig::parse_user_urls(&urls)?;
        }
        Ok(())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_path(
            "bootstrap.target_dir",
            &self.bootstrap.target_dir.to_string_lossy(),
        )?;
        validate_range("bootstrap.user_port", self.bootstrap.user_port, 1, u16::MAX)?;
        validate_range(
            "bootstrap.provider_port",
            self.bootstrap.provider_port,
            1,
            u16::MAX,
        )?;
        validate_non_empty_string("bootstrap.launcher", &self.bootstrap.launcher)?;

        validate_path(
            "packaging.build_dir",
            &self.packaging.build_dir.to_string_lossy(),
        )?;
        let mut names = std::collections::HashSet::new();
        for handler in &self.packaging.handlers {
            validate_non_empty_string("packaging.handlers.name", &handler.name)?;
            if !names.insert(handler.name.as_str()) {
                return Err(AllocError::InvalidConfigValueError {
                    field: "packaging.handlers.name".to_string(),
                    value: handler.name.clone(),
                    reason: "Handler names must be unique, archives are named after them"
                        .to_string(),
                });
            }
            handler.entry_name()?;
        }

        validate_aws_region("cloud.region", &self.cloud.region)?;
        validate_non_empty_string("cloud.table_name", &self.cloud.table_name)?;
        validate_optional_url("cloud.queue_url", &self.cloud.queue_url)?;
        validate_optional_url("cloud.resource_manager_url", &self.cloud.resource_manager_url)?;
        for (user, url) in &self.cloud.user_urls {
            validate_optional_url(&format!("cloud.user_urls.{}", user), url)?;
        }
        Ok(())
    }
}

impl Validate for DeployConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DeployConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.packaging.handlers.len(), 2);
        assert_eq!(config.packaging.handlers[0].archive_name(), "submission_handler.zip");
        assert_eq!(config.packaging.handlers[1].entry_name().unwrap(), "bootstrap");
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_content = r#"
[bootstrap]
target_dir = "/opt/alloc"
user_port = 8000
provider_port = 8001
launcher = "cloud-alloc"

[bootstrap.install_command]
description = "install dependencies"
program = "pip3"
args = ["install", "-r", "requirements.txt"]

[[bootstrap.setup_commands]]
description = "install runtime"
program = "apt-get"
args = ["install", "-y", "python3"]

[cloud]
region = "eu-central-1"
table_name = "Allocations"
resource_manager_url = "http://10.0.0.5:5001"

[cloud.user_urls]
S1 = "http://10.0.0.1:5000"
"#;
        let config = DeployConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.bootstrap.target_dir, PathBuf::from("/opt/alloc"));
        assert_eq!(config.bootstrap.setup_commands.len(), 1);
        assert_eq!(config.packaging, PackagingConfig::default());
        assert_eq!(config.cloud.user_urls["S1"], "http://10.0.0.1:5000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_user_urls() {
        let urls = CloudConfig::parse_user_urls("S1=http://a:5000, S2=http://b:5000").unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls["S2"], "http://b:5000");
        assert!(CloudConfig::parse_user_urls("S1").is_err());
    }

    #[test]
    fn test_duplicate_handler_names_are_rejected() {
        let mut config = DeployConfig::default();
        config.packaging.handlers[1].name = "submission_handler".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_resource_manager_url_is_rejected() {
        let mut config = DeployConfig::default();
        config.cloud.resource_manager_url = "ftp://nowhere".to_string();
        assert!(config.validate().is_err());
    }
}
