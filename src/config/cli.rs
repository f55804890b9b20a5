use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_s3_bucket_name, Validate,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "cloud-alloc")]
#[command(about = "Provisioning, packaging and nodes of the cloud resource allocation game")]
pub struct CliConfig {
    #[arg(long, short, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, env = "CLOUD_ALLOC_CONFIG", help = "Deployment TOML file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, env = "CLOUD_ALLOC_GAME_CONFIG", help = "Game TOML file")]
    pub game_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Provision this host for a role and print how to launch its node
    Bootstrap {
        /// `user` or `provider`
        role: String,
        /// User id, required for the user role
        identifier: Option<String>,
        #[arg(long, help = "Log external commands instead of running them")]
        dry_run: bool,
        #[arg(long)]
        target_dir: Option<PathBuf>,
    },
    /// Build one zip archive per Lambda handler
    Package {
        #[arg(long, help = "Log dependency installs instead of running them")]
        dry_run: bool,
        #[arg(long, help = "Upload the archives to this S3 bucket")]
        bucket: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Play both steps of the game locally
    Simulate {
        #[arg(long)]
        json: bool,
    },
    /// Optimize a single user's allocation
    Optimize {
        user_id: String,
        #[arg(long, value_delimiter = ',', help = "Custom execution times, e.g. 5,5.4,8.4,12.3,11")]
        execution_times: Vec<f64>,
    },
    /// Print the effective configuration
    ShowConfig,
    /// Run a user node
    ServeUser {
        #[arg(long, env = "USER_ID", default_value = "S1")]
        user_id: String,
        #[arg(long, env = "PORT", default_value_t = 5000)]
        port: u16,
    },
    /// Run the resource provider node
    ServeProvider {
        #[arg(long, env = "PORT", default_value_t = 5001)]
        port: u16,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Bootstrap { .. } => "bootstrap",
            Command::Package { .. } => "package",
            Command::Simulate { .. } => "simulate",
            Command::Optimize { .. } => "optimize",
            Command::ShowConfig => "show-config",
            Command::ServeUser { .. } => "serve-user",
            Command::ServeProvider { .. } => "serve-provider",
        }
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.config {
            validate_path("config", &path.to_string_lossy())?;
        }
        if let Some(path) = &self.game_config {
            validate_path("game_config", &path.to_string_lossy())?;
        }

        match &self.command {
            Command::Bootstrap {
                role, target_dir, ..
            } => {
                validate_non_empty_string("role", role)?;
                if let Some(dir) = target_dir {
                    validate_path("target_dir", &dir.to_string_lossy())?;
                }
            }
            Command::Package {
                bucket: Some(bucket),
                ..
            } => validate_s3_bucket_name("bucket", bucket)?,
            Command::Optimize { user_id, .. } | Command::ServeUser { user_id, .. } => {
                validate_non_empty_string("user_id", user_id)?
            }
            _ => {}
        }

        tracing::debug!("✅ CLI configuration validation passed");
        Ok(())
    }
}
