pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod deploy;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};
pub use config::{DeployConfig, GameConfig};

pub use adapters::{InMemorySubmissionStore, LocalStorage};
#[cfg(feature = "aws")]
pub use adapters::S3Storage;

pub use app::{ProviderNode, UserNode};
pub use core::game::GameSimulation;
pub use deploy::{Bootstrapper, FunctionPackager};
pub use utils::error::{AllocError, Result};
