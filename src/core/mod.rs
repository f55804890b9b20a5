pub mod calculations;
pub mod game;
pub mod optimizer;
pub mod resource_manager;

pub use crate::domain::model::{AllocationResults, AllocationVector, Matrix};
pub use crate::domain::ports::{CommandRunner, Storage, SubmissionStore};
pub use crate::utils::error::Result;
