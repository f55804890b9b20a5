pub mod error;
pub mod handlers;
#[cfg(feature = "cli")]
pub mod http;
pub mod provider_node;
pub mod user_node;

pub use error::{NodeError, NodeResult};
pub use provider_node::ProviderNode;
pub use user_node::UserNode;
