// Concrete implementations of the domain ports (filesystem, S3, DynamoDB, SQS, Lambda, HTTP).

#[cfg(feature = "aws")]
pub mod aws;
pub mod http;
pub mod memory;
pub mod storage;

#[cfg(feature = "aws")]
pub use aws::{DynamoSubmissionStore, LambdaStepTrigger, SqsSubmissionSink};
pub use http::{HttpMatrixDispatcher, HttpResourceManagerClient};
pub use memory::{InMemorySubmissionStore, LogOnlySink};
#[cfg(feature = "aws")]
pub use storage::S3Storage;
pub use storage::LocalStorage;
