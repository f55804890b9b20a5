pub mod get_and_send;
pub mod submission;

pub use get_and_send::GetAndSendHandler;
pub use submission::SubmissionHandler;
