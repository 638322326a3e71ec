use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("No tokio runtime available to drive the system")]
    NoRuntime,

    #[error("Configuration error: {0}")]
    Config(String),
}
