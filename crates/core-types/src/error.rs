use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Bar at {timestamp} is malformed: {reason}")]
    InvalidBar { timestamp: String, reason: String },
}
