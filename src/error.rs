use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GestureError {
    #[error("invalid landmark set: expected {expected} points, got {got}")]
    InvalidInput { expected: usize, got: usize },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
