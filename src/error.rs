use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("turn cancelled")]
    Cancelled,
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("tool loop did not finish within {0} iterations")]
    IterationLimit(usize),
    #[error("failed to encode tool result: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("API returned {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
}
