use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty file uri")]
    EmptyUri,

    #[error("response is missing the `result` field")]
    MissingResult,
}
