use parley_protocol::ProtocolError;
use thiserror::Error;

/// Failures talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: ProtocolError,
    },
}

/// Failures surfaced by [`SyncController`](crate::SyncController) operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("no active conversation")]
    NoActiveConversation,

    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    #[error("no failed message with id {0}")]
    UnknownMessage(String),

    #[error("{0} already in progress")]
    Busy(&'static str),

    #[error(transparent)]
    Api(#[from] ApiError),
}
