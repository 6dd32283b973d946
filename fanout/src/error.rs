use crate::api::ApiResponse;

/// Errors produced while validating, persisting, or delivering events.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid routing key")]
    InvalidRoutingKey,

    #[error("unrecognized event version: {0}")]
    UnrecognizedVersion(String),

    #[error("malformed event payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The events API settled on a non-2xx response after the transport
    /// exhausted its retry budget. The response is retained for logging and
    /// for capture on the stored event record.
    #[error("events API returned an error response (status {})", .response.status_code)]
    Api { response: ApiResponse },

    #[error("buffer for {routing_key} hit limit of {limit}, normally indicating an excess of events")]
    BufferOverflow { routing_key: String, limit: usize },

    /// The job was abandoned because the queue is shutting down. The stored
    /// record stays pending and is replayed at the next startup.
    #[error("job stopped while the queue was shutting down")]
    Stopped,

    #[error("request cancelled during retry backoff")]
    Cancelled,

    #[error("request body cannot be replayed for a retry")]
    StreamingBody,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("event record {0} not found")]
    RecordNotFound(String),
}

impl Error {
    /// Upstream response bytes associated with this error, if any.
    pub fn response_body(&self) -> Option<&[u8]> {
        match self {
            Error::Api { response } => Some(&response.body),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
