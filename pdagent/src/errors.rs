//! Error types and HTTP response conversion.
//!
//! The control server's handlers return `Result<T, Error>`; every error
//! converts to the wire shape `{"errors": ["..."]}` with a status code
//! chosen per variant. Producers only ever see synchronous input errors
//! (400) and authorization failures (401); delivery outcomes never surface
//! here.

use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request lacked the matching shared secret.
    #[error("Unauthorized, expected matching secret token in Authorization header.")]
    Unauthorized,

    /// `Pd-Event-Version` header missing or not a known version.
    #[error("missing or unrecognized Pd-Event-Version header")]
    UnknownEventVersion,

    /// Single-instance guard tripped at startup.
    #[error("pidfile already exists, suggesting an agent is already running: {}", .0.display())]
    PidfileExists(PathBuf),

    #[error("pidfile doesn't exist: {}", .0.display())]
    PidfileMissing(PathBuf),

    /// Queue-level failures; input errors map to 400, the rest to 500.
    #[error(transparent)]
    Queue(#[from] fanout::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Internal { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::UnknownEventVersion => StatusCode::BAD_REQUEST,
            Error::Queue(err) => match err {
                fanout::Error::InvalidRoutingKey
                | fanout::Error::MalformedPayload(_)
                | fanout::Error::UnrecognizedVersion(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Unauthorized => tracing::info!("authorization failure: {}", self),
            Error::UnknownEventVersion => tracing::debug!("client error: {}", self),
            Error::Queue(err) if self.status_code() == StatusCode::BAD_REQUEST => {
                tracing::debug!("client error: {}", err)
            }
            _ => tracing::error!("internal error: {:#}", self),
        }

        let status = self.status_code();
        (status, Json(json!({ "errors": [self.to_string()] }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
