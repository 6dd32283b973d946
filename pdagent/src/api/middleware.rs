use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::errors::{Error, Result};

/// Require `Authorization: token <secret>` on every request.
///
/// An empty configured secret disables authentication entirely
/// (development mode).
pub async fn require_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if state.config.secret.is_empty() {
        return Ok(next.run(request).await);
    }

    let expected = format!("token {}", state.config.secret);
    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if provided != Some(expected.as_str()) {
        tracing::info!(path = %request.uri().path(), "authorization failure");
        return Err(Error::Unauthorized);
    }

    Ok(next.run(request).await)
}
