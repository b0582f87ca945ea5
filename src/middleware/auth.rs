use axum::extract::State;
use axum::{http::StatusCode, middleware::Next};

use crate::state::AppState;

/// Rejects requests whose `Authorization` header does not carry the configured password.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if let Some(pw) = &state.cfg.password {
        if !authorized(req.headers(), pw) {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    Ok(next.run(req).await)
}

fn authorized(headers: &axum::http::HeaderMap, password: &str) -> bool {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|val| val == password || val.strip_prefix("Bearer ") == Some(password))
}
