//! services/api/src/web/middleware.rs
//!
//! Session middleware for routes that act on a conversation session.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::web::state::AppState;

/// Name of the cookie carrying the conversation session id.
pub const SESSION_COOKIE: &str = "session";

/// Parses the session id out of the `Cookie` header.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// Middleware that resolves the session cookie to a live session.
///
/// If found, inserts the `SessionHandle` and the session id into request extensions.
/// If missing or unknown, returns 401 Unauthorized.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the session id from the cookie
    let session_id = session_id_from_headers(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Look up the live session
    let handle = state.sessions.get(session_id).await.ok_or_else(|| {
        warn!("Request for unknown session {}", session_id);
        StatusCode::UNAUTHORIZED
    })?;

    // 3. Record the activity and insert the handle for the handler
    handle.touch();
    req.extensions_mut().insert(handle);
    req.extensions_mut().insert(session_id);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
