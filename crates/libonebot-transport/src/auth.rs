//! Inbound access-token checks.
//!
//! Every inbound surface (HTTP POST, WebSocket upgrade) runs the same
//! check before touching the dispatcher: no token configured means open
//! access, otherwise the request must present the token as a bearer
//! header or an `access_token` query parameter.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::Deserialize;

/// Query parameters recognized during authorization.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub access_token: Option<String>,
}

/// The authorization rule shared by all inbound transports.
///
/// `authorization` is the raw `Authorization` header value, if any.
pub fn authorize(
    expected: Option<&str>,
    authorization: Option<&str>,
    access_token: Option<&str>,
) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    if authorization.is_some_and(|value| value.strip_prefix("Bearer ") == Some(expected)) {
        return true;
    }
    access_token == Some(expected)
}

/// [`authorize`] applied to an axum request's parts.
pub fn authorize_request(expected: Option<&str>, headers: &HeaderMap, query: &AuthQuery) -> bool {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    authorize(expected, authorization, query.access_token.as_deref())
}
