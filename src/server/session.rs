//! Session credential extraction
//!
//! The owning session is derived from the caller's credential, never from a
//! request parameter. Browsers send it as a cookie; other clients may use the
//! `X-Session-Token` header.

use crate::error::MetadraftError;
use crate::server::{ApiError, AppState};
use crate::store::OwnerKey;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;

/// Header accepted when no session cookie is present.
pub const SESSION_HEADER: &str = "x-session-token";

/// Owner key of the calling session.
#[derive(Debug, Clone)]
pub struct SessionOwner(pub OwnerKey);

/// Find the session credential in request headers.
///
/// # Examples
///
/// ```
/// use axum::http::{HeaderMap, HeaderValue};
/// use metadraft::server::session::credential_from_headers;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("cookie", HeaderValue::from_static("theme=dark; metadraft_session=abc123"));
/// assert_eq!(credential_from_headers(&headers, "metadraft_session").as_deref(), Some("abc123"));
/// ```
pub fn credential_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .find(|value| !value.is_empty())
        .map(str::to_string);

    from_cookie.or_else(|| {
        headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

#[async_trait]
impl FromRequestParts<AppState> for SessionOwner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        credential_from_headers(&parts.headers, &state.session_cookie)
            .map(|credential| SessionOwner(OwnerKey::from_credential(&credential)))
            .ok_or_else(|| ApiError::from(anyhow::Error::from(MetadraftError::Unauthenticated)))
    }
}
