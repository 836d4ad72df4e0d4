//! Bearer token authentication middleware
//!
//! Tokens are issued by the hosted identity provider; the relay only maps a
//! presented token to the user id its progress events are addressed to.
//! An empty token table disables the check and every caller is anonymous.

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// User id attached to requests when authentication is disabled
pub const ANONYMOUS_USER: &str = "anonymous";

/// Authenticated caller, inserted into request extensions by `auth_middleware`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            user_id: ANONYMOUS_USER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Token from `Authorization: Bearer <token>`, or the percent-decoded `token`
/// query parameter for clients that cannot set headers (browser EventSource)
fn presented_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(uri)
            .ok()
            .and_then(|Query(query)| query.token)
    })
}

/// Authentication middleware
///
/// Returns 401 Unauthorized for a missing or unknown token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.auth.is_enabled() {
        request.extensions_mut().insert(Caller::anonymous());
        return Ok(next.run(request).await);
    }

    let token = presented_token(request.headers(), request.uri())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let user_id = match state.auth.tokens.get(&token) {
        Some(user_id) => user_id.clone(),
        None => {
            warn!(path = %request.uri().path(), "Rejected unknown bearer token");
            return Err(ApiError::Unauthorized("Unknown bearer token".to_string()));
        }
    };

    request.extensions_mut().insert(Caller { user_id });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        let uri = Uri::from_static("/api/events");
        assert_eq!(presented_token(&headers, &uri), Some("abc123".to_string()));
    }

    #[test]
    fn test_token_from_query() {
        let headers = HeaderMap::new();
        let uri = Uri::from_static("/api/events?x=1&token=abc123");
        assert_eq!(presented_token(&headers, &uri), Some("abc123".to_string()));
    }

    #[test]
    fn test_query_token_is_percent_decoded() {
        let headers = HeaderMap::new();
        let uri = Uri::from_static("/api/events?token=a%2Bb%2F%3D%3D");
        assert_eq!(presented_token(&headers, &uri), Some("a+b/==".to_string()));
    }

    #[test]
    fn test_missing_query_token() {
        let headers = HeaderMap::new();
        assert_eq!(presented_token(&headers, &Uri::from_static("/api/events")), None);
        assert_eq!(
            presented_token(&headers, &Uri::from_static("/api/events?x=1")),
            None
        );
    }

    #[test]
    fn test_non_bearer_scheme_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        let uri = Uri::from_static("/api/events");
        assert_eq!(presented_token(&headers, &uri), None);
    }
}
