//! Request identity extraction and admin-token middleware.
//!
//! Authentication itself is external: a front proxy asserts the user
//! via forwarded headers. Admin endpoints additionally require a shared
//! bearer token; requiring a custom header also defeats cross-site
//! request forgery, since browsers cannot attach it cross-origin.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::access::{Identity, UserInfo};

use super::AppState;

/// Forwarded-identity headers set by the front proxy.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Build an [`Identity`] from forwarded headers. Absent or empty
/// `x-user-id` means anonymous.
pub fn identity_from_headers(headers: &HeaderMap) -> Identity {
    let id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let Some(id) = id else {
        return Identity::Anonymous;
    };

    let email = headers
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let roles = headers
        .get(USER_ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Identity::User(UserInfo {
        id: id.to_string(),
        email,
        roles,
    })
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(identity_from_headers(&parts.headers))
    }
}

/// Middleware guarding admin routes with a shared bearer token.
/// Fails closed: with no token configured, admin endpoints are off.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Admin endpoints are disabled: no admin token configured.",
        )
            .into_response();
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token.as_bytes().ct_eq(expected.as_bytes()).into() => {
            next.run(request).await
        }
        _ => (StatusCode::UNAUTHORIZED, "401 Unauthorized").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_anonymous_without_header() {
        let headers = HeaderMap::new();
        assert_eq!(identity_from_headers(&headers), Identity::Anonymous);

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(identity_from_headers(&headers), Identity::Anonymous);
    }

    #[test]
    fn test_user_with_roles() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));
        headers.insert(
            USER_ROLES_HEADER,
            HeaderValue::from_static("customer, administrator"),
        );

        let identity = identity_from_headers(&headers);
        assert!(identity.is_authenticated());
        assert!(identity.is_admin());
    }

    #[test]
    fn test_user_without_roles() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));

        let identity = identity_from_headers(&headers);
        assert!(identity.is_authenticated());
        assert!(!identity.is_admin());
    }
}
