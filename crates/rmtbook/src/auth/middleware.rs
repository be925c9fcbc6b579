//! Session cookie middleware and extractor.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{FromRequestParts, OptionalFromRequestParts, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::debug;

use super::session::{cookie_value, SessionKeys};
use crate::error::Error;
use crate::model::Role;

/// The signed-in account of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Account ID.
    pub user_id: String,
    /// Account role.
    pub role: Role,
}

/// Role a path requires, or `None` for public paths.
#[must_use]
pub fn required_role(path: &str) -> Option<Role> {
    let under = |prefix: &str| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    };
    if under("/api/patient") {
        Some(Role::Patient)
    } else if under("/api/rmt") {
        Some(Role::Rmt)
    } else {
        None
    }
}

/// Authenticate requests from the session cookie.
///
/// Protected paths answer 401 without a valid session and 403 for the
/// wrong role. Authenticated responses carry a refreshed cookie so the
/// session slides forward with activity.
pub async fn session_middleware(
    State(keys): State<SessionKeys>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let now = Utc::now();
    let required = required_role(request.uri().path());
    let token = request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| cookie_value(header, keys.cookie_name()))
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    let verified = token.map(|token| keys.verify(&token, now));
    let claims = match verified {
        Some(Ok(claims)) => Some(claims),
        Some(Err(err)) => {
            debug!(error = %err, path = %request.uri().path(), "Rejected session cookie");
            if required.is_some() {
                return with_cookie(Error::Unauthenticated.into_response(), &keys.clear_cookie());
            }
            let response = next.run(request).await;
            return with_cookie_unless_set(response, &keys, &keys.clear_cookie());
        }
        None => None,
    };

    let Some(claims) = claims else {
        if required.is_some() {
            return Error::Unauthenticated.into_response();
        }
        return next.run(request).await;
    };

    if let Some(role) = required {
        if claims.role != role {
            return Error::forbidden(format!("this area requires the {role} role"))
                .into_response();
        }
    }

    request.extensions_mut().insert(Session {
        user_id: claims.user_id.clone(),
        role: claims.role,
    });
    let response = next.run(request).await;

    let refreshed = keys.claims_for(&claims.user_id, claims.role, now);
    match keys.issue(&refreshed) {
        Ok(token) => with_cookie_unless_set(response, &keys, &keys.set_cookie(&token)),
        Err(_) => response,
    }
}

/// Append a cookie unless the handler already set the session cookie
/// (sign-in and sign-out do).
fn with_cookie_unless_set(response: Response, keys: &SessionKeys, cookie: &str) -> Response {
    let prefix = format!("{}=", keys.cookie_name());
    let already_set = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&prefix));
    if already_set {
        response
    } else {
        with_cookie(response, cookie)
    }
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(Error::Unauthenticated)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}
