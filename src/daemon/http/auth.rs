//! Static bearer-token authentication for the control API

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use super::types::ErrorResponse;

/// Accepted API keys; an empty list leaves the API open
#[derive(Clone)]
pub struct AuthState {
    pub api_keys: Arc<Vec<String>>,
}

impl AuthState {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
        }
    }

    pub fn auth_required(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn validate_key(&self, key: &str) -> bool {
        if self.api_keys.is_empty() {
            return true;
        }
        self.api_keys.iter().any(|k| k == key)
    }
}

/// Key from `Authorization: Bearer <key>` (a bare `<key>` is accepted too)
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let key = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!key.is_empty()).then_some(key)
}

pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth.auth_required() {
        return next.run(request).await;
    }

    let authorized = presented_key(request.headers()).is_some_and(|key| auth.validate_key(key));
    if !authorized {
        debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        return (StatusCode::UNAUTHORIZED, Json(ErrorResponse::unauthorized())).into_response();
    }

    next.run(request).await
}
