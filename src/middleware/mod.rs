use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
}

async fn authenticate(
    parts: &Parts,
    state: &Arc<AppState>,
) -> Result<Option<AuthUser>, StatusCode> {
    let auth_header = match parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) => value,
        None => return Ok(None),
    };

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let mut split = credentials.splitn(2, ':');
    let email = split.next().ok_or(StatusCode::UNAUTHORIZED)?;
    let password = split.next().ok_or(StatusCode::UNAUTHORIZED)?;

    let user = state
        .store
        .find_user_by_email(email)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !user.verify_password(password) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Some(AuthUser {
        user_id: user.id,
        email: user.email,
        full_name: user.full_name,
    }))
}

// Basic auth extractor; rejects requests without valid credentials.
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .await?
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Optional variant for guest-capable endpoints: no Authorization header
/// yields `None`, invalid credentials are still rejected.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(authenticate(parts, state).await?))
    }
}
