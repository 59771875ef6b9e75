// src/utils/jwt.rs

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::Config, error::AppError};

pub const ADMIN_ROLE: &str = "admin";

/// Bearer token payload issued at admin login.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Admin id.
    pub sub: String,
    pub role: String,
    /// Unix seconds.
    pub exp: usize,
}

impl Claims {
    pub fn admin_id(&self) -> Option<Uuid> {
        self.sub.parse().ok()
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE && self.admin_id().is_some()
    }
}

pub fn sign_jwt(
    admin_id: Uuid,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let lifetime = i64::try_from(expiration_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| AppError::InternalServerError("JWT lifetime out of range".to_string()))?;
    let expires_at = (Utc::now() + lifetime).timestamp();

    let claims = Claims {
        sub: admin_id.to_string(),
        role: role.to_string(),
        exp: expires_at as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to sign token: {e}")))
}

/// Checks signature and expiry.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::AuthError("Invalid token".to_string())
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum middleware: requires a valid bearer token and stores its `Claims`
/// in the request extensions. Anything else is 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = verify_jwt(token, &config.jwt_secret).map_err(|_| StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Axum middleware: admin role check. Layer it inside `auth_middleware`.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    match req.extensions().get::<Claims>() {
        None => Err(StatusCode::UNAUTHORIZED),
        Some(claims) if !claims.is_admin() => Err(StatusCode::FORBIDDEN),
        Some(_) => Ok(next.run(req).await),
    }
}
