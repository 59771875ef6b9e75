// src/handlers/auth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::admin::LoginRequest,
    store::SharedStore,
    utils::{
        jwt::{ADMIN_ROLE, sign_jwt},
        password::verify_password,
    },
};

/// Authenticates an admin and returns a JWT token.
///
/// Unknown usernames and wrong passwords get the same 401.
pub async fn login(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let admin = store
        .find_admin(&payload.username)
        .await?
        .ok_or_else(|| AppError::AuthError("Invalid username or password".to_string()))?;

    if !verify_password(&payload.password, &admin.password)? {
        tracing::warn!("Failed login for admin '{}'", admin.username);
        return Err(AppError::AuthError("Invalid username or password".to_string()));
    }

    let token = sign_jwt(admin.id, ADMIN_ROLE, &config.jwt_secret, config.jwt_expiration)?;
    tracing::info!("Admin '{}' logged in", admin.username);

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "expires_in": config.jwt_expiration
    })))
}
