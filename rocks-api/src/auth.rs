use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::{AdminClaims, ADMIN_ROLE},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub expires_in: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/admin/login", post(login_admin))
}

fn credentials_match(expected: &str, given: &str) -> bool {
    constant_time_eq::constant_time_eq(expected.as_bytes(), given.as_bytes())
}

async fn login_admin(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let valid = credentials_match(&state.auth.admin_username, &req.username)
        & credentials_match(&state.auth.admin_password, &req.password);
    if !valid {
        tracing::warn!(target: "security", "Failed admin login attempt");
        return Err(AppError::AuthenticationError("Invalid credentials".to_string()));
    }

    let claims = AdminClaims {
        sub: req.username,
        role: ADMIN_ROLE.to_owned(),
        jti: Uuid::new_v4().to_string(),
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(state.auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    tracing::info!(target: "security", admin = %claims.sub, "Admin logged in");
    Ok(Json(AuthResponse {
        token,
        expires_in: state.auth.expiration,
    }))
}
