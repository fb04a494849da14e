//! Authentication endpoints

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::{CurrentUser, Session, create_session_token, hash_password, verify_password};
use crate::data::{EntityId, User};
use crate::error::AppError;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};

/// Registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Usernames are stored lowercase and must be at least 3 characters.
fn normalize_username(raw: &str) -> Result<String, AppError> {
    let username = raw.trim().to_lowercase();
    if username.chars().count() < 3 {
        return Err(AppError::Validation(
            "Username must be at least 3 characters".to_string(),
        ));
    }
    Ok(username)
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/api/auth/register"])
        .start_timer();

    let username = normalize_username(&req.username)?;
    if req.password.is_empty() {
        return Err(AppError::Validation(
            "Password must not be empty".to_string(),
        ));
    }

    let user = User {
        id: EntityId::new().0,
        username,
        password_hash: hash_password(&req.password)?,
        created_at: Utc::now(),
    };
    state.db.create_user(&user).await?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/auth/register", "201"])
        .inc();

    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/api/auth/login"])
        .start_timer();

    // Same error for unknown user and wrong password
    let user = state
        .db
        .get_user_by_username(&req.username)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let session = Session::new(&user.id, &user.username, state.config.auth.session_max_age);
    let access_token = create_session_token(&session, &state.config.auth.session_secret)?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/api/auth/login", "200"])
        .inc();

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
    }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<User>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/api/auth/me"])
        .start_timer();

    let user = state
        .db
        .get_user(&session.user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/api/auth/me", "200"])
        .inc();

    Ok(Json(user))
}
