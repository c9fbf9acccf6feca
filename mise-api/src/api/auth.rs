//! Account registration, login and token refresh

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::extract::AuthUser;
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    LoginRequest, RegisterRequest, TokenResponse, User, UserPreferences, UserResponse,
};
use crate::AppState;
use mise_common::auth::{hash_password_with_rounds, verify_password};
use mise_common::validation::{
    validate_email, validate_password, validate_username, PASSWORD_MIN_LEN, USERNAME_MAX_LEN,
    USERNAME_MIN_LEN,
};

const LOGIN_REJECTED: &str = "Invalid email or password";

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    #[serde(flatten)]
    pub token: TokenResponse,
}

/// Emails compare case-insensitively
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue_token(state: &AppState, user: &User, include_user: bool) -> ApiResult<TokenResponse> {
    let token = state.tokens.issue(&user.id.to_string())?;
    Ok(TokenResponse::bearer(
        token,
        state.tokens.ttl().num_seconds(),
        include_user.then(|| UserResponse::from(user)),
    ))
}

/// PBKDF2 is CPU-bound; keep it off the async workers
async fn hash_off_thread(password: String, rounds: u32) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password_with_rounds(&password, rounds))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {}", e)))
}

async fn verify_off_thread(password: String, stored: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("Password verification task failed: {}", e)))
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let email = normalize_email(&request.email);
    let username = request.username.trim().to_string();

    if !validate_email(&email) {
        return Err(ApiError::BadRequest("Invalid email format".to_string()));
    }
    if !validate_username(&username) {
        return Err(ApiError::BadRequest(format!(
            "Invalid username: {}-{} letters, digits or underscores",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !validate_password(&request.password) {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters long",
            PASSWORD_MIN_LEN
        )));
    }

    if users::exists_with_email_or_username(&state.db, &email, &username).await? {
        return Err(ApiError::BadRequest(
            "User with this email or username already exists".to_string(),
        ));
    }

    let password_hash = hash_off_thread(request.password, state.password_hash_rounds).await?;
    let user = User {
        id: Uuid::new_v4(),
        username,
        email,
        password_hash,
        preferences: UserPreferences::default(),
        created_at: Utc::now(),
        last_login: None,
    };
    // A concurrent registration can still win the race; the unique index reports it
    users::insert_user(&state.db, &user).await?;

    info!(user_id = %user.id, username = %user.username, "User registered");

    let token = issue_token(&state, &user, true)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            token,
        }),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = normalize_email(&request.email);

    let Some(mut user) = users::find_by_email(&state.db, &email).await? else {
        warn!("Login failed for unknown email");
        return Err(ApiError::Unauthorized(LOGIN_REJECTED.to_string()));
    };

    if !verify_off_thread(request.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::Unauthorized(LOGIN_REJECTED.to_string()));
    }

    let now = Utc::now();
    users::record_login(&state.db, user.id, now).await?;
    user.last_login = Some(now);

    info!(user_id = %user.id, "User logged in");
    Ok(Json(issue_token(&state, &user, true)?))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<TokenResponse>> {
    Ok(Json(issue_token(&state, &user, false)?))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Cook@Example.COM "), "cook@example.com");
    }

    #[test]
    fn test_register_response_flattens_token() {
        let body = RegisterResponse {
            message: "ok".to_string(),
            token: TokenResponse::bearer("t".to_string(), 60, None),
        };
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["access_token"], "t");
        assert_eq!(value["token_type"], "bearer");
        assert!(value.get("user").is_none());
    }
}
