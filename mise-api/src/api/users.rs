//! Profile, history and account management for the signed-in user

use axum::{
    extract::{Query, State},
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::extract::AuthUser;
use super::pagination::PageQuery;
use crate::db::recipes::{self, RecipeStats};
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::models::{GeneratedRecipeDocument, RecipeHistory, UpdateProfileRequest, UserResponse};
use crate::AppState;
use mise_common::validation::validate_username;

const HISTORY_DEFAULT_LIMIT: i64 = 50;
const HISTORY_MAX_LIMIT: i64 = 200;

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub user: UserResponse,
    pub exported_at: DateTime<Utc>,
    pub recipe_count: usize,
    pub recipes: Vec<GeneratedRecipeDocument>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /users/profile
pub async fn get_profile(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// PUT /users/profile
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserResponse>> {
    let username = request
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| *name != user.username);

    if let Some(name) = username {
        if !validate_username(name) {
            return Err(ApiError::BadRequest("Invalid username".to_string()));
        }
        if users::find_by_username(&state.db, name).await?.is_some() {
            return Err(ApiError::BadRequest("Username already taken".to_string()));
        }
    }

    let updated = users::update_profile(&state.db, user.id, username, request.preferences.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!(user_id = %updated.id, "Profile updated");
    Ok(Json(UserResponse::from(updated)))
}

/// GET /users/history
pub async fn user_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<RecipeHistory>> {
    let page = query.resolve(HISTORY_DEFAULT_LIMIT, HISTORY_MAX_LIMIT)?;
    let history = recipes::history_page(&state.db, user.id, page.limit, page.skip).await?;
    Ok(Json(history))
}

/// GET /users/favorites
pub async fn user_favorites(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<GeneratedRecipeDocument>>> {
    Ok(Json(recipes::list_favorites(&state.db, user.id).await?))
}

/// GET /users/stats
pub async fn user_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<RecipeStats>> {
    Ok(Json(recipes::stats_for_user(&state.db, user.id).await?))
}

/// GET /users/export
pub async fn export_data(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<ExportResponse>> {
    let recipes = recipes::export_for_user(&state.db, user.id).await?;
    info!(user_id = %user.id, recipes = recipes.len(), "User data exported");

    Ok(Json(ExportResponse {
        user: UserResponse::from(user),
        exported_at: Utc::now(),
        recipe_count: recipes.len(),
        recipes,
    }))
}

/// DELETE /users/account
///
/// Removes the user's recipes first, then the account.
pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = user.id;
    let removed = recipes::delete_all_for_user(&state.db, user_id).await?;
    if !users::delete_user(&state.db, user_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    info!(%user_id, recipes = removed, "Account deleted");
    Ok(Json(MessageResponse {
        message: "Account deleted successfully".to_string(),
    }))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile).put(update_profile))
        .route("/users/history", get(user_history))
        .route("/users/favorites", get(user_favorites))
        .route("/users/stats", get(user_stats))
        .route("/users/export", get(export_data))
        .route("/users/account", delete(delete_account))
}
