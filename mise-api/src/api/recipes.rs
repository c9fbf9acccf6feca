//! Recipe catalogue and generated recipes

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::extract::AuthUser;
use super::pagination::{split_csv, PageQuery};
use crate::db::{recipes, static_recipes};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Difficulty, GeneratedRecipeDocument, RecipeHistory, RecipeRequest, StaticRecipe,
    StaticRecipeFilter,
};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Query for GET /recipes/static
#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    /// Comma-separated
    pub tags: Option<String>,
    pub difficulty: Option<String>,
}

/// Query for GET /recipes/static/search
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    /// Comma-separated
    pub tags: Option<String>,
    /// Comma-separated
    pub ingredients: Option<String>,
    pub difficulty: Option<String>,
    pub max_prep_time: Option<u32>,
    pub max_cook_time: Option<u32>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub message: String,
    pub is_favorite: bool,
}

fn parse_difficulty(value: Option<&str>) -> ApiResult<Option<Difficulty>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<Difficulty>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid difficulty: {}", v)))
        })
        .transpose()
}

fn parse_recipe_id(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest("Invalid recipe ID".to_string()))
}

/// GET /recipes/static
pub async fn browse_static(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<Vec<StaticRecipe>>> {
    let page = PageQuery {
        limit: query.limit,
        skip: query.skip,
    }
    .resolve(DEFAULT_LIMIT, MAX_LIMIT)?;

    let filter = StaticRecipeFilter {
        tags: split_csv(query.tags.as_deref()),
        difficulty: parse_difficulty(query.difficulty.as_deref())?,
        limit: page.limit,
        skip: page.skip,
        ..Default::default()
    };
    Ok(Json(static_recipes::search_static(&state.db, &filter).await?))
}

/// GET /recipes/static/search
pub async fn search_static(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<StaticRecipe>>> {
    let page = PageQuery {
        limit: query.limit,
        skip: query.skip,
    }
    .resolve(DEFAULT_LIMIT, MAX_LIMIT)?;

    let filter = StaticRecipeFilter {
        query: query.query.filter(|q| !q.trim().is_empty()),
        tags: split_csv(query.tags.as_deref()),
        ingredients: split_csv(query.ingredients.as_deref()),
        difficulty: parse_difficulty(query.difficulty.as_deref())?,
        max_prep_time: query.max_prep_time,
        max_cook_time: query.max_cook_time,
        limit: page.limit,
        skip: page.skip,
    };
    Ok(Json(static_recipes::search_static(&state.db, &filter).await?))
}

/// GET /recipes/static/:id
pub async fn get_static(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StaticRecipe>> {
    static_recipes::get_static(&state.db, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Recipe not found".to_string()))
}

/// POST /recipes/generate
///
/// Always produces a recipe: when the generative service is missing or
/// misbehaves the rule-based templates stand in.
pub async fn generate_recipe(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(mut request): Json<RecipeRequest>,
) -> ApiResult<Json<GeneratedRecipeDocument>> {
    request.ingredients = request
        .ingredients
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .map(str::to_string)
        .collect();
    if request.ingredients.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one ingredient is required".to_string(),
        ));
    }

    let (recipe, origin) = state
        .synthesizer
        .synthesize_with_origin(&request, Some(&user.preferences))
        .await;

    let document = GeneratedRecipeDocument {
        id: Uuid::new_v4(),
        user_id: user.id,
        ingredients: request.ingredients,
        generated_recipe: recipe,
        source: origin.source_label().to_string(),
        confidence_score: origin.confidence_score(),
        is_favorite: false,
        timestamp: Utc::now(),
    };
    recipes::insert_generated(&state.db, &document).await?;

    info!(
        user_id = %user.id,
        recipe_id = %document.id,
        source = %document.source,
        "Recipe saved"
    );
    Ok(Json(document))
}

/// GET /recipes/history
pub async fn recipe_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<RecipeHistory>> {
    let page = query.resolve(DEFAULT_LIMIT, MAX_LIMIT)?;
    let history = recipes::history_page(&state.db, user.id, page.limit, page.skip).await?;
    Ok(Json(history))
}

/// GET /recipes/generated/:id
pub async fn get_generated(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<GeneratedRecipeDocument>> {
    let id = parse_recipe_id(&id)?;
    recipes::get_generated(&state.db, user.id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Recipe not found".to_string()))
}

/// PUT /recipes/generated/:id/favorite
pub async fn toggle_favorite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<FavoriteResponse>> {
    let id = parse_recipe_id(&id)?;
    let is_favorite = recipes::toggle_favorite(&state.db, user.id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Recipe not found".to_string()))?;

    let message = if is_favorite {
        "Recipe added to favorites"
    } else {
        "Recipe removed from favorites"
    };
    Ok(Json(FavoriteResponse {
        message: message.to_string(),
        is_favorite,
    }))
}

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/static", get(browse_static))
        .route("/recipes/static/search", get(search_static))
        .route("/recipes/static/:id", get(get_static))
        .route("/recipes/generate", post(generate_recipe))
        .route("/recipes/history", get(recipe_history))
        .route("/recipes/generated/:id", get(get_generated))
        .route("/recipes/generated/:id/favorite", put(toggle_favorite))
}
