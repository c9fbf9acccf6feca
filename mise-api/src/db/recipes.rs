//! Generated recipe queries
//!
//! Every query is scoped to the owning user; another user's recipe id
//! behaves exactly like a missing one.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_json, decode_time, decode_uuid, encode_json, encode_time};
use crate::models::{GeneratedRecipeDocument, RecipeHistory};
use mise_common::{Error, Result};

#[derive(sqlx::FromRow)]
struct GeneratedRow {
    guid: String,
    user_id: String,
    ingredients: String,
    recipe: String,
    source: String,
    confidence_score: f64,
    is_favorite: bool,
    created_at: String,
}

impl TryFrom<GeneratedRow> for GeneratedRecipeDocument {
    type Error = Error;

    fn try_from(row: GeneratedRow) -> Result<Self> {
        Ok(GeneratedRecipeDocument {
            id: decode_uuid(&row.guid)?,
            user_id: decode_uuid(&row.user_id)?,
            ingredients: decode_json("ingredients", &row.ingredients)?,
            generated_recipe: decode_json("recipe", &row.recipe)?,
            source: row.source,
            confidence_score: row.confidence_score,
            is_favorite: row.is_favorite,
            timestamp: decode_time(&row.created_at)?,
        })
    }
}

const SELECT_GENERATED: &str = "SELECT guid, user_id, ingredients, recipe, source, \
     confidence_score, is_favorite, created_at FROM generated_recipes";

/// Aggregates over one user's generated recipes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStats {
    pub total_recipes: i64,
    pub favorite_count: i64,
    /// 0.0 when the user has no recipes
    pub avg_confidence: f64,
}

fn collect(rows: Vec<GeneratedRow>) -> Result<Vec<GeneratedRecipeDocument>> {
    rows.into_iter().map(GeneratedRecipeDocument::try_from).collect()
}

pub async fn insert_generated(pool: &SqlitePool, doc: &GeneratedRecipeDocument) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO generated_recipes
            (guid, user_id, ingredients, recipe, source, confidence_score, is_favorite, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(doc.id.to_string())
    .bind(doc.user_id.to_string())
    .bind(encode_json(&doc.ingredients)?)
    .bind(encode_json(&doc.generated_recipe)?)
    .bind(&doc.source)
    .bind(doc.confidence_score)
    .bind(doc.is_favorite)
    .bind(encode_time(&doc.timestamp))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_generated(
    pool: &SqlitePool,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<GeneratedRecipeDocument>> {
    let row: Option<GeneratedRow> =
        sqlx::query_as(&format!("{} WHERE guid = ? AND user_id = ?", SELECT_GENERATED))
            .bind(id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?;
    row.map(GeneratedRecipeDocument::try_from).transpose()
}

/// Newest first
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: Uuid,
    limit: i64,
    skip: i64,
) -> Result<Vec<GeneratedRecipeDocument>> {
    let rows: Vec<GeneratedRow> = sqlx::query_as(&format!(
        "{} WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        SELECT_GENERATED
    ))
    .bind(user_id.to_string())
    .bind(limit)
    .bind(skip)
    .fetch_all(pool)
    .await?;
    collect(rows)
}

pub async fn count_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generated_recipes WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// One page of history; `page` is `skip / limit + 1`
pub async fn history_page(
    pool: &SqlitePool,
    user_id: Uuid,
    limit: i64,
    skip: i64,
) -> Result<RecipeHistory> {
    let limit = limit.max(1);
    let skip = skip.max(0);
    let recipes = list_for_user(pool, user_id, limit, skip).await?;
    let total_count = count_for_user(pool, user_id).await?;

    Ok(RecipeHistory {
        recipes,
        total_count,
        page: skip / limit + 1,
        per_page: limit,
    })
}

/// Flip the favorite flag, returning the new value (`None` if not found)
pub async fn toggle_favorite(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<Option<bool>> {
    let value: Option<bool> = sqlx::query_scalar(
        r#"
        UPDATE generated_recipes
        SET is_favorite = NOT is_favorite
        WHERE guid = ? AND user_id = ?
        RETURNING is_favorite
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;
    Ok(value)
}

/// Favorites, newest first
pub async fn list_favorites(
    pool: &SqlitePool,
    user_id: Uuid,
) -> Result<Vec<GeneratedRecipeDocument>> {
    let rows: Vec<GeneratedRow> = sqlx::query_as(&format!(
        "{} WHERE user_id = ? AND is_favorite = 1 ORDER BY created_at DESC, rowid DESC",
        SELECT_GENERATED
    ))
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;
    collect(rows)
}

pub async fn delete_all_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM generated_recipes WHERE user_id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn stats_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<RecipeStats> {
    let (total_recipes, favorite_count, avg_confidence): (i64, i64, Option<f64>) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(CASE WHEN is_favorite THEN 1 ELSE 0 END), 0),
               AVG(confidence_score)
        FROM generated_recipes
        WHERE user_id = ?
        "#,
    )
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(RecipeStats {
        total_recipes,
        favorite_count,
        avg_confidence: avg_confidence.unwrap_or(0.0),
    })
}

/// Every generated recipe of a user, oldest first
pub async fn export_for_user(
    pool: &SqlitePool,
    user_id: Uuid,
) -> Result<Vec<GeneratedRecipeDocument>> {
    let rows: Vec<GeneratedRow> = sqlx::query_as(&format!(
        "{} WHERE user_id = ? ORDER BY created_at ASC, rowid ASC",
        SELECT_GENERATED
    ))
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;
    collect(rows)
}
