//! Curated recipe catalogue
//!
//! Tags and ingredients are JSON arrays; filters match through `json_each`.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use super::{decode_json, encode_json};
use crate::models::{Difficulty, NutritionInfo, StaticRecipe, StaticRecipeFilter};
use mise_common::{Error, Result};

#[derive(sqlx::FromRow)]
struct StaticRow {
    guid: String,
    title: String,
    ingredients: String,
    instructions: String,
    tags: String,
    difficulty: String,
    prep_time: i64,
    cook_time: i64,
    servings: i64,
    nutrition: Option<String>,
}

fn positive(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| Error::Internal(format!("Stored {} out of range: {}", column, value)))
}

impl TryFrom<StaticRow> for StaticRecipe {
    type Error = Error;

    fn try_from(row: StaticRow) -> Result<Self> {
        let difficulty: Difficulty = row
            .difficulty
            .parse()
            .map_err(|e| Error::Internal(format!("Stored difficulty invalid: {}", e)))?;
        let nutrition: Option<NutritionInfo> = row
            .nutrition
            .as_deref()
            .map(|text| decode_json("nutrition", text))
            .transpose()?;

        Ok(StaticRecipe {
            id: row.guid,
            title: row.title,
            ingredients: decode_json("ingredients", &row.ingredients)?,
            instructions: row.instructions,
            tags: decode_json("tags", &row.tags)?,
            difficulty,
            prep_time: positive("prep_time", row.prep_time)?,
            cook_time: positive("cook_time", row.cook_time)?,
            servings: positive("servings", row.servings)?,
            nutrition,
        })
    }
}

const SELECT_STATIC: &str = "SELECT guid, title, ingredients, instructions, tags, difficulty, \
     prep_time, cook_time, servings, nutrition FROM static_recipes";

pub async fn insert_static(pool: &SqlitePool, recipe: &StaticRecipe) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO static_recipes
            (guid, title, ingredients, instructions, tags, difficulty,
             prep_time, cook_time, servings, nutrition)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&recipe.id)
    .bind(&recipe.title)
    .bind(encode_json(&recipe.ingredients)?)
    .bind(&recipe.instructions)
    .bind(encode_json(&recipe.tags)?)
    .bind(recipe.difficulty.as_str())
    .bind(recipe.prep_time as i64)
    .bind(recipe.cook_time as i64)
    .bind(recipe.servings as i64)
    .bind(recipe.nutrition.as_ref().map(encode_json).transpose()?)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_static(pool: &SqlitePool, id: &str) -> Result<Option<StaticRecipe>> {
    let row: Option<StaticRow> = sqlx::query_as(&format!("{} WHERE guid = ?", SELECT_STATIC))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(StaticRecipe::try_from).transpose()
}

/// Browse and search share one query
///
/// Free text matches any whitespace-separated term in the title or
/// instructions, case-insensitively. Tag and ingredient lists match when any
/// listed value is present. Results are ordered by title.
pub async fn search_static(
    pool: &SqlitePool,
    filter: &StaticRecipeFilter,
) -> Result<Vec<StaticRecipe>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_STATIC);
    builder.push(" WHERE 1 = 1");

    let terms: Vec<String> = filter
        .query
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    if !terms.is_empty() {
        builder.push(" AND (");
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push("instr(lower(title), ");
            builder.push_bind(term.clone());
            builder.push(") > 0 OR instr(lower(instructions), ");
            builder.push_bind(term.clone());
            builder.push(") > 0");
        }
        builder.push(")");
    }

    push_any_of(&mut builder, "tags", &filter.tags);
    push_any_of(&mut builder, "ingredients", &filter.ingredients);

    if let Some(difficulty) = filter.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty.as_str());
    }
    if let Some(max) = filter.max_prep_time {
        builder.push(" AND prep_time <= ");
        builder.push_bind(max as i64);
    }
    if let Some(max) = filter.max_cook_time {
        builder.push(" AND cook_time <= ");
        builder.push_bind(max as i64);
    }

    builder.push(" ORDER BY title ASC, guid ASC LIMIT ");
    builder.push_bind(filter.limit.max(0));
    builder.push(" OFFSET ");
    builder.push_bind(filter.skip.max(0));

    let rows: Vec<StaticRow> = builder.build_query_as().fetch_all(pool).await?;
    debug!(matches = rows.len(), "Static recipe search");
    rows.into_iter().map(StaticRecipe::try_from).collect()
}

/// `AND EXISTS (... json_each(column) WHERE value IN (...))`, skipped for an empty list
fn push_any_of(builder: &mut QueryBuilder<Sqlite>, column: &'static str, values: &[String]) {
    let values: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return;
    }

    builder.push(" AND EXISTS (SELECT 1 FROM json_each(static_recipes.");
    builder.push(column);
    builder.push(") WHERE json_each.value IN (");
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.to_string());
    }
    separated.push_unseparated("))");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mise_common::db::init_memory_database;

    fn recipe(
        id: &str,
        title: &str,
        tags: &[&str],
        difficulty: Difficulty,
        prep: u32,
    ) -> StaticRecipe {
        StaticRecipe {
            id: id.to_string(),
            title: title.to_string(),
            ingredients: vec!["tomato".to_string(), "basil".to_string()],
            instructions: format!("Make the {} carefully", title.to_lowercase()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            difficulty,
            prep_time: prep,
            cook_time: 20,
            servings: 4,
            nutrition: None,
        }
    }

    async fn seeded() -> SqlitePool {
        let pool = init_memory_database().await.unwrap();
        let soup = recipe("r1", "Tomato Soup", &["soup", "vegetarian"], Difficulty::Easy, 10);
        insert_static(&pool, &soup).await.unwrap();
        insert_static(&pool, &recipe("r2", "Beef Stew", &["stew"], Difficulty::Hard, 30))
            .await
            .unwrap();
        let mut salad =
            recipe("r3", "Caprese Salad", &["salad", "vegetarian"], Difficulty::Easy, 5);
        salad.nutrition = Some(NutritionInfo {
            calories: Some(250),
            ..Default::default()
        });
        insert_static(&pool, &salad).await.unwrap();
        pool
    }

    fn filter() -> StaticRecipeFilter {
        StaticRecipeFilter {
            limit: 20,
            ..Default::default()
        }
    }

    fn titles(recipes: &[StaticRecipe]) -> Vec<&str> {
        recipes.iter().map(|r| r.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_browse_all_ordered() {
        let pool = seeded().await;
        let all = search_static(&pool, &filter()).await.unwrap();
        assert_eq!(titles(&all), vec!["Beef Stew", "Caprese Salad", "Tomato Soup"]);
    }

    #[tokio::test]
    async fn test_tag_and_difficulty_filters() {
        let pool = seeded().await;

        let vegetarian = search_static(
            &pool,
            &StaticRecipeFilter {
                tags: vec!["vegetarian".to_string(), "nonexistent".to_string()],
                ..filter()
            },
        )
        .await
        .unwrap();
        assert_eq!(titles(&vegetarian), vec!["Caprese Salad", "Tomato Soup"]);

        let hard = search_static(
            &pool,
            &StaticRecipeFilter {
                difficulty: Some(Difficulty::Hard),
                ..filter()
            },
        )
        .await
        .unwrap();
        assert_eq!(titles(&hard), vec!["Beef Stew"]);
    }

    #[tokio::test]
    async fn test_text_search_and_times() {
        let pool = seeded().await;

        let soup = search_static(
            &pool,
            &StaticRecipeFilter {
                query: Some("SOUP".to_string()),
                ..filter()
            },
        )
        .await
        .unwrap();
        assert_eq!(titles(&soup), vec!["Tomato Soup"]);

        let quick = search_static(
            &pool,
            &StaticRecipeFilter {
                max_prep_time: Some(10),
                ingredients: vec!["basil".to_string()],
                ..filter()
            },
        )
        .await
        .unwrap();
        assert_eq!(titles(&quick), vec!["Caprese Salad", "Tomato Soup"]);
    }

    #[tokio::test]
    async fn test_skip_limit_and_get() {
        let pool = seeded().await;
        let page = search_static(
            &pool,
            &StaticRecipeFilter {
                limit: 1,
                skip: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(titles(&page), vec!["Caprese Salad"]);

        let salad = get_static(&pool, "r3").await.unwrap().unwrap();
        assert_eq!(salad.nutrition.unwrap().calories, Some(250));
        assert!(get_static(&pool, "missing").await.unwrap().is_none());
    }
}
