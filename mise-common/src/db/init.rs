//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates every table the service
//! needs. All statements are idempotent so startup can run them every time.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open or create the database file and make sure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets history reads proceed while a recipe is being saved
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// A pool over `sqlite::memory:` must stay at one connection, otherwise every
/// connection sees its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes if they don't exist
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_generated_recipes_table(pool).await?;
    create_static_recipes_table(pool).await?;

    info!("Database schema ready (settings, users, generated_recipes, static_recipes)");
    Ok(())
}

/// Create the settings table
///
/// Stores service key-value pairs such as the generated token secret.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            preferences TEXT,
            created_at TEXT NOT NULL,
            last_login TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Generated recipes keep the request ingredients and the recipe document as JSON text
async fn create_generated_recipes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generated_recipes (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            ingredients TEXT NOT NULL,
            recipe TEXT NOT NULL,
            source TEXT NOT NULL,
            confidence_score REAL NOT NULL DEFAULT 0.0
                CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
            is_favorite INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_generated_user_time \
         ON generated_recipes(user_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_generated_user_favorite \
         ON generated_recipes(user_id, is_favorite)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_static_recipes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS static_recipes (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            ingredients TEXT NOT NULL DEFAULT '[]',
            instructions TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            difficulty TEXT NOT NULL CHECK (difficulty IN ('easy', 'medium', 'hard')),
            prep_time INTEGER NOT NULL CHECK (prep_time > 0),
            cook_time INTEGER NOT NULL CHECK (cook_time > 0),
            servings INTEGER NOT NULL DEFAULT 4 CHECK (servings > 0),
            nutrition TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_static_difficulty ON static_recipes(difficulty)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_static_times ON static_recipes(prep_time, cook_time)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        init_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in ["generated_recipes", "settings", "static_recipes", "users"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_difficulty_constraint() {
        let pool = init_memory_database().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO static_recipes
                 (guid, title, instructions, difficulty, prep_time, cook_time)
             VALUES ('r1', 'Soup', 'Boil', 'extreme', 5, 10)",
        )
        .execute(&pool)
        .await;

        assert!(result.is_err(), "difficulty outside easy/medium/hard must be rejected");
    }
}
