//! User account queries

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_json, decode_time, decode_uuid, encode_json, encode_time};
use crate::models::{User, UserPreferences};
use mise_common::{Error, Result};

#[derive(sqlx::FromRow)]
struct UserRow {
    guid: String,
    username: String,
    email: String,
    password_hash: String,
    preferences: Option<String>,
    created_at: String,
    last_login: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let preferences = match row.preferences.as_deref() {
            Some(text) => decode_json("preferences", text)?,
            None => UserPreferences::default(),
        };
        Ok(User {
            id: decode_uuid(&row.guid)?,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            preferences,
            created_at: decode_time(&row.created_at)?,
            last_login: row.last_login.as_deref().map(decode_time).transpose()?,
        })
    }
}

const SELECT_USER: &str = "SELECT guid, username, email, password_hash, preferences, \
     created_at, last_login FROM users";

fn unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Insert a new account
///
/// Returns `Error::InvalidInput` when the username or email is taken.
pub async fn insert_user(pool: &SqlitePool, user: &User) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO users
            (guid, username, email, password_hash, preferences, created_at, last_login)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(encode_json(&user.preferences)?)
    .bind(encode_time(&user.created_at))
    .bind(user.last_login.as_ref().map(encode_time))
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if unique_violation(&e) => Err(Error::InvalidInput(
            "Username or email already exists".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!("{} WHERE guid = ?", SELECT_USER))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(User::try_from).transpose()
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!("{} WHERE email = ?", SELECT_USER))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    row.map(User::try_from).transpose()
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!("{} WHERE username = ?", SELECT_USER))
        .bind(username)
        .fetch_optional(pool)
        .await?;
    row.map(User::try_from).transpose()
}

/// Whether either identifier is already registered
pub async fn exists_with_email_or_username(
    pool: &SqlitePool,
    email: &str,
    username: &str,
) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ? OR username = ?")
            .bind(email)
            .bind(username)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

pub async fn record_login(pool: &SqlitePool, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET last_login = ? WHERE guid = ?")
        .bind(encode_time(&at))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Apply a partial profile update and return the updated account
///
/// `None` when the account doesn't exist. A taken username yields
/// `Error::InvalidInput`.
pub async fn update_profile(
    pool: &SqlitePool,
    id: Uuid,
    username: Option<&str>,
    preferences: Option<&UserPreferences>,
) -> Result<Option<User>> {
    if let Some(username) = username {
        let result = sqlx::query("UPDATE users SET username = ? WHERE guid = ?")
            .bind(username)
            .bind(id.to_string())
            .execute(pool)
            .await;
        match result {
            Ok(_) => {}
            Err(e) if unique_violation(&e) => {
                return Err(Error::InvalidInput("Username already taken".to_string()))
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(preferences) = preferences {
        sqlx::query("UPDATE users SET preferences = ? WHERE guid = ?")
            .bind(encode_json(preferences)?)
            .bind(id.to_string())
            .execute(pool)
            .await?;
    }

    find_by_id(pool, id).await
}

/// Delete an account; its generated recipes go with it
pub async fn delete_user(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE guid = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mise_common::db::init_memory_database;

    fn sample_user(username: &str, email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "pbkdf2-sha256$1$c2FsdA$aGFzaA".to_string(),
            preferences: UserPreferences::default(),
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let pool = init_memory_database().await.unwrap();
        let user = sample_user("cook", "cook@example.com");
        insert_user(&pool, &user).await.unwrap();

        let by_email = find_by_email(&pool, "cook@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.preferences.cooking_skill, "beginner");

        let by_id = find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "cook");
        assert!(find_by_username(&pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        let pool = init_memory_database().await.unwrap();
        insert_user(&pool, &sample_user("cook", "cook@example.com")).await.unwrap();

        let same_email = insert_user(&pool, &sample_user("other", "cook@example.com")).await;
        assert!(matches!(same_email, Err(Error::InvalidInput(_))));

        let same_name = insert_user(&pool, &sample_user("cook", "other@example.com")).await;
        assert!(matches!(same_name, Err(Error::InvalidInput(_))));

        assert!(exists_with_email_or_username(&pool, "x@example.com", "cook").await.unwrap());
        assert!(!exists_with_email_or_username(&pool, "x@example.com", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let pool = init_memory_database().await.unwrap();
        let user = sample_user("cook", "cook@example.com");
        insert_user(&pool, &user).await.unwrap();
        insert_user(&pool, &sample_user("taken", "taken@example.com")).await.unwrap();

        let prefs = UserPreferences {
            dietary_restrictions: vec!["vegetarian".to_string()],
            cuisine_preferences: vec![],
            cooking_skill: "advanced".to_string(),
        };
        let updated = update_profile(&pool, user.id, Some("chef"), Some(&prefs))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.username, "chef");
        assert_eq!(updated.preferences, prefs);

        let clash = update_profile(&pool, user.id, Some("taken"), None).await;
        assert!(matches!(clash, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_record_login_and_delete() {
        let pool = init_memory_database().await.unwrap();
        let user = sample_user("cook", "cook@example.com");
        insert_user(&pool, &user).await.unwrap();

        record_login(&pool, user.id, Utc::now()).await.unwrap();
        assert!(find_by_id(&pool, user.id).await.unwrap().unwrap().last_login.is_some());

        assert!(delete_user(&pool, user.id).await.unwrap());
        assert!(!delete_user(&pool, user.id).await.unwrap());
    }
}
