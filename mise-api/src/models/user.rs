//! Account types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_skill() -> String {
    "beginner".to_string()
}

/// Cooking preferences fed into recipe generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub cuisine_preferences: Vec<String>,
    #[serde(default = "default_skill")]
    pub cooking_skill: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            dietary_restrictions: Vec::new(),
            cuisine_preferences: Vec::new(),
            cooking_skill: default_skill(),
        }
    }
}

/// Stored account
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Account as shown to its owner; never carries the password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            preferences: user.preferences.clone(),
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            preferences: user.preferences,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Partial profile update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
}

/// Issued access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

impl TokenResponse {
    pub fn bearer(access_token: String, expires_in: i64, user: Option<UserResponse>) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            expires_in,
            user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_defaults_from_partial_json() {
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"dietary_restrictions": ["vegan"]}"#).unwrap();
        assert_eq!(prefs.dietary_restrictions, vec!["vegan"]);
        assert!(prefs.cuisine_preferences.is_empty());
        assert_eq!(prefs.cooking_skill, "beginner");
    }

    #[test]
    fn test_response_hides_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            username: "cook".to_string(),
            email: "cook@example.com".to_string(),
            password_hash: "pbkdf2-sha256$1$abc$def".to_string(),
            preferences: UserPreferences::default(),
            created_at: Utc::now(),
            last_login: None,
        };

        let value = serde_json::to_value(UserResponse::from(&user)).unwrap();
        assert_eq!(value["username"], "cook");
        assert!(value.get("password_hash").is_none());
    }
}
