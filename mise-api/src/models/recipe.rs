//! Recipe types
//!
//! [`Recipe`] is both the wire shape returned to clients and the JSON shape the
//! generative service is asked to produce, so its serde attributes define the
//! contract with that service.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Default serving count when the source doesn't say
pub const DEFAULT_SERVINGS: u32 = 4;

/// Recipe parsing or validation failure
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Malformed recipe JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid recipe: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(RecipeError::Invalid(format!("unknown difficulty '{}'", other))),
        }
    }
}

// Case-insensitive so "Easy" from a model reply is still accepted
impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A complete cooking recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    pub steps: Vec<String>,
    #[serde(rename = "estimated_time", deserialize_with = "positive_int")]
    pub estimated_time_minutes: u32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tips: Option<String>,
    #[serde(default = "default_servings", deserialize_with = "positive_int")]
    pub servings: u32,
}

fn default_servings() -> u32 {
    DEFAULT_SERVINGS
}

/// Accepts `30`, `30.0` or `"30"`
fn positive_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Float(f) if f.fract() == 0.0 && f >= 0.0 => f as u64,
        Raw::Float(f) => return Err(de::Error::custom(format!("expected whole number, got {}", f))),
        Raw::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| de::Error::custom(format!("expected number, got '{}'", s)))?,
    };

    u32::try_from(value).map_err(|_| de::Error::custom("number out of range"))
}

impl Recipe {
    /// Parse a recipe from JSON text and check its invariants
    pub fn from_json(text: &str) -> Result<Self, RecipeError> {
        let recipe: Recipe = serde_json::from_str(text)?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Non-empty title, at least one step, no blank steps, positive time and servings
    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.title.trim().is_empty() {
            return Err(RecipeError::Invalid("title is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(RecipeError::Invalid("no steps".to_string()));
        }
        if let Some(index) = self.steps.iter().position(|s| s.trim().is_empty()) {
            return Err(RecipeError::Invalid(format!("step {} is empty", index + 1)));
        }
        if self.estimated_time_minutes == 0 {
            return Err(RecipeError::Invalid("estimated_time must be positive".to_string()));
        }
        if self.servings == 0 {
            return Err(RecipeError::Invalid("servings must be positive".to_string()));
        }
        Ok(())
    }
}

/// Input to recipe synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRequest {
    pub ingredients: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dietary_preferences: Vec<String>,
    #[serde(default)]
    pub cuisine_type: Option<String>,
    #[serde(default)]
    pub difficulty_preference: Option<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl RecipeRequest {
    pub fn new<I, S>(ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ingredients: ingredients.into_iter().map(Into::into).collect(),
            dietary_preferences: Vec::new(),
            cuisine_type: None,
            difficulty_preference: None,
        }
    }
}

/// How a recipe was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeOrigin {
    /// Parsed from the generative service reply
    Generated,
    /// One of the rule-based templates
    Template,
    /// The fixed recipe used when templating fails
    LastResort,
}

impl RecipeOrigin {
    /// Value stored in the `source` column
    pub fn source_label(&self) -> &'static str {
        match self {
            RecipeOrigin::Generated => "openai",
            RecipeOrigin::Template => "rule_based",
            RecipeOrigin::LastResort => "rule_based_default",
        }
    }

    /// Confidence recorded with the saved recipe
    pub fn confidence_score(&self) -> f64 {
        match self {
            RecipeOrigin::Generated => 0.85,
            RecipeOrigin::Template => 0.5,
            RecipeOrigin::LastResort => 0.2,
        }
    }
}

/// A generated recipe as saved for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRecipeDocument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ingredients: Vec<String>,
    pub generated_recipe: Recipe,
    pub source: String,
    pub confidence_score: f64,
    pub is_favorite: bool,
    pub timestamp: DateTime<Utc>,
}

/// One page of a user's generated recipes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeHistory {
    pub recipes: Vec<GeneratedRecipeDocument>,
    pub total_count: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub calories: Option<i64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
}

/// Curated recipe from the browseable catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRecipe {
    pub id: String,
    pub title: String,
    pub ingredients: Vec<String>,
    pub instructions: String,
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
    pub prep_time: u32,
    pub cook_time: u32,
    pub servings: u32,
    pub nutrition: Option<NutritionInfo>,
}

/// Catalogue browse/search parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticRecipeFilter {
    /// Free text matched against title and instructions
    pub query: Option<String>,
    /// Match any of these tags
    pub tags: Vec<String>,
    /// Match any of these ingredients
    pub ingredients: Vec<String>,
    pub difficulty: Option<Difficulty>,
    pub max_prep_time: Option<u32>,
    pub max_cook_time: Option<u32>,
    pub limit: i64,
    pub skip: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_documented_shape_verbatim() {
        let text = r#"{
            "title": "Tomato Basil Pasta",
            "steps": ["Boil pasta", "Make sauce", "Combine"],
            "estimated_time": 30,
            "difficulty": "medium",
            "tips": "Use fresh basil",
            "servings": 2
        }"#;

        let recipe = Recipe::from_json(text).unwrap();
        assert_eq!(recipe.title, "Tomato Basil Pasta");
        assert_eq!(recipe.steps, vec!["Boil pasta", "Make sauce", "Combine"]);
        assert_eq!(recipe.estimated_time_minutes, 30);
        assert_eq!(recipe.difficulty, Difficulty::Medium);
        assert_eq!(recipe.tips.as_deref(), Some("Use fresh basil"));
        assert_eq!(recipe.servings, 2);
    }

    #[test]
    fn test_type_coercion() {
        let text = r#"{
            "title": "Soup",
            "steps": ["Simmer"],
            "estimated_time": "45",
            "difficulty": "Easy"
        }"#;

        let recipe = Recipe::from_json(text).unwrap();
        assert_eq!(recipe.estimated_time_minutes, 45);
        assert_eq!(recipe.difficulty, Difficulty::Easy);
        assert_eq!(recipe.servings, DEFAULT_SERVINGS);
        assert_eq!(recipe.tips, None);
    }

    #[test]
    fn test_missing_field_rejected() {
        let text = r#"{"title": "Soup", "steps": ["Simmer"], "difficulty": "easy"}"#;
        assert!(matches!(Recipe::from_json(text), Err(RecipeError::Json(_))));
    }

    #[test]
    fn test_invariants_enforced() {
        let no_steps =
            r#"{"title": "Soup", "steps": [], "estimated_time": 10, "difficulty": "easy"}"#;
        assert!(matches!(Recipe::from_json(no_steps), Err(RecipeError::Invalid(_))));

        let blank_title =
            r#"{"title": "  ", "steps": ["a"], "estimated_time": 10, "difficulty": "easy"}"#;
        assert!(Recipe::from_json(blank_title).is_err());

        let zero_time =
            r#"{"title": "Soup", "steps": ["a"], "estimated_time": 0, "difficulty": "easy"}"#;
        assert!(Recipe::from_json(zero_time).is_err());

        let bad_difficulty =
            r#"{"title": "Soup", "steps": ["a"], "estimated_time": 5, "difficulty": "expert"}"#;
        assert!(Recipe::from_json(bad_difficulty).is_err());

        let fractional =
            r#"{"title": "Soup", "steps": ["a"], "estimated_time": 2.5, "difficulty": "easy"}"#;
        assert!(Recipe::from_json(fractional).is_err());
    }

    #[test]
    fn test_serializes_wire_names() {
        let recipe = Recipe {
            title: "Soup".to_string(),
            steps: vec!["Simmer".to_string()],
            estimated_time_minutes: 20,
            difficulty: Difficulty::Hard,
            tips: None,
            servings: 4,
        };

        let value = serde_json::to_value(&recipe).unwrap();
        assert_eq!(value["estimated_time"], 20);
        assert_eq!(value["difficulty"], "hard");
        assert!(value.get("estimated_time_minutes").is_none());
    }

    #[test]
    fn test_request_null_preferences() {
        let text = r#"{"ingredients": ["rice"], "dietary_preferences": null}"#;
        let request: RecipeRequest = serde_json::from_str(text).unwrap();
        assert!(request.dietary_preferences.is_empty());
        assert_eq!(request.cuisine_type, None);
    }
}
