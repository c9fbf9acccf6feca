//! Recipe synthesizer
//!
//! Tries the generative service first and downgrades to the rule-based
//! templates on any failure: no service configured, transport error, timeout,
//! or a reply that isn't a valid recipe. [`RecipeSynthesizer::synthesize`]
//! therefore always returns a usable [`Recipe`].

use std::sync::Arc;
use tracing::{info, warn};

use super::generator::TextGenerator;
use super::templates::fallback_recipe;
use crate::models::{Recipe, RecipeOrigin, RecipeRequest, UserPreferences};

const SYSTEM_PROMPT: &str =
    "You are an expert chef and recipe creator. Always respond with valid JSON.";

#[derive(Clone, Default)]
pub struct RecipeSynthesizer {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl RecipeSynthesizer {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    /// Rule-based only
    pub fn offline() -> Self {
        Self { generator: None }
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn synthesize(
        &self,
        request: &RecipeRequest,
        preferences: Option<&UserPreferences>,
    ) -> Recipe {
        self.synthesize_with_origin(request, preferences).await.0
    }

    /// Like [`synthesize`](Self::synthesize), also reporting which path produced the recipe
    pub async fn synthesize_with_origin(
        &self,
        request: &RecipeRequest,
        preferences: Option<&UserPreferences>,
    ) -> (Recipe, RecipeOrigin) {
        if let Some(generator) = &self.generator {
            let prompt = build_prompt(request, preferences);
            match generator.complete(SYSTEM_PROMPT, &prompt).await {
                Ok(text) => match Recipe::from_json(strip_code_fences(&text)) {
                    Ok(recipe) => {
                        info!(title = %recipe.title, "Generated recipe");
                        return (recipe, RecipeOrigin::Generated);
                    }
                    Err(e) => warn!("Failed to parse generated recipe: {}", e),
                },
                Err(e) => warn!("Recipe generation failed: {}", e),
            }
        }

        let (recipe, origin) = fallback_recipe(&request.ingredients);
        info!(title = %recipe.title, source = origin.source_label(), "Using fallback recipe");
        (recipe, origin)
    }
}

/// Prompt asking for a JSON recipe
///
/// Request values win; the user's stored preferences fill what the request
/// leaves out.
pub fn build_prompt(request: &RecipeRequest, preferences: Option<&UserPreferences>) -> String {
    let ingredients = request.ingredients.join(", ");

    let mut dietary: Vec<&str> = request
        .dietary_preferences
        .iter()
        .map(String::as_str)
        .collect();
    if let Some(prefs) = preferences {
        for restriction in &prefs.dietary_restrictions {
            if !dietary.contains(&restriction.as_str()) {
                dietary.push(restriction);
            }
        }
    }
    let dietary = if dietary.is_empty() {
        "none".to_string()
    } else {
        dietary.join(", ")
    };

    let cuisine = match (&request.cuisine_type, preferences) {
        (Some(cuisine), _) if !cuisine.trim().is_empty() => cuisine.clone(),
        (_, Some(prefs)) if !prefs.cuisine_preferences.is_empty() => {
            prefs.cuisine_preferences.join(", ")
        }
        _ => "any".to_string(),
    };

    let difficulty = request
        .difficulty_preference
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("any");

    let skill = preferences
        .map(|p| p.cooking_skill.as_str())
        .unwrap_or("any");

    format!(
        r#"Create a detailed recipe using these ingredients: {ingredients}

Dietary preferences: {dietary}
Cuisine preference: {cuisine}
Difficulty preference: {difficulty}
Cook's skill level: {skill}

Please provide a JSON response with the following structure:
{{
    "title": "Recipe name",
    "steps": ["Step 1 instruction", "Step 2 instruction", ...],
    "estimated_time": 30,
    "difficulty": "easy/medium/hard",
    "tips": "Cooking tips or variations",
    "servings": 4
}}

Make sure the recipe is practical, uses common cooking techniques, and the steps are clear and detailed."#
    )
}

/// Remove a surrounding Markdown code fence, with or without a language tag
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") up to the first newline
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches("json"),
    };
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;
    use crate::services::generator::GenerationError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed result and records the prompt it was given
    struct CannedGenerator {
        reply: Result<String, ()>,
        seen_prompt: Mutex<Option<String>>,
    }

    impl CannedGenerator {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen_prompt: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, GenerationError> {
            *self.seen_prompt.lock().unwrap() = Some(prompt.to_string());
            self.reply.clone().map_err(|_| GenerationError::Timeout)
        }
    }

    const GOOD_REPLY: &str = r#"{
        "title": "Tomato Basil Pasta",
        "steps": ["Boil pasta", "Make sauce"],
        "estimated_time": 30,
        "difficulty": "medium",
        "tips": "Use fresh basil",
        "servings": 2
    }"#;

    #[tokio::test]
    async fn test_generated_recipe_used_verbatim() {
        let synth = RecipeSynthesizer::new(Some(CannedGenerator::ok(GOOD_REPLY)));
        let (recipe, origin) = synth
            .synthesize_with_origin(&RecipeRequest::new(["pasta", "tomato"]), None)
            .await;

        assert_eq!(origin, RecipeOrigin::Generated);
        assert_eq!(recipe.title, "Tomato Basil Pasta");
        assert_eq!(recipe.steps, vec!["Boil pasta", "Make sauce"]);
        assert_eq!(recipe.difficulty, Difficulty::Medium);
        assert_eq!(recipe.servings, 2);
    }

    #[tokio::test]
    async fn test_fenced_reply_accepted() {
        let fenced = format!("```json\n{}\n```", GOOD_REPLY);
        let synth = RecipeSynthesizer::new(Some(CannedGenerator::ok(&fenced)));
        let (_, origin) = synth
            .synthesize_with_origin(&RecipeRequest::new(["pasta"]), None)
            .await;
        assert_eq!(origin, RecipeOrigin::Generated);
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let synth = RecipeSynthesizer::new(Some(CannedGenerator::failing()));
        let (recipe, origin) = synth
            .synthesize_with_origin(&RecipeRequest::new(["chicken", "salt"]), None)
            .await;

        assert_eq!(origin, RecipeOrigin::Template);
        assert_eq!(recipe.title, "Simple Chicken Dish");
        assert!(recipe.validate().is_ok());
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back() {
        for reply in [
            "Sure! Here's a recipe:",
            r#"{"title": "x"}"#,
            r#"{"title": "x", "steps": [], "estimated_time": 5, "difficulty": "easy"}"#,
        ] {
            let synth = RecipeSynthesizer::new(Some(CannedGenerator::ok(reply)));
            let (recipe, origin) = synth
                .synthesize_with_origin(&RecipeRequest::new(["rice", "egg"]), None)
                .await;
            assert_eq!(origin, RecipeOrigin::Template, "reply: {}", reply);
            assert!(recipe.title.starts_with("Rice"));
        }
    }

    #[tokio::test]
    async fn test_offline_uses_templates() {
        let synth = RecipeSynthesizer::offline();
        let recipe = synth
            .synthesize(&RecipeRequest::new(["carrot", "pepper"]), None)
            .await;
        assert_eq!(recipe.title, "Mixed Vegetable Stir Fry");
    }

    #[tokio::test]
    async fn test_prompt_includes_request_and_preferences() {
        let generator = CannedGenerator::ok(GOOD_REPLY);
        let synth = RecipeSynthesizer::new(Some(generator.clone()));

        let mut request = RecipeRequest::new(["tofu", "broccoli"]);
        request.dietary_preferences = vec!["vegan".to_string()];
        request.difficulty_preference = Some("easy".to_string());
        let prefs = UserPreferences {
            dietary_restrictions: vec!["vegan".to_string(), "nut-free".to_string()],
            cuisine_preferences: vec!["thai".to_string()],
            cooking_skill: "intermediate".to_string(),
        };

        synth.synthesize(&request, Some(&prefs)).await;

        let prompt = generator.seen_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("these ingredients: tofu, broccoli"));
        assert!(prompt.contains("Dietary preferences: vegan, nut-free"));
        assert!(prompt.contains("Cuisine preference: thai"));
        assert!(prompt.contains("Difficulty preference: easy"));
        assert!(prompt.contains("skill level: intermediate"));
    }

    #[test]
    fn test_prompt_defaults() {
        let prompt = build_prompt(&RecipeRequest::new(["egg"]), None);
        assert!(prompt.contains("Dietary preferences: none"));
        assert!(prompt.contains("Cuisine preference: any"));
        assert!(prompt.contains("\"estimated_time\": 30"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
    }
}
