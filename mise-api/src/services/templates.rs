//! Rule-based fallback recipes
//!
//! Used when the generative service is unavailable or replies with something
//! that doesn't parse. Classification looks at normalized ingredient names:
//!
//! | Template | Chosen when the list contains |
//! |---|---|
//! | [`FallbackTemplate::Grain`] | rice, pasta or noodles |
//! | [`FallbackTemplate::Protein`] | chicken, beef, fish, paneer or tofu |
//! | [`FallbackTemplate::StirFry`] | anything else |
//!
//! Grain is checked before protein. If the chosen template can't be built
//! (no ingredients, or a blank first ingredient where the template names it)
//! [`last_resort_recipe`] is used instead.

use thiserror::Error;
use tracing::warn;

use crate::models::{Difficulty, Recipe, RecipeOrigin, DEFAULT_SERVINGS};
use mise_common::validation::normalize_ingredient_name;

const GRAINS: &[&str] = &["rice", "pasta", "noodles"];
const PROTEINS: &[&str] = &["chicken", "beef", "fish", "paneer", "tofu"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("No ingredients to build a recipe from")]
    NoIngredients,

    #[error("First ingredient is blank")]
    BlankPrimary,
}

/// Fallback recipe family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTemplate {
    Grain,
    Protein,
    StirFry,
}

impl FallbackTemplate {
    /// Pick a template for an ingredient list
    pub fn classify<S: AsRef<str>>(ingredients: &[S]) -> Self {
        let names: Vec<String> = ingredients
            .iter()
            .map(|i| normalize_ingredient_name(i.as_ref()))
            .collect();
        let contains_any = |set: &[&str]| names.iter().any(|n| set.contains(&n.as_str()));

        if contains_any(GRAINS) {
            FallbackTemplate::Grain
        } else if contains_any(PROTEINS) {
            FallbackTemplate::Protein
        } else {
            FallbackTemplate::StirFry
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FallbackTemplate::Grain => "grain_based",
            FallbackTemplate::Protein => "protein_based",
            FallbackTemplate::StirFry => "vegetable_stir_fry",
        }
    }

    /// Fill in the template for these ingredients
    pub fn build<S: AsRef<str>>(&self, ingredients: &[S]) -> Result<Recipe, TemplateError> {
        let first = ingredients
            .first()
            .ok_or(TemplateError::NoIngredients)?
            .as_ref()
            .trim();

        let recipe = match self {
            FallbackTemplate::Grain => {
                if first.is_empty() {
                    return Err(TemplateError::BlankPrimary);
                }
                let all: Vec<&str> = ingredients.iter().map(|i| i.as_ref().trim()).collect();
                Recipe {
                    title: format!("{} Bowl", title_case(first)),
                    steps: steps(&[
                        &format!("Prepare all ingredients: {}", all.join(", ")),
                        "Heat oil in a large pan or wok",
                        "Add aromatics (onion, garlic, ginger) if available",
                        "Add main ingredients and cook until tender",
                        "Season with salt, pepper, and available spices",
                        "Serve hot and enjoy!",
                    ]),
                    estimated_time_minutes: 25,
                    difficulty: Difficulty::Easy,
                    tips: Some("Feel free to adjust seasoning to taste".to_string()),
                    servings: DEFAULT_SERVINGS,
                }
            }
            FallbackTemplate::Protein => {
                if first.is_empty() {
                    return Err(TemplateError::BlankPrimary);
                }
                Recipe {
                    title: format!("Simple {} Dish", title_case(first)),
                    steps: steps(&[
                        &format!("Clean and prepare {}", first),
                        "Heat oil in a pan",
                        "Cook protein until golden brown",
                        "Add vegetables and seasonings",
                        "Cook until everything is well combined",
                        "Serve with rice or bread",
                    ]),
                    estimated_time_minutes: 30,
                    difficulty: Difficulty::Medium,
                    tips: Some("Don't overcook the protein".to_string()),
                    servings: DEFAULT_SERVINGS,
                }
            }
            FallbackTemplate::StirFry => Recipe {
                title: "Mixed Vegetable Stir Fry".to_string(),
                steps: steps(&[
                    "Wash and chop all vegetables",
                    "Heat oil in a wok or large pan",
                    "Add harder vegetables first",
                    "Stir fry on high heat",
                    "Add softer vegetables",
                    "Season and serve hot",
                ]),
                estimated_time_minutes: 15,
                difficulty: Difficulty::Easy,
                tips: Some("Keep vegetables crispy for better texture".to_string()),
                servings: DEFAULT_SERVINGS,
            },
        };

        Ok(recipe)
    }
}

/// Classify, build, and fall through to the last-resort recipe on failure
pub fn fallback_recipe<S: AsRef<str>>(ingredients: &[S]) -> (Recipe, RecipeOrigin) {
    let template = FallbackTemplate::classify(ingredients);
    match template.build(ingredients) {
        Ok(recipe) => (recipe, RecipeOrigin::Template),
        Err(e) => {
            warn!(template = template.name(), "Fallback template failed: {}", e);
            (last_resort_recipe(), RecipeOrigin::LastResort)
        }
    }
}

/// Fixed recipe that needs nothing from the input
pub fn last_resort_recipe() -> Recipe {
    Recipe {
        title: "Simple Ingredient Mix".to_string(),
        steps: steps(&[
            "Combine all available ingredients",
            "Cook with basic seasonings",
            "Adjust taste as needed",
        ]),
        estimated_time_minutes: 20,
        difficulty: Difficulty::Easy,
        tips: Some("This is a basic combination of your ingredients".to_string()),
        servings: DEFAULT_SERVINGS,
    }
}

fn steps(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

/// Capitalize the first letter of every word, lowercase the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}
