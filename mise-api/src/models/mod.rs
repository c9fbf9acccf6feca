//! Domain and API data types

pub mod ingredient;
pub mod recipe;
pub mod user;

pub use ingredient::{DetectedIngredient, DetectionSource, MergedIngredient};
pub use recipe::{
    Difficulty, GeneratedRecipeDocument, NutritionInfo, Recipe, RecipeError, RecipeHistory,
    RecipeOrigin, RecipeRequest, StaticRecipe, StaticRecipeFilter, DEFAULT_SERVINGS,
};
pub use user::{
    LoginRequest, RegisterRequest, TokenResponse, UpdateProfileRequest, User, UserPreferences,
    UserResponse,
};
