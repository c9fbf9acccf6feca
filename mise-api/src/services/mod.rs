//! Business logic: detection, recipe synthesis, uploads

pub mod detectors;
pub mod generator;
pub mod merger;
pub mod openai;
pub mod synthesizer;
pub mod templates;
pub mod upload;

pub use detectors::{
    detect_or_empty, DetectionError, ImageInput, IngredientDetector, IngredientRecognizer,
    LocalModelDetector, VisionDetector,
};
pub use generator::{GenerationError, TextGenerator};
pub use merger::DetectionMerger;
pub use openai::OpenAiClient;
pub use synthesizer::RecipeSynthesizer;
pub use templates::{fallback_recipe, last_resort_recipe, FallbackTemplate};
pub use upload::{TempStore, UploadError, UploadPolicy, ValidatedImage};
