//! Ingredient detectors and the per-upload recognition pipeline
//!
//! Two independent detectors look at every image:
//! - [`LocalModelDetector`] posts the image to a locally hosted model server
//! - [`VisionDetector`] asks the remote vision API for a comma-separated list
//!
//! A detector failure never fails the upload; its output is replaced with an
//! empty list and the other detector's result still counts.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::merger::DetectionMerger;
use super::openai::OpenAiClient;
use crate::models::{DetectedIngredient, DetectionSource, MergedIngredient};
use mise_common::validation::{is_plausible_ingredient, normalize_ingredient_name};

/// Confidence given to every name the vision API returns
pub const VISION_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Detector returned {0}: {1}")]
    Api(u16, String),

    #[error("Unexpected detector response: {0}")]
    BadResponse(String),
}

impl From<reqwest::Error> for DetectionError {
    fn from(e: reqwest::Error) -> Self {
        DetectionError::Network(e.to_string())
    }
}

/// Proposes ingredient names for an image
#[async_trait]
pub trait IngredientDetector: Send + Sync {
    fn source(&self) -> DetectionSource;

    async fn detect(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Vec<DetectedIngredient>, DetectionError>;
}

/// Run a detector, turning any failure into "nothing found"
pub async fn detect_or_empty(
    detector: &dyn IngredientDetector,
    image: &[u8],
    mime_type: &str,
) -> Vec<DetectedIngredient> {
    match detector.detect(image, mime_type).await {
        Ok(found) => {
            debug!(source = ?detector.source(), count = found.len(), "Detector finished");
            found
        }
        Err(e) => {
            warn!(source = ?detector.source(), "Ingredient detection failed: {}", e);
            Vec::new()
        }
    }
}

// ========================================
// Local model
// ========================================

#[derive(Debug, Serialize)]
struct LocalDetectRequest<'a> {
    image: String,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct LocalDetection {
    name: String,
    confidence: f64,
}

/// The model server may answer with a bare list or wrap it
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocalDetectResponse {
    List(Vec<LocalDetection>),
    Wrapped { ingredients: Vec<LocalDetection> },
}

/// HTTP client for a locally hosted ingredient model
///
/// POSTs `{"image": <base64>, "mime_type": ...}` and expects
/// `[{"name": ..., "confidence": ...}]`.
pub struct LocalModelDetector {
    http_client: reqwest::Client,
    url: String,
}

impl LocalModelDetector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DetectionError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Network(e.to_string()))?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IngredientDetector for LocalModelDetector {
    fn source(&self) -> DetectionSource {
        DetectionSource::Local
    }

    async fn detect(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Vec<DetectedIngredient>, DetectionError> {
        let request = LocalDetectRequest {
            image: STANDARD.encode(image),
            mime_type,
        };

        let response = self.http_client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DetectionError::Api(status.as_u16(), error_text));
        }

        let detections = match response
            .json::<LocalDetectResponse>()
            .await
            .map_err(|e| DetectionError::BadResponse(e.to_string()))?
        {
            LocalDetectResponse::List(list) => list,
            LocalDetectResponse::Wrapped { ingredients } => ingredients,
        };

        Ok(detections
            .into_iter()
            .map(|d| DetectedIngredient::new(d.name, d.confidence, DetectionSource::Local))
            .collect())
    }
}

// ========================================
// Remote vision API
// ========================================

pub struct VisionDetector {
    client: Arc<OpenAiClient>,
}

impl VisionDetector {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IngredientDetector for VisionDetector {
    fn source(&self) -> DetectionSource {
        DetectionSource::Remote
    }

    async fn detect(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Vec<DetectedIngredient>, DetectionError> {
        let reply = self
            .client
            .describe_image(image, mime_type)
            .await
            .map_err(|e| DetectionError::Network(e.to_string()))?;
        Ok(parse_ingredient_list(&reply))
    }
}

/// Split a comma-separated reply into remote detections
pub fn parse_ingredient_list(reply: &str) -> Vec<DetectedIngredient> {
    reply
        .split(',')
        .map(|name| name.trim().trim_end_matches('.').trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .map(|name| DetectedIngredient::new(name, VISION_CONFIDENCE, DetectionSource::Remote))
        .collect()
}

// ========================================
// Recognition pipeline
// ========================================

/// One image ready for detection
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Runs both detectors over every image of an upload and merges the results
#[derive(Clone)]
pub struct IngredientRecognizer {
    local: Option<Arc<dyn IngredientDetector>>,
    remote: Option<Arc<dyn IngredientDetector>>,
    merger: DetectionMerger,
}

impl IngredientRecognizer {
    pub fn new(
        local: Option<Arc<dyn IngredientDetector>>,
        remote: Option<Arc<dyn IngredientDetector>>,
        merger: DetectionMerger,
    ) -> Self {
        Self {
            local,
            remote,
            merger,
        }
    }

    /// Per image: both detectors concurrently, then merge. Images run in order.
    ///
    /// Labels that aren't ingredients are dropped before merging so they never
    /// take a slot under the ingredient cap. The combined list keeps each
    /// name's best score.
    pub async fn recognize(&self, images: &[ImageInput]) -> Vec<MergedIngredient> {
        let mut per_image = Vec::with_capacity(images.len());

        for (index, image) in images.iter().enumerate() {
            let (local, remote) = tokio::join!(
                run_optional(self.local.as_deref(), image),
                run_optional(self.remote.as_deref(), image),
            );
            let merged = self.merger.merge(&plausible_only(local), &plausible_only(remote));
            debug!(image = index, ingredients = merged.len(), "Image processed");
            per_image.push(merged);
        }

        let combined = self.merger.combine_across_images(per_image);

        info!(
            images = images.len(),
            ingredients = combined.len(),
            "Ingredient recognition complete"
        );
        combined
    }
}

fn plausible_only(mut found: Vec<DetectedIngredient>) -> Vec<DetectedIngredient> {
    found.retain(|d| is_plausible_ingredient(&normalize_ingredient_name(&d.name)));
    found
}

async fn run_optional(
    detector: Option<&dyn IngredientDetector>,
    image: &ImageInput,
) -> Vec<DetectedIngredient> {
    match detector {
        Some(detector) => detect_or_empty(detector, &image.data, &image.mime_type).await,
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector {
        source: DetectionSource,
        found: Vec<(&'static str, f64)>,
    }

    #[async_trait]
    impl IngredientDetector for FixedDetector {
        fn source(&self) -> DetectionSource {
            self.source
        }

        async fn detect(
            &self,
            _image: &[u8],
            _mime_type: &str,
        ) -> Result<Vec<DetectedIngredient>, DetectionError> {
            Ok(self
                .found
                .iter()
                .map(|(n, c)| DetectedIngredient::new(*n, *c, self.source))
                .collect())
        }
    }

    struct BrokenDetector;

    #[async_trait]
    impl IngredientDetector for BrokenDetector {
        fn source(&self) -> DetectionSource {
            DetectionSource::Remote
        }

        async fn detect(
            &self,
            _image: &[u8],
            _mime_type: &str,
        ) -> Result<Vec<DetectedIngredient>, DetectionError> {
            Err(DetectionError::Api(503, "unavailable".to_string()))
        }
    }

    fn image() -> ImageInput {
        ImageInput {
            data: vec![0xFF, 0xD8, 0xFF],
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn test_parse_ingredient_list() {
        let found = parse_ingredient_list(" Tomato, onion ,, Garlic.\n");
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["tomato", "onion", "garlic"]);
        assert!(found.iter().all(|d| d.confidence == VISION_CONFIDENCE));
        assert!(found.iter().all(|d| d.source == DetectionSource::Remote));
    }

    #[tokio::test]
    async fn test_failure_becomes_empty() {
        let found = detect_or_empty(&BrokenDetector, &[1, 2, 3], "image/png").await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_recognize_merges_and_cleans() {
        let local = FixedDetector {
            source: DetectionSource::Local,
            found: vec![("tomato", 0.9), ("plate", 0.95), ("onion", 0.8)],
        };
        let remote = FixedDetector {
            source: DetectionSource::Remote,
            found: vec![("tomato", 0.85)],
        };
        let recognizer = IngredientRecognizer::new(
            Some(Arc::new(local)),
            Some(Arc::new(remote)),
            DetectionMerger::default(),
        );

        let found = recognizer.recognize(&[image(), image()]).await;
        let names: Vec<&str> = found.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["tomato", "onion"]);
        assert_eq!(found[0].sources.len(), 2);
    }

    #[tokio::test]
    async fn test_non_food_labels_do_not_take_slots() {
        const FOODS: [&str; 20] = [
            "apple", "bean", "carrot", "date", "egg", "fennel", "garlic", "honey", "kale",
            "leek", "mango", "noodle", "olive", "pepper", "quinoa", "rice", "spinach", "tofu",
            "yam", "zucchini",
        ];
        const NON_FOOD: [&str; 7] =
            ["plate", "bowl", "table", "hand", "person", "kitchen", "utensil"];
        let mut found: Vec<(&'static str, f64)> = NON_FOOD.iter().map(|n| (*n, 0.99)).collect();
        found.extend(FOODS.iter().map(|n| (*n, 0.9)));
        let local = FixedDetector {
            source: DetectionSource::Local,
            found,
        };
        let recognizer =
            IngredientRecognizer::new(Some(Arc::new(local)), None, DetectionMerger::default());

        let found = recognizer.recognize(&[image(), image()]).await;
        assert_eq!(found.len(), 20);
        assert!(found.iter().all(|m| FOODS.contains(&m.name.as_str())));
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_local() {
        let local = FixedDetector {
            source: DetectionSource::Local,
            found: vec![("garlic", 0.75)],
        };
        let recognizer = IngredientRecognizer::new(
            Some(Arc::new(local)),
            Some(Arc::new(BrokenDetector)),
            DetectionMerger::default(),
        );

        let found = recognizer.recognize(&[image()]).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "garlic");
    }

    #[tokio::test]
    async fn test_no_detectors_no_ingredients() {
        let recognizer = IngredientRecognizer::new(None, None, DetectionMerger::default());
        assert!(recognizer.recognize(&[image()]).await.is_empty());
    }
}
