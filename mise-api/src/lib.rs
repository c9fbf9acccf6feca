//! mise-api library interface
//!
//! Ingredient photos in, recipes out. Exposes the router and state so
//! integration tests can drive the service without a socket.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mise_common::auth::TokenSigner;
use mise_common::config::{uploads_dir, TomlConfig};
use services::{
    DetectionMerger, IngredientDetector, IngredientRecognizer, LocalModelDetector, OpenAiClient,
    RecipeSynthesizer, TempStore, TextGenerator, UploadPolicy, VisionDetector,
};

/// Headroom for multipart framing on top of the image bytes
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Access token issuing and verification
    pub tokens: TokenSigner,
    /// PBKDF2 rounds for new password hashes
    pub password_hash_rounds: u32,
    pub synthesizer: RecipeSynthesizer,
    pub recognizer: IngredientRecognizer,
    pub upload_policy: Arc<UploadPolicy>,
    pub temp_store: TempStore,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// State with no external collaborators: rule-based recipes, no detectors
    pub fn new(db: SqlitePool, tokens: TokenSigner, temp_dir: impl AsRef<Path>) -> Self {
        Self {
            db,
            tokens,
            password_hash_rounds: mise_common::auth::DEFAULT_HASH_ROUNDS,
            synthesizer: RecipeSynthesizer::offline(),
            recognizer: IngredientRecognizer::new(None, None, DetectionMerger::default()),
            upload_policy: Arc::new(UploadPolicy::default()),
            temp_store: TempStore::new(temp_dir.as_ref()),
            startup_time: Utc::now(),
        }
    }

    /// Wire up collaborators from configuration
    ///
    /// Without an API key the generative and vision paths are disabled;
    /// without a local detector URL the local detector is.
    pub fn from_config(
        db: SqlitePool,
        tokens: TokenSigner,
        config: &TomlConfig,
        root_folder: &Path,
    ) -> mise_common::Result<Self> {
        let openai = OpenAiClient::from_config(&config.openai)
            .map_err(|e| mise_common::Error::Config(format!("OpenAI client: {}", e)))?
            .map(Arc::new);

        let generator: Option<Arc<dyn TextGenerator>> = match &openai {
            Some(client) => Some(client.clone() as Arc<dyn TextGenerator>),
            None => {
                warn!("No OpenAI API key configured, recipes will use rule-based templates");
                None
            }
        };
        let remote: Option<Arc<dyn IngredientDetector>> = match &openai {
            Some(client) => {
                let detector = VisionDetector::new(client.clone());
                Some(Arc::new(detector) as Arc<dyn IngredientDetector>)
            }
            None => None,
        };

        let local_url = config.detection.local_detector_url.as_ref();
        let local: Option<Arc<dyn IngredientDetector>> = match local_url {
            Some(url) => {
                let timeout = Duration::from_secs(config.openai.request_timeout_secs);
                let detector = LocalModelDetector::new(url.clone(), timeout)
                    .map_err(|e| mise_common::Error::Config(format!("Local detector: {}", e)))?;
                info!("Local ingredient detector: {}", url);
                Some(Arc::new(detector) as Arc<dyn IngredientDetector>)
            }
            None => {
                warn!("No local detector URL configured, local detection disabled");
                None
            }
        };

        Ok(Self {
            password_hash_rounds: config.auth.password_hash_rounds,
            synthesizer: RecipeSynthesizer::new(generator),
            recognizer: IngredientRecognizer::new(
                local,
                remote,
                DetectionMerger::new(config.detection.max_ingredients),
            ),
            upload_policy: Arc::new(UploadPolicy::from(&config.upload)),
            ..Self::new(db, tokens, uploads_dir(root_folder))
        })
    }

    pub fn with_password_hash_rounds(mut self, rounds: u32) -> Self {
        self.password_hash_rounds = rounds;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: RecipeSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_recognizer(mut self, recognizer: IngredientRecognizer) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = Arc::new(policy);
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .upload_policy
        .max_size
        .saturating_mul(state.upload_policy.max_images)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .merge(api::health_routes())
        .merge(api::auth_routes())
        .merge(api::upload_routes())
        .merge(api::recipe_routes())
        .merge(api::user_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
