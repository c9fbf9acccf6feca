//! Configuration loading and root folder resolution
//!
//! Resolution order for every setting:
//! 1. Command-line argument / environment variable (clap `env`, applied via [`ConfigOverrides`])
//! 2. TOML config file
//! 3. Compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "MISE_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "mise.db";

/// Complete service configuration as read from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the database and temporary uploads
    pub root_folder: Option<PathBuf>,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub openai: OpenAiConfig,
    pub detection: DetectionConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token signing secret. Generated and persisted in the database when absent.
    pub token_secret: Option<String>,
    pub access_token_expire_minutes: i64,
    /// PBKDF2 rounds for newly hashed passwords
    pub password_hash_rounds: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            access_token_expire_minutes: 30,
            password_hash_rounds: crate::auth::DEFAULT_HASH_ROUNDS,
        }
    }
}

/// Generative text and vision service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Without a key the generative and vision paths are disabled
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub vision_model: String,
    pub request_timeout_secs: u64,
    pub requests_per_minute: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 30,
            requests_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Inference endpoint of the local ingredient model
    pub local_detector_url: Option<String>,
    /// Cap on merged ingredients returned per upload
    pub max_ingredients: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            local_detector_url: None,
            max_ingredients: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Per-file limit in bytes
    pub max_upload_size: usize,
    #[serde(alias = "max_images_per_upload")]
    pub max_images: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 10 * 1024 * 1024,
            max_images: 5,
            allowed_extensions: ["jpg", "jpeg", "png", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub token_secret: Option<String>,
    pub access_token_expire_minutes: Option<i64>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub vision_model: Option<String>,
    pub local_detector_url: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from an explicit file, or from the platform location.
    ///
    /// An explicit path must exist. A missing platform file yields defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match default_config_file() {
                Some(path) => path,
                None => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply command-line / environment values on top of the file values
    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(secret) = overrides.token_secret {
            self.auth.token_secret = Some(secret);
        }
        if let Some(minutes) = overrides.access_token_expire_minutes {
            self.auth.access_token_expire_minutes = minutes;
        }
        if let Some(key) = overrides.openai_api_key {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = overrides.openai_base_url {
            self.openai.base_url = url;
        }
        if let Some(model) = overrides.openai_model {
            self.openai.model = model;
        }
        if let Some(model) = overrides.vision_model {
            self.openai.vision_model = model;
        }
        if let Some(url) = overrides.local_detector_url {
            self.detection.local_detector_url = Some(url);
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        self
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.auth.access_token_expire_minutes <= 0 {
            return Err(Error::Config(
                "auth.access_token_expire_minutes must be positive".to_string(),
            ));
        }
        if self.auth.password_hash_rounds == 0 {
            return Err(Error::Config(
                "auth.password_hash_rounds must be at least 1".to_string(),
            ));
        }
        if self.detection.max_ingredients == 0 {
            return Err(Error::Config(
                "detection.max_ingredients must be at least 1".to_string(),
            ));
        }
        if self.upload.max_images == 0 || self.upload.max_upload_size == 0 {
            return Err(Error::Config(
                "upload limits must be positive".to_string(),
            ));
        }
        if self.openai.requests_per_minute == 0 {
            return Err(Error::Config(
                "openai.requests_per_minute must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config value
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    get_default_root_folder()
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// Temporary upload directory inside a root folder
pub fn uploads_dir(root_folder: &Path) -> PathBuf {
    root_folder.join("uploads").join("temp")
}

/// Platform config file, if one exists
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mise").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mise/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("mise"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mise"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("mise"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mise"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("mise"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mise"))
    } else {
        PathBuf::from("./mise_data")
    }
}
