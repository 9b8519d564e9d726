//! Configuration loading and root folder resolution
//!
//! Priority order (highest first):
//! 1. Command-line argument (applied by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing config file is not an error: the service logs a warning and
//! starts on defaults. A config file that exists but does not parse is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5730";
/// Default request body limit for submissions (20 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
/// Default media host folder
pub const DEFAULT_MEDIA_FOLDER: &str = "door2door";
/// Default media host upload API
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://api.cloudinary.com/v1_1";
/// Default classifier inference API
pub const DEFAULT_CLASSIFIER_BASE_URL: &str = "https://serverless.roboflow.com";
/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "d2d.db";

/// Service configuration as read from `d2d-server.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Folder holding the database; compiled default when unset
    pub root_folder: Option<PathBuf>,
    /// HTTP listen address
    pub bind_addr: String,
    /// Maximum accepted request body for submissions
    pub max_upload_bytes: usize,
    pub logging: LoggingConfig,
    pub media_host: MediaHostConfig,
    pub classifier: ClassifierConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            logging: LoggingConfig::default(),
            media_host: MediaHostConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Image host credentials and upload target
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaHostConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
    pub upload_base_url: String,
    /// Per-upload timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MediaHostConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            folder: DEFAULT_MEDIA_FOLDER.to_string(),
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for MediaHostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHostConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("folder", &self.folder)
            .field("upload_base_url", &self.upload_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Classification endpoint settings and the model list to fan out to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    pub models: Vec<ClassifierModel>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CLASSIFIER_BASE_URL.to_string(),
            timeout_secs: 30,
            models: Vec::new(),
        }
    }
}

/// One hosted classification model
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub id: String,
    #[serde(default = "default_model_version")]
    pub version: u32,
    pub api_key: String,
}

fn default_model_version() -> u32 {
    1
}

impl fmt::Debug for ClassifierModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierModel")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    ///
    /// Missing file: warning + compiled defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file not found at {}; using compiled defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Blank values are ignored so an exported-but-empty variable does not
    /// wipe a configured value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("D2D_ROOT_FOLDER") {
            self.root_folder = Some(PathBuf::from(v));
        }
        if let Some(v) = get("D2D_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = get("D2D_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = v.trim().parse().map_err(|e| {
                Error::Config(format!("D2D_MAX_UPLOAD_BYTES is not a byte count: {}", e))
            })?;
        }
        if let Some(v) = get("CLOUDINARY_CLOUD_NAME") {
            self.media_host.cloud_name = v;
        }
        if let Some(v) = get("CLOUDINARY_API_KEY") {
            self.media_host.api_key = v;
        }
        if let Some(v) = get("CLOUDINARY_API_SECRET") {
            self.media_host.api_secret = v;
        }
        if let Some(v) = get("D2D_MEDIA_FOLDER") {
            self.media_host.folder = v;
        }
        if let Some(v) = get("D2D_CLASSIFIER_BASE_URL") {
            self.classifier.base_url = v;
        }
        if let Some(v) = get("D2D_CLASSIFIER_MODELS") {
            self.classifier.models = parse_model_list(&v)?;
        }

        Ok(())
    }

    /// Root folder after falling back to the compiled default
    pub fn resolved_root_folder(&self) -> PathBuf {
        self.root_folder
            .clone()
            .unwrap_or_else(default_root_folder)
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.resolved_root_folder().join(DATABASE_FILE)
    }

    /// Create the root folder if missing
    pub fn ensure_root_folder_exists(&self) -> Result<PathBuf> {
        let root = self.resolved_root_folder();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            info!("Created root folder: {}", root.display());
        }
        Ok(root)
    }

    /// Check settings the service cannot start without
    pub fn validate(&self) -> Result<()> {
        let media = &self.media_host;
        let missing: Vec<&str> = [
            ("media_host.cloud_name", &media.cloud_name),
            ("media_host.api_key", &media.api_key),
            ("media_host.api_secret", &media.api_secret),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Media host credentials not configured: {}. Set them in the TOML file \
                 or via CLOUDINARY_CLOUD_NAME / CLOUDINARY_API_KEY / CLOUDINARY_API_SECRET",
                missing.join(", ")
            )));
        }

        if media.folder.trim().is_empty() {
            return Err(Error::Config("media_host.folder must not be empty".to_string()));
        }

        for model in &self.classifier.models {
            if model.id.trim().is_empty() || model.api_key.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Classifier model entry incomplete: {:?}",
                    model
                )));
            }
        }

        if self.classifier.models.is_empty() {
            warn!("No classifier models configured; submissions will carry empty predictions");
        }

        Ok(())
    }
}

/// Parse `id:version:key` entries separated by commas
///
/// The version segment may be omitted (`id:key`), defaulting to 1.
pub fn parse_model_list(value: &str) -> Result<Vec<ClassifierModel>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (id, version, api_key) = match parts.as_slice() {
                [id, key] => (*id, 1, *key),
                [id, version, key] => {
                    let version = version.parse::<u32>().map_err(|_| {
                        Error::Config(format!("Invalid model version in '{}'", entry))
                    })?;
                    (*id, version, *key)
                }
                _ => {
                    return Err(Error::Config(format!(
                        "Invalid model entry '{}': expected id:version:key",
                        entry
                    )))
                }
            };

            if id.is_empty() || api_key.is_empty() {
                return Err(Error::Config(format!("Invalid model entry '{}'", entry)));
            }

            Ok(ClassifierModel {
                id: id.to_string(),
                version,
                api_key: api_key.to_string(),
            })
        })
        .collect()
}

/// Default location of the config file for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("door2door").join("d2d-server.toml"))
        .unwrap_or_else(|| PathBuf::from("d2d-server.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("door2door"))
        .unwrap_or_else(|| PathBuf::from("./door2door_data"))
}
