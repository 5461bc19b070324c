//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Every section is optional;
//! a missing file is not an error and yields built-in defaults.
//!
//! # Root folder priority
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CQM_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CQM_ROOT_FOLDER";

/// Environment variable overriding the color predictor endpoint
pub const PREDICTOR_URL_ENV: &str = "CQM_PREDICTOR_URL";

/// Cloudinary credential environment variables
pub const CLOUDINARY_CLOUD_NAME_ENV: &str = "CLOUDINARY_CLOUD_NAME";
pub const CLOUDINARY_API_KEY_ENV: &str = "CLOUDINARY_API_KEY";
pub const CLOUDINARY_API_SECRET_ENV: &str = "CLOUDINARY_API_SECRET";

/// SQLite database file created inside the root folder
pub const DATABASE_FILE_NAME: &str = "cqm.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port (optional, CLI/env take precedence)
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Cloudinary credentials; grain images are not uploaded when absent
    #[serde(default)]
    pub cloudinary: Option<CloudinaryConfig>,

    /// Color predictor inference endpoint
    #[serde(default)]
    pub predictor: PredictorConfig,

    /// Grading constants
    #[serde(default)]
    pub grading: GradingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Cloudinary account credentials
#[derive(Debug, Clone, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,

    /// Asset folder grain images are stored under
    #[serde(default = "default_upload_folder")]
    pub folder: String,
}

/// Color predictor client settings
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    /// Inference endpoint; the predictor reports itself unavailable when unset
    #[serde(default)]
    pub url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_predictor_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_seconds: default_predictor_timeout(),
        }
    }
}

/// Grading constants: color base scores and category thresholds
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradingConfig {
    #[serde(default)]
    pub base_scores: BaseScores,

    #[serde(default)]
    pub thresholds: GradeThresholds,
}

/// Base score assigned to each winning color class
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BaseScores {
    #[serde(default = "default_light_score")]
    pub light: f64,
    #[serde(default = "default_medium_score")]
    pub medium: f64,
    #[serde(default = "default_dark_score")]
    pub dark: f64,
    #[serde(default = "default_green_score")]
    pub green: f64,
}

impl Default for BaseScores {
    fn default() -> Self {
        Self {
            light: default_light_score(),
            medium: default_medium_score(),
            dark: default_dark_score(),
            green: default_green_score(),
        }
    }
}

/// Minimum final score for each grade above C
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GradeThresholds {
    #[serde(default = "default_specialty_threshold")]
    pub specialty: f64,
    #[serde(default = "default_premium_threshold")]
    pub premium: f64,
    #[serde(default = "default_grade_a_threshold")]
    pub a: f64,
    #[serde(default = "default_grade_b_threshold")]
    pub b: f64,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            specialty: default_specialty_threshold(),
            premium: default_premium_threshold(),
            a: default_grade_a_threshold(),
            b: default_grade_b_threshold(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_upload_folder() -> String {
    "coffee_grains".to_string()
}

fn default_predictor_timeout() -> u64 {
    30
}

fn default_light_score() -> f64 {
    0.95
}

fn default_medium_score() -> f64 {
    0.85
}

fn default_dark_score() -> f64 {
    0.45
}

fn default_green_score() -> f64 {
    0.35
}

fn default_specialty_threshold() -> f64 {
    0.9
}

fn default_premium_threshold() -> f64 {
    0.8
}

fn default_grade_a_threshold() -> f64 {
    0.7
}

fn default_grade_b_threshold() -> f64 {
    0.6
}

impl TomlConfig {
    /// Load configuration from a TOML file
    ///
    /// A missing file logs a warning and returns defaults. A file that exists
    /// but cannot be read or parsed is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        match Self::try_load(path)? {
            Some(config) => {
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => {
                warn!(
                    "Config file not found at {}, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    /// Load configuration without logging; `None` when the file is missing
    ///
    /// For callers that read the config before logging is initialized.
    pub fn try_load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

        config.grading.validate()?;
        Ok(Some(config))
    }

    /// Apply environment variable overrides (environment wins over TOML)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(PREDICTOR_URL_ENV) {
            if !url.trim().is_empty() {
                self.predictor.url = Some(url);
            }
        }

        let cloud_name = std::env::var(CLOUDINARY_CLOUD_NAME_ENV).ok();
        let api_key = std::env::var(CLOUDINARY_API_KEY_ENV).ok();
        let api_secret = std::env::var(CLOUDINARY_API_SECRET_ENV).ok();

        match (cloud_name, api_key, api_secret) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => {
                let folder = self
                    .cloudinary
                    .as_ref()
                    .map(|c| c.folder.clone())
                    .unwrap_or_else(default_upload_folder);
                self.cloudinary = Some(CloudinaryConfig {
                    cloud_name,
                    api_key,
                    api_secret,
                    folder,
                });
            }
            (None, None, None) => {}
            _ => warn!("Incomplete Cloudinary environment credentials ignored"),
        }
    }
}

impl GradingConfig {
    /// Thresholds must lie in [0, 1] and strictly descend from Specialty to B
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        let ordered = [t.specialty, t.premium, t.a, t.b];

        if ordered.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(Error::Config(format!(
                "Grade thresholds must be within [0, 1]: {:?}",
                ordered
            )));
        }
        if ordered.windows(2).any(|w| w[0] <= w[1]) {
            return Err(Error::Config(format!(
                "Grade thresholds must strictly descend (specialty > premium > a > b): {:?}",
                ordered
            )));
        }

        let s = &self.base_scores;
        if [s.light, s.medium, s.dark, s.green]
            .iter()
            .any(|v| !(0.0..=1.0).contains(v))
        {
            return Err(Error::Config(format!(
                "Base scores must be within [0, 1]: {:?}",
                s
            )));
        }

        Ok(())
    }
}

/// Default TOML location for a module: `<config_dir>/cqm/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cqm").join(format!("{}.toml", module_name)))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cqm"))
        .unwrap_or_else(|| PathBuf::from("./cqm_data"))
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Root folder given on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Root folder from the loaded TOML config
    pub fn with_toml_root(mut self, path: Option<PathBuf>) -> Self {
        self.toml_root = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from TOML config: {}", path.display());
            return path.clone();
        }

        let path = default_root_folder();
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}
