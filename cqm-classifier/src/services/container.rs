//! Service container wiring the classification collaborators
//!
//! Built once at startup and shared behind an `Arc`. Tests build one by hand
//! with fake collaborators.

use cqm_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::collaborators::{
    BeanSegmenter, CloudinaryUploader, CollaboratorError, ColorPredictor, ContourFeatureExtractor,
    FeatureExtractor, HttpColorPredictor, ImageCrateLoader, ImageLoader, ImageUploader,
    NoopUploader, SessionStore, ThresholdSegmenter,
};
use crate::db::SqliteSessionStore;
use crate::grading::GradingEngine;

/// Collaborators used by one classification run
pub struct ServiceContainer {
    pub image_loader: Arc<dyn ImageLoader>,
    pub segmenter: Arc<dyn BeanSegmenter>,
    pub feature_extractor: Arc<dyn FeatureExtractor>,
    pub color_predictor: Arc<dyn ColorPredictor>,
    pub uploader: Arc<dyn ImageUploader>,
    pub store: Arc<dyn SessionStore>,
    pub grading: GradingEngine,
}

impl ServiceContainer {
    /// Default adapters configured from TOML (plus environment overrides)
    pub fn from_config(config: &TomlConfig, pool: SqlitePool) -> Result<Self, CollaboratorError> {
        let color_predictor = HttpColorPredictor::new(
            config.predictor.url.clone(),
            Duration::from_secs(config.predictor.timeout_seconds),
        )?;

        let uploader: Arc<dyn ImageUploader> = match &config.cloudinary {
            Some(cloudinary) => Arc::new(CloudinaryUploader::new(cloudinary.clone())?),
            None => {
                info!("Cloudinary not configured, grain images will not be stored");
                Arc::new(NoopUploader)
            }
        };

        Ok(Self {
            image_loader: Arc::new(ImageCrateLoader),
            segmenter: Arc::new(ThresholdSegmenter::default()),
            feature_extractor: Arc::new(ContourFeatureExtractor),
            color_predictor: Arc::new(color_predictor),
            uploader,
            store: Arc::new(SqliteSessionStore::new(pool)),
            grading: GradingEngine::new(&config.grading),
        })
    }
}
