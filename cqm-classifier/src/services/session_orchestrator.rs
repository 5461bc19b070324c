//! Classification session orchestration
//!
//! One run: decode → segment → per bean (features → color prediction →
//! grading → image upload → analysis) → batch report → terminal state →
//! persist. Beans are processed strictly in order and every collaborator
//! call is awaited before the next one starts. Decoding, segmentation and
//! feature extraction run on the blocking thread pool.
//!
//! Any failure aborts the whole run. Errors never reach the caller: they end
//! up in the FAILED session's result, and the session is persisted exactly
//! once on both branches.

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::ServiceContainer;
use crate::collaborators::ModelInput;
use crate::models::{BatchReport, ClassificationSession, ImageReference, SessionError};

pub const MSG_IMAGE_NOT_LOADED: &str = "Could not load image";
pub const MSG_NO_BEANS: &str = "No beans detected in the image";
pub const MSG_PREDICTOR_UNAVAILABLE: &str = "Color predictor unavailable or prediction failed";

/// Reason a run was aborted
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The submitted image cannot be classified
    #[error("{0}")]
    InvalidInput(String),

    /// A collaborator failed
    #[error("{0}")]
    Dependency(String),

    #[error("{0}")]
    Session(#[from] SessionError),
}

/// Result of the pipeline, before the session's terminal transition
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed(BatchReport),
    Failed(PipelineError),
}

/// Drives classification runs
pub struct SessionOrchestrator {
    services: Arc<ServiceContainer>,
    /// Last persistence failure, reported by the health endpoint
    last_error: Arc<RwLock<Option<String>>>,
}

impl SessionOrchestrator {
    pub fn new(services: Arc<ServiceContainer>) -> Self {
        Self {
            services,
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Share an existing diagnostics slot (e.g. the application state's)
    pub fn with_last_error(mut self, last_error: Arc<RwLock<Option<String>>>) -> Self {
        self.last_error = last_error;
        self
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Classify the beans in one image
    ///
    /// Always returns a terminal session: COMPLETED with a batch report, or
    /// FAILED with the error message.
    pub async fn start_classification_session(
        &self,
        coffee_lot_id: i64,
        image_bytes: &[u8],
        user_id: i64,
    ) -> ClassificationSession {
        let started = Instant::now();
        let mut session = ClassificationSession::new(coffee_lot_id, user_id);

        info!(
            session_id = %session.session_id(),
            coffee_lot_id,
            user_id,
            image_bytes = image_bytes.len(),
            "Starting classification session"
        );

        let outcome = self.run_pipeline(&mut session, image_bytes).await;

        let transition = match outcome {
            PipelineOutcome::Completed(report) => {
                session.complete(report, started.elapsed().as_secs_f64())
            }
            PipelineOutcome::Failed(reason) => {
                error!(
                    session_id = %session.session_id(),
                    coffee_lot_id,
                    "Classification failed: {}",
                    reason
                );
                self.discard_uploads(&session).await;
                session.fail(reason.to_string())
            }
        };

        match transition {
            Ok(transition) => info!(
                session_id = %session.session_id(),
                status = %transition.new_status,
                grains = session.total_grains_analyzed(),
                processing_time_seconds = ?session.processing_time_seconds(),
                "Classification session finished"
            ),
            Err(e) => error!(session_id = %session.session_id(), "{}", e),
        }

        self.persist(&session).await;
        session
    }

    /// Run every stage, converting the first failure into an outcome
    pub async fn run_pipeline(
        &self,
        session: &mut ClassificationSession,
        image_bytes: &[u8],
    ) -> PipelineOutcome {
        match self.classify(session, image_bytes).await {
            Ok(report) => PipelineOutcome::Completed(report),
            Err(reason) => PipelineOutcome::Failed(reason),
        }
    }

    async fn classify(
        &self,
        session: &mut ClassificationSession,
        image_bytes: &[u8],
    ) -> Result<BatchReport, PipelineError> {
        let services = &self.services;
        let session_id = session.session_id();

        // Decoding and segmentation are CPU-bound: keep them off the runtime workers
        let loader = Arc::clone(&services.image_loader);
        let segmenter = Arc::clone(&services.segmenter);
        let bytes = image_bytes.to_vec();
        let beans = tokio::task::spawn_blocking(move || {
            loader.load(&bytes).map(|image| segmenter.segment(&image))
        })
        .await
        .map_err(|e| PipelineError::Dependency(format!("Segmentation task failed: {}", e)))?
        .ok_or_else(|| PipelineError::InvalidInput(MSG_IMAGE_NOT_LOADED.to_string()))?;

        if beans.is_empty() {
            return Err(PipelineError::InvalidInput(MSG_NO_BEANS.to_string()));
        }
        info!(session_id = %session_id, beans = beans.len(), "Beans segmented");

        // Storage folder shared by all beans of this run
        let session_tag = format!(
            "temp_{}_{}",
            chrono::Utc::now().timestamp(),
            session.coffee_lot_id()
        );

        let mut assessments = Vec::with_capacity(beans.len());

        for (bean_index, bean) in beans.into_iter().enumerate() {
            let extractor = Arc::clone(&services.feature_extractor);
            let (bean, features, input) = tokio::task::spawn_blocking(move || {
                let features = extractor.extract(&bean);
                let input = ModelInput::from_image(&bean.image);
                (bean, features, input)
            })
            .await
            .map_err(|e| {
                PipelineError::Dependency(format!(
                    "Feature extraction task failed for bean {}: {}",
                    bean_index, e
                ))
            })?;

            let features = features.map_err(|e| {
                PipelineError::Dependency(format!(
                    "Feature extraction failed for bean {}: {}",
                    bean_index, e
                ))
            })?;

            let colors = services
                .color_predictor
                .predict(&input)
                .await
                .ok_or_else(|| PipelineError::Dependency(MSG_PREDICTOR_UNAVAILABLE.to_string()))?;

            let color_class = colors.winning_class();
            let base_score = services.grading.base_score(color_class);
            let assessment = services.grading.score_bean(base_score, color_class, &features);

            debug!(
                session_id = %session_id,
                bean_index,
                color_class = %color_class,
                final_score = assessment.final_score,
                category = %assessment.quality_category,
                "Bean graded"
            );

            let upload = services
                .uploader
                .upload_grain_image(&bean.image, &session_tag, bean_index)
                .await;
            if !upload.is_uploaded() {
                warn!(
                    session_id = %session_id,
                    bean_index,
                    error = upload.error.as_deref().unwrap_or("unknown"),
                    "Grain image not stored, continuing without image"
                );
            }

            session.record_analysis(
                ImageReference {
                    url: upload.url,
                    public_id: upload.public_id,
                },
                colors,
                features,
                assessment.clone(),
            )?;
            assessments.push(assessment);
        }

        Ok(services.grading.aggregate_batch(&assessments))
    }

    /// Remove images uploaded before a failure; their analyses are dropped
    async fn discard_uploads(&self, session: &ClassificationSession) {
        for public_id in session.analyses().iter().filter_map(|a| a.storage_public_id()) {
            if !self.services.uploader.delete_image(public_id).await {
                warn!(
                    session_id = %session.session_id(),
                    public_id,
                    "Could not delete grain image of failed session"
                );
            }
        }
    }

    async fn persist(&self, session: &ClassificationSession) {
        if let Err(e) = self.services.store.save(session).await {
            let message = format!(
                "Failed to persist classification session {}: {}",
                session.session_id(),
                e
            );
            error!("{}", message);
            *self.last_error.write().await = Some(message);
        }
    }
}
