//! cqm-classifier library interface
//!
//! Coffee bean quality classification: segmentation, per-bean grading and
//! batch reports, exposed over HTTP.

pub mod api;
pub mod collaborators;
pub mod db;
pub mod error;
pub mod grading;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::{ClassificationQueries, ServiceContainer, SessionOrchestrator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Classification run driver
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Read side over stored sessions
    pub queries: ClassificationQueries,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes, shared with the orchestrator
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, services: Arc<ServiceContainer>) -> Self {
        let last_error = Arc::new(RwLock::new(None));
        let orchestrator =
            SessionOrchestrator::new(services).with_last_error(Arc::clone(&last_error));

        Self {
            queries: ClassificationQueries::new(db),
            orchestrator: Arc::new(orchestrator),
            startup_time: Utc::now(),
            last_error,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::classification_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
