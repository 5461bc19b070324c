//! Classification session state machine
//!
//! A session starts in PROCESSING and moves exactly once to COMPLETED or
//! FAILED. Terminal sessions reject any further transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::grain_analysis::{GrainAnalysis, ImageReference};
use super::quality::{
    BatchReport, BeanFeatures, ClassificationResult, ColorPercentages, QualityAssessment,
};

/// Classification session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Pipeline running, no report yet
    Processing,
    /// All beans graded and aggregated
    Completed,
    /// Run aborted; result carries the error message
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Processing => "PROCESSING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(SessionStatus::Processing),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "FAILED" => Ok(SessionStatus::Failed),
            other => Err(format!("Unknown session status: {}", other)),
        }
    }
}

/// Rejected state machine operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session {session_id} already {status}")]
    AlreadyTerminal {
        session_id: Uuid,
        status: SessionStatus,
    },
}

/// Status change record, used for logging
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_status: SessionStatus,
    pub new_status: SessionStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One classification run
///
/// Fields are private so the invariants hold: `classification_result` is set
/// iff the status is terminal, and `total_grains_analyzed` matches the stored
/// analyses once terminal.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationSession {
    session_id: Uuid,
    coffee_lot_id: i64,
    user_id: i64,
    status: SessionStatus,
    classification_result: Option<ClassificationResult>,
    total_grains_analyzed: usize,
    processing_time_seconds: Option<f64>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    analyses: Vec<GrainAnalysis>,
}

impl ClassificationSession {
    /// Create a new in-memory session in PROCESSING
    pub fn new(coffee_lot_id: i64, user_id: i64) -> Self {
        Self {
            session_id: cqm_common::uuid_utils::generate(),
            coffee_lot_id,
            user_id,
            status: SessionStatus::Processing,
            classification_result: None,
            total_grains_analyzed: 0,
            processing_time_seconds: None,
            created_at: cqm_common::time::now(),
            completed_at: None,
            analyses: Vec::new(),
        }
    }

    /// Rebuild a stored session
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        session_id: Uuid,
        coffee_lot_id: i64,
        user_id: i64,
        status: SessionStatus,
        classification_result: Option<ClassificationResult>,
        total_grains_analyzed: usize,
        processing_time_seconds: Option<f64>,
        created_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        analyses: Vec<GrainAnalysis>,
    ) -> Self {
        Self {
            session_id,
            coffee_lot_id,
            user_id,
            status,
            classification_result,
            total_grains_analyzed,
            processing_time_seconds,
            created_at,
            completed_at,
            analyses,
        }
    }

    /// Append the analysis of the next bean
    ///
    /// The bean index is the current number of analyses, so insertion order
    /// is processing order.
    pub fn record_analysis(
        &mut self,
        image: ImageReference,
        color_percentages: ColorPercentages,
        features: BeanFeatures,
        quality_assessment: QualityAssessment,
    ) -> Result<&GrainAnalysis, SessionError> {
        self.ensure_processing()?;

        let analysis = GrainAnalysis::new(
            self.session_id,
            self.analyses.len(),
            image,
            color_percentages,
            features,
            quality_assessment,
        );
        self.analyses.push(analysis);

        // Just pushed
        Ok(&self.analyses[self.analyses.len() - 1])
    }

    /// Transition to COMPLETED with the batch report
    pub fn complete(
        &mut self,
        report: BatchReport,
        processing_time_seconds: f64,
    ) -> Result<StateTransition, SessionError> {
        self.ensure_processing()?;

        self.classification_result = Some(ClassificationResult::Report(report));
        self.total_grains_analyzed = self.analyses.len();
        self.processing_time_seconds = Some(processing_time_seconds);
        Ok(self.transition_to(SessionStatus::Completed))
    }

    /// Transition to FAILED, dropping any analyses appended so far
    pub fn fail(
        &mut self,
        error_message: impl Into<String>,
    ) -> Result<StateTransition, SessionError> {
        self.ensure_processing()?;

        self.classification_result = Some(ClassificationResult::Failure {
            error: error_message.into(),
        });
        self.analyses.clear();
        self.total_grains_analyzed = 0;
        Ok(self.transition_to(SessionStatus::Failed))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_processing(&self) -> Result<(), SessionError> {
        if self.is_terminal() {
            return Err(SessionError::AlreadyTerminal {
                session_id: self.session_id,
                status: self.status,
            });
        }
        Ok(())
    }

    fn transition_to(&mut self, new_status: SessionStatus) -> StateTransition {
        let now = cqm_common::time::now();
        let transition = StateTransition {
            session_id: self.session_id,
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        self.status = new_status;
        if new_status.is_terminal() {
            self.completed_at = Some(now);
        }
        transition
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn coffee_lot_id(&self) -> i64 {
        self.coffee_lot_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn classification_result(&self) -> Option<&ClassificationResult> {
        self.classification_result.as_ref()
    }

    /// Batch report of a completed session
    pub fn report(&self) -> Option<&BatchReport> {
        self.classification_result.as_ref().and_then(|r| r.report())
    }

    /// Error message of a failed session
    pub fn error_message(&self) -> Option<&str> {
        self.classification_result.as_ref().and_then(|r| r.error())
    }

    pub fn total_grains_analyzed(&self) -> usize {
        self.total_grains_analyzed
    }

    pub fn processing_time_seconds(&self) -> Option<f64> {
        self.processing_time_seconds
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Analyses in processing order
    pub fn analyses(&self) -> &[GrainAnalysis] {
        &self.analyses
    }
}
