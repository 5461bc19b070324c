//! Data models for cqm-classifier
//!
//! - Session state machine and per-bean analyses
//! - Grading value types and batch report
//! - Average quality summaries

pub mod grain_analysis;
pub mod quality;
pub mod session;
pub mod summary;

pub use grain_analysis::{GrainAnalysis, ImageReference};
pub use quality::{
    Adjustments, BatchReport, BeanFeatures, CategoryStats, ClassificationResult, ColorClass,
    ColorPercentages, QualityAssessment, QualityBreakdown, QualityCategory, SizeAdjustment,
    NO_PREDOMINANT_CATEGORY,
};
pub use session::{ClassificationSession, SessionError, SessionStatus, StateTransition};
pub use summary::{LotAverageQuality, OverallAverageQuality, QUALITY_SCALE};
