//! Per-bean analysis record owned by a classification session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quality::{BeanFeatures, ColorPercentages, QualityAssessment, QualityCategory};

/// Location of the uploaded bean image; both fields are `None` when the upload failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub url: Option<String>,
    pub public_id: Option<String>,
}

/// One bean's measurements and evaluation
///
/// Immutable once created. `final_score` and `final_category` are copied from
/// the quality assessment at construction and cannot diverge from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrainAnalysis {
    analysis_id: Uuid,
    session_id: Uuid,
    bean_index: usize,
    image_url: Option<String>,
    storage_public_id: Option<String>,
    color_percentages: ColorPercentages,
    features: BeanFeatures,
    quality_assessment: QualityAssessment,
    final_score: f64,
    final_category: QualityCategory,
    created_at: DateTime<Utc>,
}

impl GrainAnalysis {
    /// Only sessions create analyses
    pub(crate) fn new(
        session_id: Uuid,
        bean_index: usize,
        image: ImageReference,
        color_percentages: ColorPercentages,
        features: BeanFeatures,
        quality_assessment: QualityAssessment,
    ) -> Self {
        Self::restore(
            cqm_common::uuid_utils::generate(),
            session_id,
            bean_index,
            image,
            color_percentages,
            features,
            quality_assessment,
            cqm_common::time::now(),
        )
    }

    /// Rebuild a stored analysis
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        analysis_id: Uuid,
        session_id: Uuid,
        bean_index: usize,
        image: ImageReference,
        color_percentages: ColorPercentages,
        features: BeanFeatures,
        quality_assessment: QualityAssessment,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            analysis_id,
            session_id,
            bean_index,
            image_url: image.url,
            storage_public_id: image.public_id,
            color_percentages,
            features,
            final_score: quality_assessment.final_score,
            final_category: quality_assessment.quality_category,
            quality_assessment,
            created_at,
        }
    }

    pub fn analysis_id(&self) -> Uuid {
        self.analysis_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Position of the bean in processing order
    pub fn bean_index(&self) -> usize {
        self.bean_index
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn storage_public_id(&self) -> Option<&str> {
        self.storage_public_id.as_deref()
    }

    pub fn color_percentages(&self) -> &ColorPercentages {
        &self.color_percentages
    }

    pub fn features(&self) -> &BeanFeatures {
        &self.features
    }

    pub fn quality_assessment(&self) -> &QualityAssessment {
        &self.quality_assessment
    }

    pub fn final_score(&self) -> f64 {
        self.final_score
    }

    pub fn final_category(&self) -> QualityCategory {
        self.final_category
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
