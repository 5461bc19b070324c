//! Bean grading and batch aggregation
//!
//! Pure scoring: a bean's base score comes from its winning color class, then
//! shape and size adjustments are added and the result is clamped to [0, 1].
//! A batch report aggregates the per-bean assessments of one session.

use cqm_common::config::{BaseScores, GradeThresholds, GradingConfig};
use std::collections::BTreeMap;

use crate::models::{
    Adjustments, BatchReport, BeanFeatures, CategoryStats, ColorClass, QualityAssessment,
    QualityBreakdown, QualityCategory, SizeAdjustment, NO_PREDOMINANT_CATEGORY,
};

/// Beans below this circularity get the shape penalty
pub const MIN_CIRCULARITY: f64 = 0.7;
pub const SHAPE_PENALTY: f64 = -0.05;

/// Beans below this area (pixels²) get the size penalty
pub const SMALL_BEAN_AREA: f64 = 500.0;
pub const SIZE_PENALTY: f64 = -0.03;

/// Beans above this area (pixels²) get the size bonus
pub const LARGE_BEAN_AREA: f64 = 2000.0;
pub const SIZE_BONUS: f64 = 0.02;

/// Grading engine holding the base score table and category thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingEngine {
    base_scores: BaseScores,
    thresholds: GradeThresholds,
}

impl Default for GradingEngine {
    fn default() -> Self {
        Self::new(&GradingConfig::default())
    }
}

impl GradingEngine {
    /// Build from (already validated) grading configuration
    pub fn new(config: &GradingConfig) -> Self {
        Self {
            base_scores: config.base_scores,
            thresholds: config.thresholds,
        }
    }

    /// Base score assigned to a winning color class
    pub fn base_score(&self, class: ColorClass) -> f64 {
        match class {
            ColorClass::Light => self.base_scores.light,
            ColorClass::Medium => self.base_scores.medium,
            ColorClass::Dark => self.base_scores.dark,
            ColorClass::Green => self.base_scores.green,
        }
    }

    /// Score one bean
    ///
    /// Adjustments are independent and additive; each is recorded only when
    /// triggered. The final score is clamped to [0, 1].
    pub fn score_bean(
        &self,
        base_score: f64,
        color_class: ColorClass,
        features: &BeanFeatures,
    ) -> QualityAssessment {
        let shape_penalty = (features.circularity < MIN_CIRCULARITY).then_some(SHAPE_PENALTY);

        let size = if features.area < SMALL_BEAN_AREA {
            Some(SizeAdjustment::Penalty(SIZE_PENALTY))
        } else if features.area > LARGE_BEAN_AREA {
            Some(SizeAdjustment::Bonus(SIZE_BONUS))
        } else {
            None
        };

        let adjustments = Adjustments {
            shape_penalty,
            size,
        };
        let final_score = (base_score + adjustments.total()).clamp(0.0, 1.0);

        QualityAssessment {
            base_score,
            adjustments,
            final_score,
            quality_category: self.category_for(final_score),
            color_class,
        }
    }

    /// Map a score to its category; a score equal to a threshold gets the higher grade
    pub fn category_for(&self, score: f64) -> QualityCategory {
        let t = &self.thresholds;
        if score >= t.specialty {
            QualityCategory::Specialty
        } else if score >= t.premium {
            QualityCategory::Premium
        } else if score >= t.a {
            QualityCategory::A
        } else if score >= t.b {
            QualityCategory::B
        } else {
            QualityCategory::C
        }
    }

    /// Aggregate per-bean assessments into a batch report
    pub fn aggregate_batch(&self, assessments: &[QualityAssessment]) -> BatchReport {
        if assessments.is_empty() {
            return BatchReport {
                total_beans_analyzed: 0,
                overall_batch_quality: 0.0,
                predominant_category: NO_PREDOMINANT_CATEGORY.to_string(),
                category_distribution: BTreeMap::new(),
                average_score: 0.0,
                quality_breakdown: QualityBreakdown::default(),
            };
        }

        let total = assessments.len();
        let average = assessments.iter().map(|a| a.final_score).sum::<f64>() / total as f64;

        // Tally in first-seen order so ties resolve to the earliest processed bean
        let mut tally: Vec<(QualityCategory, usize)> = Vec::new();
        for assessment in assessments {
            match tally
                .iter_mut()
                .find(|(category, _)| *category == assessment.quality_category)
            {
                Some((_, count)) => *count += 1,
                None => tally.push((assessment.quality_category, 1)),
            }
        }

        let mut predominant = tally[0];
        for entry in tally.iter().skip(1) {
            if entry.1 > predominant.1 {
                predominant = *entry;
            }
        }

        let count_of = |category: QualityCategory| -> usize {
            tally
                .iter()
                .find(|(c, _)| *c == category)
                .map(|(_, count)| *count)
                .unwrap_or(0)
        };

        let category_distribution = QualityCategory::ALL
            .iter()
            .map(|category| {
                let count = count_of(*category);
                let stats = CategoryStats {
                    count,
                    percentage: count as f64 / total as f64 * 100.0,
                };
                (*category, stats)
            })
            .collect();

        let quality_breakdown = QualityBreakdown {
            excellent: count_of(QualityCategory::Specialty) + count_of(QualityCategory::Premium),
            good: count_of(QualityCategory::A),
            fair: count_of(QualityCategory::B),
            poor: count_of(QualityCategory::C),
        };

        BatchReport {
            total_beans_analyzed: total,
            overall_batch_quality: round_to(average * 100.0, 2),
            predominant_category: predominant.0.to_string(),
            category_distribution,
            average_score: round_to(average, 4),
            quality_breakdown,
        }
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(area: f64, circularity: f64) -> BeanFeatures {
        BeanFeatures {
            area,
            perimeter: 150.0,
            circularity,
            has_cracks: BeanFeatures::crack_flag(false),
        }
    }

    fn assessment(score: f64, category: QualityCategory) -> QualityAssessment {
        QualityAssessment {
            base_score: score,
            adjustments: Adjustments::default(),
            final_score: score,
            quality_category: category,
            color_class: ColorClass::Medium,
        }
    }

    #[test]
    fn test_base_score_table() {
        let engine = GradingEngine::default();
        assert_eq!(engine.base_score(ColorClass::Light), 0.95);
        assert_eq!(engine.base_score(ColorClass::Medium), 0.85);
        assert_eq!(engine.base_score(ColorClass::Dark), 0.45);
        assert_eq!(engine.base_score(ColorClass::Green), 0.35);
    }

    #[test]
    fn test_regular_bean_has_no_adjustments() {
        let engine = GradingEngine::default();
        let result = engine.score_bean(0.95, ColorClass::Light, &features(1500.0, 0.85));

        assert!(result.adjustments.is_empty());
        assert_eq!(result.final_score, 0.95);
        assert_eq!(result.quality_category, QualityCategory::Specialty);
        assert_eq!(result.color_class, ColorClass::Light);
    }

    #[test]
    fn test_irregular_small_bean_penalized() {
        let engine = GradingEngine::default();
        let result = engine.score_bean(0.85, ColorClass::Medium, &features(400.0, 0.5));

        assert_eq!(result.adjustments.shape_penalty, Some(SHAPE_PENALTY));
        assert_eq!(result.adjustments.size_penalty(), Some(SIZE_PENALTY));
        assert!(result.adjustments.size_bonus().is_none());
        assert!((result.final_score - 0.77).abs() < 1e-9);
        assert_eq!(result.quality_category, QualityCategory::A);
    }

    #[test]
    fn test_large_bean_bonus_clamped() {
        let engine = GradingEngine::default();
        let result = engine.score_bean(0.99, ColorClass::Light, &features(2500.0, 0.9));

        assert_eq!(result.adjustments.size_bonus(), Some(SIZE_BONUS));
        assert!(result.adjustments.size_penalty().is_none());
        assert_eq!(result.final_score, 1.0);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let engine = GradingEngine::default();
        let result = engine.score_bean(0.02, ColorClass::Green, &features(100.0, 0.2));
        assert_eq!(result.final_score, 0.0);
        assert_eq!(result.quality_category, QualityCategory::C);
    }

    #[test]
    fn test_boundary_values_not_adjusted() {
        let engine = GradingEngine::default();
        let lower = engine.score_bean(0.85, ColorClass::Medium, &features(500.0, 0.7));
        let upper = engine.score_bean(0.85, ColorClass::Medium, &features(2000.0, 0.7));
        assert!(lower.adjustments.is_empty());
        assert!(upper.adjustments.is_empty());
    }

    #[test]
    fn test_category_thresholds_inclusive() {
        let engine = GradingEngine::default();
        assert_eq!(engine.category_for(0.9), QualityCategory::Specialty);
        assert_eq!(engine.category_for(0.8999), QualityCategory::Premium);
        assert_eq!(engine.category_for(0.8), QualityCategory::Premium);
        assert_eq!(engine.category_for(0.7), QualityCategory::A);
        assert_eq!(engine.category_for(0.6), QualityCategory::B);
        assert_eq!(engine.category_for(0.5999), QualityCategory::C);
        assert_eq!(engine.category_for(0.0), QualityCategory::C);
    }

    #[test]
    fn test_custom_thresholds() {
        let mut config = GradingConfig::default();
        config.thresholds.specialty = 0.95;
        let engine = GradingEngine::new(&config);
        assert_eq!(engine.category_for(0.92), QualityCategory::Premium);
    }

    #[test]
    fn test_empty_batch_report() {
        let report = GradingEngine::default().aggregate_batch(&[]);
        assert_eq!(report.total_beans_analyzed, 0);
        assert_eq!(report.overall_batch_quality, 0.0);
        assert_eq!(report.average_score, 0.0);
        assert_eq!(report.predominant_category, "N/A");
        assert!(report.category_distribution.is_empty());
        assert_eq!(report.quality_breakdown, QualityBreakdown::default());
    }

    #[test]
    fn test_batch_report_distribution_and_breakdown() {
        let assessments = vec![
            assessment(0.95, QualityCategory::Specialty),
            assessment(0.85, QualityCategory::Premium),
            assessment(0.85, QualityCategory::Premium),
            assessment(0.45, QualityCategory::C),
        ];
        let report = GradingEngine::default().aggregate_batch(&assessments);

        assert_eq!(report.total_beans_analyzed, 4);
        assert_eq!(report.predominant_category, "Premium");
        assert_eq!(report.category_distribution.len(), 5);
        assert_eq!(report.category_distribution[&QualityCategory::Premium].count, 2);
        assert_eq!(report.category_distribution[&QualityCategory::A].count, 0);

        let percentage_sum: f64 = report
            .category_distribution
            .values()
            .map(|s| s.percentage)
            .sum();
        assert!((percentage_sum - 100.0).abs() < 1e-9);

        assert_eq!(report.average_score, 0.775);
        assert_eq!(report.overall_batch_quality, 77.5);
        assert_eq!(
            report.quality_breakdown,
            QualityBreakdown {
                excellent: 3,
                good: 0,
                fair: 0,
                poor: 1,
            }
        );
    }

    #[test]
    fn test_predominant_tie_goes_to_first_processed() {
        let assessments = vec![
            assessment(0.45, QualityCategory::C),
            assessment(0.95, QualityCategory::Specialty),
            assessment(0.95, QualityCategory::Specialty),
            assessment(0.45, QualityCategory::C),
        ];
        let report = GradingEngine::default().aggregate_batch(&assessments);
        assert_eq!(report.predominant_category, "C");
    }

    #[test]
    fn test_overall_quality_uses_unrounded_average() {
        let assessments = vec![
            assessment(0.87654, QualityCategory::Premium),
            assessment(0.87654, QualityCategory::Premium),
        ];
        let report = GradingEngine::default().aggregate_batch(&assessments);
        assert_eq!(report.average_score, 0.8765);
        assert_eq!(report.overall_batch_quality, 87.65);
        assert!((report.overall_batch_quality - report.average_score * 100.0).abs() < 0.1);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.123456, 4), 0.1235);
        assert_eq!(round_to(77.499, 2), 77.5);
    }
}
