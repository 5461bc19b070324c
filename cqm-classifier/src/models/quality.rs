//! Grading value types
//!
//! Color classes, quality categories, morphological features, per-bean
//! assessments and the batch report persisted as `classification_result`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Color class predicted for a bean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorClass {
    Light,
    Medium,
    Dark,
    Green,
}

impl ColorClass {
    /// Canonical order, also the predictor's output order
    pub const ALL: [ColorClass; 4] = [
        ColorClass::Light,
        ColorClass::Medium,
        ColorClass::Dark,
        ColorClass::Green,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorClass::Light => "Light",
            ColorClass::Medium => "Medium",
            ColorClass::Dark => "Dark",
            ColorClass::Green => "Green",
        }
    }
}

impl fmt::Display for ColorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted percentage for each of the four color classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorPercentages {
    #[serde(rename = "Light")]
    pub light: f64,
    #[serde(rename = "Medium")]
    pub medium: f64,
    #[serde(rename = "Dark")]
    pub dark: f64,
    #[serde(rename = "Green")]
    pub green: f64,
}

impl ColorPercentages {
    /// Negative inputs are clamped to zero
    pub fn new(light: f64, medium: f64, dark: f64, green: f64) -> Self {
        Self {
            light: light.max(0.0),
            medium: medium.max(0.0),
            dark: dark.max(0.0),
            green: green.max(0.0),
        }
    }

    /// Build from raw model probabilities in [`ColorClass::ALL`] order
    ///
    /// Probabilities are rounded to 3 decimals and rescaled to sum to 100.
    /// Returns `None` unless exactly four finite values are given.
    pub fn from_probabilities(raw: &[f32]) -> Option<Self> {
        if raw.len() != ColorClass::ALL.len() || raw.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let rounded: Vec<f64> = raw
            .iter()
            .map(|v| ((*v as f64) * 1000.0).round() / 1000.0)
            .collect();
        let total: f64 = rounded.iter().sum();
        let scaled: Vec<f64> = if total > 0.0 {
            rounded.iter().map(|v| v / total * 100.0).collect()
        } else {
            rounded
        };

        Some(Self::new(scaled[0], scaled[1], scaled[2], scaled[3]))
    }

    pub fn get(&self, class: ColorClass) -> f64 {
        match class {
            ColorClass::Light => self.light,
            ColorClass::Medium => self.medium,
            ColorClass::Dark => self.dark,
            ColorClass::Green => self.green,
        }
    }

    /// Class with the highest percentage; ties go to the earlier class in canonical order
    pub fn winning_class(&self) -> ColorClass {
        let mut winner = ColorClass::ALL[0];
        for class in ColorClass::ALL.iter().skip(1) {
            if self.get(*class) > self.get(winner) {
                winner = *class;
            }
        }
        winner
    }

    pub fn total(&self) -> f64 {
        ColorClass::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// Quality grade, ordered from highest to lowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityCategory {
    Specialty,
    Premium,
    A,
    B,
    C,
}

impl QualityCategory {
    pub const ALL: [QualityCategory; 5] = [
        QualityCategory::Specialty,
        QualityCategory::Premium,
        QualityCategory::A,
        QualityCategory::B,
        QualityCategory::C,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityCategory::Specialty => "Specialty",
            QualityCategory::Premium => "Premium",
            QualityCategory::A => "A",
            QualityCategory::B => "B",
            QualityCategory::C => "C",
        }
    }
}

impl fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Morphological measurements of one bean
///
/// `has_cracks` is carried as the text "True"/"False" exactly as the feature
/// extractor produces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeanFeatures {
    /// Contour area in pixels²
    pub area: f64,
    /// Contour perimeter in pixels
    pub perimeter: f64,
    /// 4πA/P², 1.0 for a perfect circle
    pub circularity: f64,
    pub has_cracks: String,
}

impl BeanFeatures {
    pub fn crack_flag(has_cracks: bool) -> String {
        let flag = if has_cracks { "True" } else { "False" };
        flag.to_string()
    }
}

/// Size adjustment; penalty and bonus are mutually exclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeAdjustment {
    Penalty(f64),
    Bonus(f64),
}

/// Score adjustments applied to a bean, present only when triggered
///
/// Serialized as a map with the keys `shape_penalty`, `size_penalty` and
/// `size_bonus`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "AdjustmentsRepr", into = "AdjustmentsRepr")]
pub struct Adjustments {
    pub shape_penalty: Option<f64>,
    pub size: Option<SizeAdjustment>,
}

impl Adjustments {
    pub fn total(&self) -> f64 {
        let size = match self.size {
            Some(SizeAdjustment::Penalty(v)) | Some(SizeAdjustment::Bonus(v)) => v,
            None => 0.0,
        };
        self.shape_penalty.unwrap_or(0.0) + size
    }

    pub fn is_empty(&self) -> bool {
        self.shape_penalty.is_none() && self.size.is_none()
    }

    pub fn size_penalty(&self) -> Option<f64> {
        match self.size {
            Some(SizeAdjustment::Penalty(v)) => Some(v),
            _ => None,
        }
    }

    pub fn size_bonus(&self) -> Option<f64> {
        match self.size {
            Some(SizeAdjustment::Bonus(v)) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct AdjustmentsRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size_bonus: Option<f64>,
}

impl From<AdjustmentsRepr> for Adjustments {
    fn from(repr: AdjustmentsRepr) -> Self {
        let size = match (repr.size_penalty, repr.size_bonus) {
            (Some(v), _) => Some(SizeAdjustment::Penalty(v)),
            (None, Some(v)) => Some(SizeAdjustment::Bonus(v)),
            (None, None) => None,
        };
        Self {
            shape_penalty: repr.shape_penalty,
            size,
        }
    }
}

impl From<Adjustments> for AdjustmentsRepr {
    fn from(adjustments: Adjustments) -> Self {
        Self {
            shape_penalty: adjustments.shape_penalty,
            size_penalty: adjustments.size_penalty(),
            size_bonus: adjustments.size_bonus(),
        }
    }
}

/// Per-bean grading output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub base_score: f64,
    pub adjustments: Adjustments,
    /// Clamped to [0, 1]
    pub final_score: f64,
    pub quality_category: QualityCategory,
    pub color_class: ColorClass,
}

/// Count and share of one category within a batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: usize,
    /// count / total * 100
    pub percentage: f64,
}

/// Coarse quality buckets over the five categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityBreakdown {
    /// Specialty + Premium
    pub excellent: usize,
    /// A
    pub good: usize,
    /// B
    pub fair: usize,
    /// C
    pub poor: usize,
}

/// Placeholder predominant category of an empty batch
pub const NO_PREDOMINANT_CATEGORY: &str = "N/A";

/// Aggregate statistics over all beans of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_beans_analyzed: usize,
    /// Average score scaled to 0-100, 2 decimals
    pub overall_batch_quality: f64,
    /// Category name, or "N/A" for an empty batch
    pub predominant_category: String,
    pub category_distribution: BTreeMap<QualityCategory, CategoryStats>,
    /// Mean final score, 4 decimals
    pub average_score: f64,
    pub quality_breakdown: QualityBreakdown,
}

/// Persisted `classification_result`: a batch report or a failure message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassificationResult {
    Report(BatchReport),
    Failure { error: String },
}

impl ClassificationResult {
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            ClassificationResult::Report(report) => Some(report),
            ClassificationResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ClassificationResult::Report(_) => None,
            ClassificationResult::Failure { error } => Some(error),
        }
    }
}
