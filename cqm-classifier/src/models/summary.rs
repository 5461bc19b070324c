//! Average quality summaries over stored analyses

use serde::{Deserialize, Serialize};

/// Scale label reported alongside average quality percentages
pub const QUALITY_SCALE: &str = "0-100%";

/// Average final score of one coffee lot, as a percentage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotAverageQuality {
    pub coffee_lot_id: i64,
    pub average_quality_percentage: f64,
    pub total_grains_analyzed: i64,
    pub quality_scale: String,
}

/// Average final score across every analysed bean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallAverageQuality {
    pub average_quality_percentage: f64,
    pub total_grains_analyzed: i64,
    /// Distinct coffee lots with at least one analysis
    pub total_coffee_lots: i64,
    pub quality_scale: String,
}
