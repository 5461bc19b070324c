//! Contour-based morphological feature extraction

use std::f64::consts::PI;

use super::{CollaboratorError, FeatureExtractor, SegmentedBean};
use crate::models::BeanFeatures;

/// Pixels darker than this fraction of the bean's mean luma count as crack pixels
const CRACK_LUMA_FACTOR: f64 = 0.5;

/// Share of crack pixels above which the bean is flagged as cracked
const CRACK_RATIO_THRESHOLD: f64 = 0.03;

/// Area and perimeter from the contour, circularity 4πA/P², crack flag from
/// unusually dark pixels inside the contour
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourFeatureExtractor;

impl FeatureExtractor for ContourFeatureExtractor {
    fn extract(&self, bean: &SegmentedBean) -> Result<BeanFeatures, CollaboratorError> {
        let area = bean.contour.area();
        let perimeter = bean.contour.perimeter();
        if area <= 0.0 || perimeter <= 0.0 {
            return Err(CollaboratorError::InvalidInput(format!(
                "Degenerate bean contour ({} points)",
                bean.contour.len()
            )));
        }

        let circularity = (4.0 * PI * area / (perimeter * perimeter)).min(1.0);

        Ok(BeanFeatures {
            area,
            perimeter,
            circularity,
            has_cracks: BeanFeatures::crack_flag(has_cracks(bean)),
        })
    }
}

fn has_cracks(bean: &SegmentedBean) -> bool {
    let (width, height) = bean.image.dimensions();
    let inside = bean.contour.interior_mask(width, height);

    let lumas: Vec<f64> = bean
        .image
        .pixels()
        .zip(inside)
        .filter(|(_, inside)| *inside)
        .map(|(p, _)| 0.299 * p.0[0] as f64 + 0.587 * p.0[1] as f64 + 0.114 * p.0[2] as f64)
        .collect();

    if lumas.is_empty() {
        return false;
    }

    let mean = lumas.iter().sum::<f64>() / lumas.len() as f64;
    let dark = lumas
        .iter()
        .filter(|l| **l < mean * CRACK_LUMA_FACTOR)
        .count();

    dark as f64 / lumas.len() as f64 > CRACK_RATIO_THRESHOLD
}
