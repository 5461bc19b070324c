//! Collaborator traits and shared types for the classification pipeline
//!
//! The pipeline only depends on these traits. CPU-bound steps (decoding,
//! segmentation, feature extraction) are synchronous; steps that reach a
//! remote service (color prediction, image upload, persistence) are async.
//!
//! # Default adapters
//! - [`image_loader::ImageCrateLoader`]: decodes JPEG/PNG bytes
//! - [`segmenter::ThresholdSegmenter`]: Otsu threshold + connected components
//! - [`features::ContourFeatureExtractor`]: contour area, perimeter, cracks
//! - [`color_predictor::HttpColorPredictor`]: JSON inference client
//! - [`cloudinary::CloudinaryUploader`] / [`cloudinary::NoopUploader`]
//! - [`crate::db::SqliteSessionStore`]: session persistence

pub mod cloudinary;
pub mod color_predictor;
pub mod features;
pub mod image_loader;
pub mod segmenter;

use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use thiserror::Error;

use crate::models::{BeanFeatures, ClassificationSession, ColorPercentages};

pub use cloudinary::{CloudinaryUploader, NoopUploader};
pub use color_predictor::HttpColorPredictor;
pub use features::ContourFeatureExtractor;
pub use image_loader::ImageCrateLoader;
pub use segmenter::ThresholdSegmenter;

/// Side length of the square color model input
pub const MODEL_INPUT_SIZE: u32 = 224;

/// Collaborator failure
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Input cannot be processed (degenerate contour, empty crop)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Adapter could not be constructed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP transport failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote service answered with an unusable response
    #[error("Service error: {0}")]
    Service(String),

    /// Image encoding failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Pixel coordinate in a bean image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Closed outline of one bean, in the coordinates of its cropped image
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Enclosed area (shoelace formula)
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let twice: i64 = self
            .edges()
            .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
            .sum();
        (twice as f64 / 2.0).abs()
    }

    /// Closed perimeter length
    pub fn perimeter(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        self.edges()
            .map(|(a, b)| {
                let dx = (b.x - a.x) as f64;
                let dy = (b.y - a.y) as f64;
                (dx * dx + dy * dy).sqrt()
            })
            .sum()
    }

    /// Point-in-polygon test (ray casting), for pixel centers
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        for (a, b) in self.edges() {
            let (ax, ay) = (a.x as f64, a.y as f64);
            let (bx, by) = (b.x as f64, b.y as f64);
            if (ay > y) != (by > y) {
                let cross_x = ax + (y - ay) * (bx - ax) / (by - ay);
                if x < cross_x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Row-major mask of the `width`×`height` pixels whose centers are inside
    ///
    /// Scanline fill with the crossing rule of [`Contour::contains`], one
    /// pass over the edges per row.
    pub fn interior_mask(&self, width: u32, height: u32) -> Vec<bool> {
        let (w, h) = (width as usize, height as usize);
        let mut mask = vec![false; w * h];
        if self.points.len() < 3 {
            return mask;
        }

        let mut crossings: Vec<f64> = Vec::new();
        for y in 0..h {
            let yf = y as f64;
            crossings.clear();
            for (a, b) in self.edges() {
                let (ay, by) = (a.y as f64, b.y as f64);
                if (ay > yf) != (by > yf) {
                    let (ax, bx) = (a.x as f64, b.x as f64);
                    crossings.push(ax + (yf - ay) * (bx - ax) / (by - ay));
                }
            }
            crossings.sort_by(f64::total_cmp);

            // Inside between each pair of crossings: x >= enter && x < exit
            let row = &mut mask[y * w..(y + 1) * w];
            for pair in crossings.chunks_exact(2) {
                let start = pair[0].ceil().clamp(0.0, w as f64) as usize;
                let end = pair[1].ceil().clamp(0.0, w as f64) as usize;
                if start < end {
                    row[start..end].fill(true);
                }
            }
        }

        mask
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }
}

/// One bean cut out of the source image
#[derive(Debug, Clone)]
pub struct SegmentedBean {
    pub image: RgbImage,
    pub contour: Contour,
}

/// Color model input: 224×224 RGB, channels normalized to [0, 1], row-major HWC
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    data: Vec<f32>,
}

impl ModelInput {
    /// Resize a bean image to the model size and normalize it
    pub fn from_image(image: &RgbImage) -> Self {
        let resized = image::imageops::resize(
            image,
            MODEL_INPUT_SIZE,
            MODEL_INPUT_SIZE,
            FilterType::Triangle,
        );
        let data = resized
            .as_raw()
            .iter()
            .map(|v| *v as f32 / 255.0)
            .collect();
        Self { data }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Nested `[height][width][channel]` form for JSON inference requests
    pub fn to_nested(&self) -> Vec<Vec<Vec<f32>>> {
        let side = MODEL_INPUT_SIZE as usize;
        self.data
            .chunks(side * 3)
            .map(|row| row.chunks(3).map(|px| px.to_vec()).collect())
            .collect()
    }
}

/// Outcome of a bean image upload; both fields are `None` on failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    pub url: Option<String>,
    pub public_id: Option<String>,
    pub error: Option<String>,
}

impl UploadResult {
    pub fn uploaded(url: String, public_id: String) -> Self {
        Self {
            url: Some(url),
            public_id: Some(public_id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            url: None,
            public_id: None,
            error: Some(error.into()),
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.url.is_some()
    }
}

/// Decodes raw request bytes into an RGB image
pub trait ImageLoader: Send + Sync {
    /// `None` when the bytes are not a decodable image
    fn load(&self, bytes: &[u8]) -> Option<RgbImage>;
}

/// Finds individual beans in a decoded image
pub trait BeanSegmenter: Send + Sync {
    /// Beans in detection order; empty when none are found
    fn segment(&self, image: &RgbImage) -> Vec<SegmentedBean>;
}

/// Measures one segmented bean
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, bean: &SegmentedBean) -> Result<BeanFeatures, CollaboratorError>;
}

/// Predicts the color class distribution of one bean
#[async_trait]
pub trait ColorPredictor: Send + Sync {
    /// Percentages over Light/Medium/Dark/Green, `None` when unavailable
    async fn predict(&self, input: &ModelInput) -> Option<ColorPercentages>;
}

/// Stores bean images in remote storage
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Upload one bean image; never fails, errors are reported in the result
    async fn upload_grain_image(
        &self,
        image: &RgbImage,
        session_tag: &str,
        bean_index: usize,
    ) -> UploadResult;

    /// Remove a previously uploaded image; `true` when the store confirmed it
    async fn delete_image(&self, public_id: &str) -> bool;
}

/// Persists finished sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &ClassificationSession) -> cqm_common::Result<()>;
}
