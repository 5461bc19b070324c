//! Fake collaborators with scripted behavior and call recording

use async_trait::async_trait;
use cqm_classifier::collaborators::{
    BeanSegmenter, CollaboratorError, ColorPredictor, Contour, FeatureExtractor, ImageLoader,
    ImageUploader, ModelInput, Point, SegmentedBean, SessionStore, UploadResult,
};
use cqm_classifier::grading::GradingEngine;
use cqm_classifier::models::{BeanFeatures, ClassificationSession, ColorPercentages};
use cqm_classifier::services::ServiceContainer;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns a fixed image, or `None` to simulate undecodable bytes
pub struct FakeLoader {
    pub image: Option<RgbImage>,
}

impl FakeLoader {
    pub fn decodable() -> Self {
        Self {
            image: Some(RgbImage::from_pixel(64, 64, Rgb([200, 190, 170]))),
        }
    }

    pub fn undecodable() -> Self {
        Self { image: None }
    }
}

impl ImageLoader for FakeLoader {
    fn load(&self, _bytes: &[u8]) -> Option<RgbImage> {
        self.image.clone()
    }
}

/// Reports a fixed number of square beans
pub struct FakeSegmenter {
    pub beans: usize,
}

impl BeanSegmenter for FakeSegmenter {
    fn segment(&self, _image: &RgbImage) -> Vec<SegmentedBean> {
        (0..self.beans)
            .map(|_| SegmentedBean {
                image: RgbImage::from_pixel(20, 20, Rgb([110, 80, 50])),
                contour: Contour::new(vec![
                    Point::new(0, 0),
                    Point::new(19, 0),
                    Point::new(19, 19),
                    Point::new(0, 19),
                ]),
            })
            .collect()
    }
}

/// Segmenter that blocks its thread before reporting, like a large image would
pub struct SlowSegmenter {
    pub delay: Duration,
    pub beans: usize,
}

impl BeanSegmenter for SlowSegmenter {
    fn segment(&self, image: &RgbImage) -> Vec<SegmentedBean> {
        std::thread::sleep(self.delay);
        FakeSegmenter { beans: self.beans }.segment(image)
    }
}

/// Same features for every bean
pub struct FixedFeatures {
    pub features: BeanFeatures,
}

impl FixedFeatures {
    pub fn regular() -> Self {
        Self {
            features: BeanFeatures {
                area: 1500.0,
                perimeter: 140.0,
                circularity: 0.85,
                has_cracks: BeanFeatures::crack_flag(false),
            },
        }
    }
}

impl FeatureExtractor for FixedFeatures {
    fn extract(&self, _bean: &SegmentedBean) -> Result<BeanFeatures, CollaboratorError> {
        Ok(self.features.clone())
    }
}

/// Answers predictions in order; `None` entries and an exhausted script mean unavailable
pub struct ScriptedPredictor {
    responses: Mutex<VecDeque<Option<ColorPercentages>>>,
    pub calls: AtomicUsize,
}

impl ScriptedPredictor {
    pub fn new(responses: Vec<Option<ColorPercentages>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ColorPredictor for ScriptedPredictor {
    async fn predict(&self, input: &ModelInput) -> Option<ColorPercentages> {
        assert_eq!(input.as_slice().len(), 224 * 224 * 3);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses.lock().unwrap().pop_front().flatten()
    }
}

/// Records uploads and deletions; optionally fails every upload
#[derive(Default)]
pub struct RecordingUploader {
    pub fail: bool,
    pub uploads: Mutex<Vec<(String, usize)>>,
    pub deleted: Mutex<Vec<String>>,
}

impl RecordingUploader {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ImageUploader for RecordingUploader {
    async fn upload_grain_image(
        &self,
        _image: &RgbImage,
        session_tag: &str,
        bean_index: usize,
    ) -> UploadResult {
        self.uploads
            .lock()
            .unwrap()
            .push((session_tag.to_string(), bean_index));
        if self.fail {
            return UploadResult::failed("storage offline");
        }
        let public_id = format!("grains/{}/grain_{}", session_tag, bean_index);
        UploadResult::uploaded(format!("https://img.test/{}.jpg", public_id), public_id)
    }

    async fn delete_image(&self, public_id: &str) -> bool {
        self.deleted.lock().unwrap().push(public_id.to_string());
        true
    }
}

/// Keeps every saved session; optionally fails every save
#[derive(Default)]
pub struct RecordingStore {
    pub fail: bool,
    pub saved: Mutex<Vec<ClassificationSession>>,
}

impl RecordingStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn save_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn save(&self, session: &ClassificationSession) -> cqm_common::Result<()> {
        self.saved.lock().unwrap().push(session.clone());
        if self.fail {
            return Err(cqm_common::Error::Internal("disk full".to_string()));
        }
        Ok(())
    }
}

pub fn light() -> ColorPercentages {
    ColorPercentages::new(95.0, 3.0, 1.0, 1.0)
}

pub fn dark() -> ColorPercentages {
    ColorPercentages::new(10.0, 5.0, 80.0, 5.0)
}

/// Container wiring the given fakes with the default grading engine
pub fn container(
    loader: FakeLoader,
    beans: usize,
    predictor: Arc<ScriptedPredictor>,
    uploader: Arc<RecordingUploader>,
    store: Arc<dyn SessionStore>,
) -> Arc<ServiceContainer> {
    Arc::new(ServiceContainer {
        image_loader: Arc::new(loader),
        segmenter: Arc::new(FakeSegmenter { beans }),
        feature_extractor: Arc::new(FixedFeatures::regular()),
        color_predictor: predictor,
        uploader,
        store,
        grading: GradingEngine::default(),
    })
}
