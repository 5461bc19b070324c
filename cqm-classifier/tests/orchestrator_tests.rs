//! Classification pipeline tests with fake collaborators

mod helpers;

use cqm_classifier::collaborators::{
    ContourFeatureExtractor, ImageCrateLoader, SessionStore, ThresholdSegmenter,
};
use cqm_classifier::grading::GradingEngine;
use cqm_classifier::models::{QualityCategory, SessionStatus};
use cqm_classifier::services::session_orchestrator::{MSG_IMAGE_NOT_LOADED, MSG_NO_BEANS};
use cqm_classifier::services::{ServiceContainer, SessionOrchestrator};
use helpers::beans_png;
use helpers::fakes::{
    container, dark, light, FakeLoader, FixedFeatures, RecordingStore, RecordingUploader,
    ScriptedPredictor, SlowSegmenter,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const IMAGE: &[u8] = b"image bytes";

#[tokio::test]
async fn test_undecodable_image_fails_session() {
    let store = Arc::new(RecordingStore::default());
    let predictor = Arc::new(ScriptedPredictor::new(vec![]));
    let services = container(
        FakeLoader::undecodable(),
        2,
        predictor.clone(),
        Arc::new(RecordingUploader::default()),
        store.clone(),
    );

    let session = SessionOrchestrator::new(services)
        .start_classification_session(1, IMAGE, 9)
        .await;

    assert_eq!(session.status(), SessionStatus::Failed);
    assert!(session.analyses().is_empty());
    assert_eq!(session.total_grains_analyzed(), 0);
    assert_eq!(session.error_message(), Some(MSG_IMAGE_NOT_LOADED));
    assert!(session.completed_at().is_some());
    assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_no_beans_detected_fails_session() {
    let store = Arc::new(RecordingStore::default());
    let services = container(
        FakeLoader::decodable(),
        0,
        Arc::new(ScriptedPredictor::new(vec![])),
        Arc::new(RecordingUploader::default()),
        store.clone(),
    );

    let session = SessionOrchestrator::new(services)
        .start_classification_session(1, IMAGE, 9)
        .await;

    assert_eq!(session.status(), SessionStatus::Failed);
    assert_eq!(session.error_message(), Some(MSG_NO_BEANS));
    assert!(session
        .error_message()
        .unwrap()
        .to_lowercase()
        .contains("no beans detected"));
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_light_and_dark_beans_graded_and_reported() {
    let store = Arc::new(RecordingStore::default());
    let uploader = Arc::new(RecordingUploader::default());
    let services = container(
        FakeLoader::decodable(),
        2,
        Arc::new(ScriptedPredictor::new(vec![Some(light()), Some(dark())])),
        uploader.clone(),
        store.clone(),
    );

    let session = SessionOrchestrator::new(services)
        .start_classification_session(42, IMAGE, 7)
        .await;

    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.coffee_lot_id(), 42);
    assert_eq!(session.user_id(), 7);
    assert_eq!(session.total_grains_analyzed(), 2);
    assert!(session.processing_time_seconds().unwrap() >= 0.0);

    let analyses = session.analyses();
    assert_eq!(analyses[0].bean_index(), 0);
    assert_eq!(analyses[0].final_category(), QualityCategory::Specialty);
    assert!(analyses[0].final_score() >= 0.9);

    assert_eq!(analyses[1].bean_index(), 1);
    assert!(matches!(
        analyses[1].final_category(),
        QualityCategory::B | QualityCategory::C
    ));
    assert!(analyses[1].final_score() < 0.7);

    for analysis in analyses {
        assert_eq!(analysis.final_score(), analysis.quality_assessment().final_score);
        assert_eq!(
            analysis.final_category(),
            analysis.quality_assessment().quality_category
        );
        assert!(analysis.image_url().is_some());
        assert!(analysis.storage_public_id().is_some());
    }

    let report = session.report().unwrap();
    assert_eq!(report.total_beans_analyzed, 2);
    assert_eq!(report.predominant_category, analyses[0].final_category().to_string());
    assert_eq!(report.category_distribution.len(), 5);
    assert!((report.overall_batch_quality - report.average_score * 100.0).abs() < 0.1);

    // Both beans uploaded under one temporary tag for lot 42
    let uploads = uploader.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 2);
    assert!(uploads[0].0.starts_with("temp_") && uploads[0].0.ends_with("_42"));
    assert_eq!(uploads[0].0, uploads[1].0);
    assert_eq!(uploads[1].1, 1);

    assert_eq!(store.save_count(), 1);
    let saved = store.saved.lock().unwrap();
    assert_eq!(saved[0].session_id(), session.session_id());
    assert_eq!(saved[0].status(), SessionStatus::Completed);
}

#[tokio::test]
async fn test_predictor_failure_on_any_bean_fails_whole_session() {
    let store = Arc::new(RecordingStore::default());
    let uploader = Arc::new(RecordingUploader::default());
    let predictor = Arc::new(ScriptedPredictor::new(vec![Some(light()), None, Some(light())]));
    let services = container(
        FakeLoader::decodable(),
        3,
        predictor.clone(),
        uploader.clone(),
        store.clone(),
    );

    let session = SessionOrchestrator::new(services)
        .start_classification_session(5, IMAGE, 1)
        .await;

    assert_eq!(session.status(), SessionStatus::Failed);
    assert!(session.analyses().is_empty());
    assert!(session.error_message().unwrap().contains("predictor"));
    // Aborted at the second bean; nothing after it is attempted
    assert_eq!(predictor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.save_count(), 1);

    // The first bean's image is removed with its discarded analysis
    let deleted = uploader.deleted.lock().unwrap().clone();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].ends_with("grain_0"));
}

#[tokio::test]
async fn test_upload_failure_keeps_session_completed() {
    let store = Arc::new(RecordingStore::default());
    let services = container(
        FakeLoader::decodable(),
        2,
        Arc::new(ScriptedPredictor::new(vec![Some(light()), Some(light())])),
        Arc::new(RecordingUploader::failing()),
        store.clone(),
    );

    let session = SessionOrchestrator::new(services)
        .start_classification_session(3, IMAGE, 1)
        .await;

    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.total_grains_analyzed(), 2);
    for analysis in session.analyses() {
        assert!(analysis.image_url().is_none());
        assert!(analysis.storage_public_id().is_none());
    }
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_persistence_failure_is_recorded_not_propagated() {
    let store = Arc::new(RecordingStore::failing());
    let services = container(
        FakeLoader::decodable(),
        1,
        Arc::new(ScriptedPredictor::new(vec![Some(light())])),
        Arc::new(RecordingUploader::default()),
        store.clone(),
    );
    let orchestrator = SessionOrchestrator::new(services);
    assert!(orchestrator.last_error().await.is_none());

    let session = orchestrator.start_classification_session(8, IMAGE, 2).await;

    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(store.save_count(), 1);
    let last_error = orchestrator.last_error().await.unwrap();
    assert!(last_error.contains(&session.session_id().to_string()));
    assert!(last_error.contains("disk full"));
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let store = Arc::new(RecordingStore::default());
    let services = container(
        FakeLoader::decodable(),
        1,
        Arc::new(ScriptedPredictor::new(vec![Some(light()), Some(dark())])),
        Arc::new(RecordingUploader::default()),
        store.clone(),
    );
    let orchestrator = SessionOrchestrator::new(services);

    let first = orchestrator.start_classification_session(1, IMAGE, 1).await;
    let second = orchestrator.start_classification_session(1, IMAGE, 1).await;

    assert_ne!(first.session_id(), second.session_id());
    assert_eq!(first.analyses()[0].final_category(), QualityCategory::Specialty);
    assert_eq!(second.analyses()[0].final_category(), QualityCategory::C);
    assert_eq!(store.save_count(), 2);
}

#[tokio::test]
async fn test_default_adapters_grade_round_beans() {
    let store = Arc::new(RecordingStore::default());
    let predictor = Arc::new(ScriptedPredictor::new(vec![Some(light()), Some(light())]));
    let services = Arc::new(ServiceContainer {
        image_loader: Arc::new(ImageCrateLoader),
        segmenter: Arc::new(ThresholdSegmenter::default()),
        feature_extractor: Arc::new(ContourFeatureExtractor),
        color_predictor: predictor.clone(),
        uploader: Arc::new(RecordingUploader::default()),
        store: store.clone() as Arc<dyn SessionStore>,
        grading: GradingEngine::default(),
    });
    let image = beans_png(160, 80, 20, &[(40, 40), (120, 40)]);

    let session = SessionOrchestrator::new(services)
        .start_classification_session(21, &image, 4)
        .await;

    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.total_grains_analyzed(), 2);
    assert_eq!(predictor.calls.load(Ordering::SeqCst), 2);

    for analysis in session.analyses() {
        let features = analysis.features();
        // Traced outline of an r=20 disk: no size adjustment, no shape penalty
        assert!(
            (1000.0..1300.0).contains(&features.area),
            "area {}",
            features.area
        );
        assert!(
            (0.8..=1.0).contains(&features.circularity),
            "circularity {}",
            features.circularity
        );
        assert_eq!(features.has_cracks, "False");

        let assessment = analysis.quality_assessment();
        assert!(assessment.adjustments.is_empty());
        assert_eq!(assessment.final_score, 0.95);
        assert_eq!(analysis.final_category(), QualityCategory::Specialty);
    }
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_slow_segmentation_keeps_runtime_responsive() {
    let services = Arc::new(ServiceContainer {
        image_loader: Arc::new(FakeLoader::decodable()),
        segmenter: Arc::new(SlowSegmenter {
            delay: Duration::from_millis(300),
            beans: 1,
        }),
        feature_extractor: Arc::new(FixedFeatures::regular()),
        color_predictor: Arc::new(ScriptedPredictor::new(vec![Some(light())])),
        uploader: Arc::new(RecordingUploader::default()),
        store: Arc::new(RecordingStore::default()),
        grading: GradingEngine::default(),
    });

    // Single-threaded test runtime: the ticker only advances while the
    // pipeline yields
    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = Arc::clone(&ticks);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let session = SessionOrchestrator::new(services)
        .start_classification_session(1, IMAGE, 1)
        .await;
    ticker.abort();

    assert_eq!(session.status(), SessionStatus::Completed);
    assert!(
        ticks.load(Ordering::SeqCst) >= 10,
        "runtime stalled during segmentation ({} ticks)",
        ticks.load(Ordering::SeqCst)
    );
}
