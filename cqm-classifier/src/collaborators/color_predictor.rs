//! HTTP color predictor client
//!
//! Posts the normalized bean tensor to a model server speaking the
//! TensorFlow Serving REST format:
//!
//! ```text
//! POST {url}   {"instances": [[[[r, g, b], ...], ...]]}
//! 200          {"predictions": [[p_light, p_medium, p_dark, p_green]]}
//! ```
//!
//! Probabilities are rounded to 3 decimals and rescaled to percentages.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{CollaboratorError, ColorPredictor, ModelInput};
use crate::models::ColorPercentages;

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<Vec<Vec<Vec<f32>>>>,
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

/// Color predictor backed by a remote inference endpoint
///
/// Reports itself unavailable (every prediction is `None`) when no endpoint
/// is configured.
pub struct HttpColorPredictor {
    http_client: Client,
    endpoint: Option<String>,
}

impl HttpColorPredictor {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Configuration(format!("HTTP client: {}", e)))?;

        if endpoint.is_none() {
            warn!("No color predictor endpoint configured, classifications will fail");
        }

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    pub fn is_available(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn request(
        &self,
        endpoint: &str,
        input: &ModelInput,
    ) -> Result<ColorPercentages, CollaboratorError> {
        let body = PredictRequest {
            instances: vec![input.to_nested()],
        };

        let response = self.http_client.post(endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Service(format!(
                "Predictor returned HTTP {}",
                status
            )));
        }

        let parsed: PredictResponse = response.json().await?;
        let raw = parsed
            .predictions
            .first()
            .ok_or_else(|| CollaboratorError::Service("Empty predictions".to_string()))?;

        ColorPercentages::from_probabilities(raw).ok_or_else(|| {
            CollaboratorError::Service(format!(
                "Expected 4 finite class probabilities, got {:?}",
                raw
            ))
        })
    }
}

#[async_trait]
impl ColorPredictor for HttpColorPredictor {
    async fn predict(&self, input: &ModelInput) -> Option<ColorPercentages> {
        let endpoint = self.endpoint.as_deref()?;

        match self.request(endpoint, input).await {
            Ok(percentages) => {
                debug!(?percentages, "Color prediction received");
                Some(percentages)
            }
            Err(e) => {
                warn!("Color prediction failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::DefaultBodyLimit, routing::post, Json, Router};
    use image::{Rgb, RgbImage};
    use serde_json::{json, Value};

    async fn spawn_model_server(response: Value) -> String {
        let app = Router::new().route(
            "/v1/models/color/predict",
            post(move |Json(body): Json<Value>| {
                let response = response.clone();
                async move {
                    // Only answer tensors shaped like the model input
                    let rows = body["instances"][0].as_array().map(|a| a.len());
                    if rows == Some(224) {
                        Json(response)
                    } else {
                        Json(json!({"predictions": []}))
                    }
                }
            }),
        )
        .layer(DefaultBodyLimit::disable());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/models/color/predict", addr)
    }

    fn input() -> ModelInput {
        ModelInput::from_image(&RgbImage::from_pixel(30, 20, Rgb([120, 90, 60])))
    }

    #[tokio::test]
    async fn test_unconfigured_predictor_returns_none() {
        let predictor = HttpColorPredictor::new(None, Duration::from_secs(1)).unwrap();
        assert!(!predictor.is_available());
        assert!(predictor.predict(&input()).await.is_none());
    }

    #[tokio::test]
    async fn test_prediction_renormalized_to_percentages() {
        let url = spawn_model_server(json!({"predictions": [[0.7, 0.1, 0.1, 0.1]]})).await;
        let predictor = HttpColorPredictor::new(Some(url), Duration::from_secs(5)).unwrap();

        let colors = predictor.predict(&input()).await.unwrap();
        assert!((colors.light - 70.0).abs() < 1e-6);
        assert!((colors.total() - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_malformed_prediction_returns_none() {
        let url = spawn_model_server(json!({"predictions": [[0.5, 0.5]]})).await;
        let predictor = HttpColorPredictor::new(Some(url), Duration::from_secs(5)).unwrap();
        assert!(predictor.predict(&input()).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_returns_none() {
        let predictor = HttpColorPredictor::new(
            Some("http://127.0.0.1:9/predict".to_string()),
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(predictor.predict(&input()).await.is_none());
    }
}
