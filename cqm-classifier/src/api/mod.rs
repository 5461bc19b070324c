//! HTTP API handlers for cqm-classifier

pub mod classification;
pub mod health;

pub use classification::classification_routes;
pub use health::health_routes;
