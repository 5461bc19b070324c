//! # CQM Common Library
//!
//! Shared code for the coffee quality management services:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Timestamp and UUID helpers

pub mod config;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
