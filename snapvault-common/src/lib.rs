//! # SnapVault Common Library
//!
//! Shared code for the SnapVault photo service:
//! - Domain models (images, AI metadata, processing status)
//! - Configuration loading
//! - Similarity scoring and gallery search filters
//! - Timeout utility for outbound provider calls

pub mod config;
pub mod error;
pub mod models;
pub mod search;
pub mod similarity;
pub mod time;

pub use error::{Error, Result};
pub use models::{Image, ImageMetadata, ProcessingStatus};
