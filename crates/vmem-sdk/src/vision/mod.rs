//! Vision extraction
//!
//! A [`VisionExtractor`] turns a screenshot into a structured document. The
//! engine only depends on the trait; [`OpenRouterExtractor`] is the HTTP
//! implementation and [`RetryingExtractor`] adds timeouts and backoff around
//! any extractor.

pub mod openrouter;
pub mod retry;

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::error::ExtractionError;

pub use openrouter::{parse_extraction, OpenRouterExtractor, EXTRACTION_PROMPT};
pub use retry::RetryingExtractor;

/// Produces a structured document from an image file.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    /// Extract structured content from the image at `image_path`.
    async fn extract(&self, image_path: &Path) -> Result<Value, ExtractionError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}
