//! vmem-sdk - Visual Memory Engine SDK
//!
//! Async layer over `vmem-core`: the [`Engine`] orchestrates fingerprinting,
//! vision extraction, diffing and versioned storage for each screenshot.
//!
//! # Example
//!
//! ```rust,ignore
//! use vmem_sdk::{Engine, EngineConfig, ProcessRequest};
//!
//! let config = EngineConfig::new("memories.db").with_api_key("sk-...");
//! let engine = Engine::from_config(config)?;
//! let outcome = engine.process(ProcessRequest::new("screenshot.png")).await?;
//! println!("{} {}", outcome.status, outcome.memory_id);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod vision;

pub use config::{ConfigValidationError, EngineConfig, RetryConfig, VisionConfig};
pub use engine::{Engine, ProcessOutcome, ProcessRequest, ProcessStatus};
pub use error::{EngineError, EngineResult, ExtractionError};
pub use vision::{OpenRouterExtractor, RetryingExtractor, VisionExtractor};

// Re-export the core crate for callers that need storage types directly
pub use vmem_core;
