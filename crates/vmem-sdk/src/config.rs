//! Engine Configuration
//!
//! Defines configuration options for the Visual Memory Engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vmem_core::{DistanceMetric, DEFAULT_THRESHOLD};

/// Default OpenRouter-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default vision model
pub const DEFAULT_MODEL: &str = "qwen/qwen-2.5-vl-7b-instruct:free";

/// Model tried when the primary model fails
pub const DEFAULT_FALLBACK_MODEL: &str = "google/gemini-2.0-flash-exp:free";

/// Engine configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Maximum perceptual distance for a near-duplicate (default: 4)
    pub perceptual_threshold: u32,

    /// How perceptual distance is measured (default: bitwise)
    pub distance_metric: DistanceMetric,

    /// Vision extractor configuration
    pub vision: VisionConfig,

    /// Retry policy for extraction calls
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("memories.db"),
            perceptual_threshold: DEFAULT_THRESHOLD,
            distance_metric: DistanceMetric::default(),
            vision: VisionConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Vision extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// API key (required by the HTTP extractor)
    pub api_key: Option<String>,

    /// Base URL of the chat completions API
    pub base_url: String,

    /// Primary model
    pub model: String,

    /// Model tried after the primary one fails (optional)
    pub fallback_model: Option<String>,

    /// Per-attempt timeout in seconds (default: 60)
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            fallback_model: Some(DEFAULT_FALLBACK_MODEL.to_string()),
            timeout_secs: 60,
        }
    }
}

impl VisionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry policy for extraction calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first (default: 3)
    pub max_attempts: u32,

    /// Delay before the first retry (default: 2000)
    pub initial_delay_ms: u64,

    /// Upper bound on any delay (default: 10000)
    pub max_delay_ms: u64,

    /// Growth factor between retries (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl EngineConfig {
    /// Create a new engine config with the given database path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.vision.api_key = Some(api_key.into());
        self
    }

    /// Set the primary model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.vision.model = model.into();
        self
    }

    /// Set the perceptual threshold
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.perceptual_threshold = threshold;
        self
    }

    /// Set the distance metric
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    /// Set vision configuration
    pub fn with_vision(mut self, vision: VisionConfig) -> Self {
        self.vision = vision;
        self
    }

    /// Set retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.perceptual_threshold > 64 {
            return Err(ConfigValidationError::InvalidValue {
                field: "perceptual_threshold".into(),
                message: "must be at most 64".into(),
            });
        }

        if self.vision.base_url.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "vision.base_url".into(),
                message: "must not be empty".into(),
            });
        }

        if self.vision.model.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "vision.model".into(),
                message: "must not be empty".into(),
            });
        }

        if self.vision.timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "vision.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "retry.max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "retry.backoff_multiplier".into(),
                message: "must be at least 1.0".into(),
            });
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigValidationError::InvalidValue {
                field: "retry.initial_delay_ms".into(),
                message: "must not exceed retry.max_delay_ms".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("an API key is required (set OPENROUTER_API_KEY)")]
    MissingApiKey,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
