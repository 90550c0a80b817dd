//! vmem-core - Core library for the Visual Memory Engine
//!
//! Everything here is synchronous; the async engine lives in `vmem-sdk`.
//!
//! - **fingerprint**: content, perceptual and structural image hashes
//! - **index**: BK-tree nearest match over perceptual hashes
//! - **db**: SQLite store with version history
//! - **diff**: structured document diff and character-level text diff
//! - **patch**: apply diff operations with per-operation outcomes
//! - **summary**: incremental summary regeneration
//! - **history**: change hashing and history compaction
//! - **validation**: extraction quality checks

pub mod db;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod history;
pub mod index;
pub mod patch;
pub mod summary;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use db::MemoryDatabase;
pub use error::{Error, Result};
pub use fingerprint::Fingerprinter;
pub use index::{DistanceMetric, PerceptualIndex, DEFAULT_THRESHOLD};
pub use patch::{PatchOperationError, PatchReport};
pub use types::*;
