//! Error types for vmem-core.

use thiserror::Error;

/// Result type alias using vmem-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for memory operations
#[derive(Error, Debug)]
pub enum Error {
    // Image errors
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Version conflict on memory {memory_id}: expected {expected}, found {found}")]
    VersionConflict {
        memory_id: String,
        expected: i64,
        found: i64,
    },

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an unreadable image error
    pub fn unreadable(reason: impl std::fmt::Display) -> Self {
        Self::UnreadableImage(reason.to_string())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Whether this error belongs to the storage family (transaction failures).
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::LockPoisoned | Self::VersionConflict { .. }
        )
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = Error::not_found("Memory", "abc");
        assert!(err.is_not_found());
        assert!(!err.is_storage());
        assert!(err.to_string().contains("abc"));

        let err = Error::VersionConflict {
            memory_id: "m1".into(),
            expected: 1,
            found: 2,
        };
        assert!(err.is_storage());

        let err = Error::InvalidInput {
            field: "version_increment".into(),
            message: "must be at least 1".into(),
        };
        assert!(!err.is_storage());
        assert_eq!(err.to_string(), "Invalid version_increment: must be at least 1");

        let err = Error::unreadable("bad magic");
        assert_eq!(err.to_string(), "Unreadable image: bad magic");
    }
}
