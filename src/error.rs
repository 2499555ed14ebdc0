//! Error types for the bonding engine
//!
//! Core operations return the typed [`BondError`] so callers can tell
//! correctness signals (missing rows, conflicts, invalid input) apart from
//! storage outages. Bootstrapping code uses anyhow on top of these.

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, BondError>;

/// Error taxonomy surfaced by the matching and contest engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BondError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Repository unavailable: {message}")]
    RepositoryUnavailable { message: String },
}

impl BondError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BondError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        BondError::Conflict {
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        BondError::Validation {
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        BondError::RepositoryUnavailable {
            message: message.into(),
        }
    }

    /// Only storage outages are worth retrying; everything else is a verdict
    pub fn is_retryable(&self) -> bool {
        matches!(self, BondError::RepositoryUnavailable { .. })
    }
}
