//! Error types for simulation operations.

use crate::types::AgentId;
use thiserror::Error;

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised by the simulation core.
///
/// A failed reconciliation guard is not an error; it is a resolved race and
/// is silently dropped. Everything here indicates either bad configuration or
/// a protocol bug.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("consistency violation on {id}: expected {expected}, found {actual}")]
    ConsistencyViolation {
        id: AgentId,
        expected: String,
        actual: String,
    },

    #[error("unknown agent kind discriminator {0}")]
    UnknownKind(i32),

    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("grid error: {0}")]
    Grid(String),
}

impl SimError {
    pub fn consistency(
        id: AgentId,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        SimError::ConsistencyViolation {
            id,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SimError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the ranks may have diverged.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            SimError::ConsistencyViolation { .. }
                | SimError::AgentNotFound(_)
                | SimError::UnknownKind(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentKind, RankId};

    #[test]
    fn test_consistency_message_names_agent() {
        let id = AgentId::new(4, RankId::new(1), AgentKind::Epithelial);
        let err = SimError::consistency(id, "local epithelial cell", "missing");
        let text = err.to_string();
        assert!(text.contains("epithelial#4@1/1"));
        assert!(text.contains("expected local epithelial cell"));
        assert!(err.is_consistency_violation());
    }

    #[test]
    fn test_config_error_is_not_consistency() {
        let err = SimError::invalid_config("virion.penetration_probability", "must be in [0, 1]");
        assert!(!err.is_consistency_violation());
        assert!(err.to_string().contains("virion.penetration_probability"));
    }
}
