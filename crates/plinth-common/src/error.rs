//! Error types for the Plinth provisioning engine
//!
//! Errors are structured with fields to aid debugging in production.
//! Each error variant includes contextual information like workload
//! identities, resource names, and underlying causes.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Plinth operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or incomplete workload spec. Raised before any resource
    /// mutation and surfaced verbatim to the caller.
    #[error("validation error for {workload}: {message}")]
    Validation {
        /// Identity of the workload with the invalid configuration
        workload: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.database.username")
        field: Option<String>,
    },

    /// An external control-plane operation did not reach a stable state
    /// within its expected bound.
    #[error("timed out after {waited_secs}s waiting for {resource}: {message}")]
    DependencyTimeout {
        /// Logical name of the stuck resource
        resource: String,
        /// Seconds waited before giving up
        waited_secs: u64,
        /// What was being waited for
        message: String,
    },

    /// A resource with the derived logical name already exists with
    /// different, incompatible properties. The engine refuses to
    /// overwrite or adopt it.
    #[error("conflict on {resource}: {message}")]
    Conflict {
        /// Logical name of the conflicting resource
        resource: String,
        /// Description of the incompatibility
        message: String,
    },

    /// A secret-derivation path was invoked twice for the same owner and
    /// would have produced a different value. This invariant violation
    /// indicates a programming defect, never an operational condition.
    #[error("secret regeneration hazard for owner {owner}")]
    SecretRegeneration {
        /// Owner identity whose secret would have been regenerated
        owner: String,
    },

    /// State store error (reading or writing recorded topology)
    #[error("state error [{context}]: {message}")]
    State {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "load", "persist")
        context: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "engine", "builder")
        context: String,
    },
}

impl Error {
    /// Create a validation error without workload context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            workload: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with workload context
    pub fn validation_for(workload: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            workload: workload.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with workload context and field path
    pub fn validation_for_field(
        workload: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            workload: workload.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a dependency timeout error
    pub fn timeout(resource: impl Into<String>, waited_secs: u64, msg: impl Into<String>) -> Self {
        Self::DependencyTimeout {
            resource: resource.into(),
            waited_secs,
            message: msg.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a state store error
    pub fn state(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::State {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True if this error was raised before any resource mutation and is
    /// safe to surface to the caller without a cleanup pass.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_includes_workload() {
        let err = Error::validation_for("site1", "custom domain requires a DNS zone");
        assert_eq!(
            err.to_string(),
            "validation error for site1: custom domain requires a DNS zone"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn timeout_error_carries_resource_identity() {
        let err = Error::timeout("todo-db", 300, "address not assigned");
        assert!(err.to_string().contains("todo-db"));
        assert!(!err.is_validation());
    }
}
