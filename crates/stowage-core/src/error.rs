//! Error types module
//!
//! `CoreError` covers failures raised by the registry, the middleware chain and
//! configuration loading. Every error enum in the workspace also reports an
//! [`ErrorKind`], the vendor-neutral category callers match on without caring
//! which crate produced the error.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::middleware::Action;
use crate::registry::ServiceCategory;

/// Vendor-neutral error category shared by all Stowage error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown registry alias or missing remote object
    NotFound,
    /// Duplicate registration that must not overwrite (middleware attachment)
    Conflict,
    /// Missing or malformed configuration or input
    Validation,
    /// External conversion tool exited non-zero, timed out or could not start
    ExternalToolFailure,
    /// Underlying storage, queue or auth SDK error
    VendorFailure,
    /// Operation outside the adapter's declared capabilities
    Unsupported,
    /// Local failure that fits no other category (I/O, encoding)
    Internal,
}

impl ErrorKind {
    /// Machine-readable code, e.g. `NOT_FOUND`
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::ExternalToolFailure => "EXTERNAL_TOOL_FAILURE",
            ErrorKind::VendorFailure => "VENDOR_FAILURE",
            ErrorKind::Unsupported => "UNSUPPORTED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("No {category} provider registered under alias '{alias}'")]
    NotFound {
        category: ServiceCategory,
        alias: String,
    },

    #[error("No default {0} provider registered")]
    NoDefault(ServiceCategory),

    #[error("Middleware '{0}' is already attached")]
    Conflict(String),

    #[error("Middleware '{id}' rejected {action}")]
    MiddlewareRejected {
        id: String,
        action: Action,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } | CoreError::NoDefault(_) => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::MiddlewareRejected { .. } | CoreError::Validation(_) => {
                ErrorKind::Validation
            }
            CoreError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_alias_and_category() {
        let err = CoreError::NotFound {
            category: ServiceCategory::Queue,
            alias: "sqs".to_string(),
        };
        assert_eq!(err.to_string(), "No queue provider registered under alias 'sqs'");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_middleware_rejection_is_validation() {
        let err = CoreError::MiddlewareRejected {
            id: "acl".to_string(),
            action: Action::Delete,
            source: anyhow::anyhow!("forbidden"),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Middleware 'acl' rejected delete");
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(ErrorKind::ExternalToolFailure.code(), "EXTERNAL_TOOL_FAILURE");
        assert_eq!(ErrorKind::Conflict.to_string(), "CONFLICT");
    }
}
