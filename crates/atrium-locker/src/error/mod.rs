//! Domain errors raised by the isolation layer.
//!
//! All errors use `thiserror`-derived enums with structured context so
//! callers can inspect the failure programmatically. Application-level
//! script faults are carried transparently: the isolation layer reports its
//! own boundary violations but never rewrites what sandboxed code threw.

use atrium_script::ScriptError;
use thiserror::Error;

/// Errors arising from locker construction and capability operations.
#[derive(Debug, Error)]
pub enum LockerError {
    /// The source preprocessor detected a forbidden construct.
    #[error("forbidden token '{token}' at line {line}, column {column}")]
    SecurityViolation {
        /// The rejected token text.
        token: String,
        /// One-based line of the first occurrence.
        line: u32,
        /// One-based column of the first occurrence.
        column: u32,
    },

    /// The execution facility rejected the synthesized unit.
    #[error("locker construction failed: {message}")]
    Construction {
        /// Human-readable description of the rejection.
        message: String,
        /// Underlying facility error, when one was raised.
        #[source]
        source: Option<ScriptError>,
    },

    /// A capability key did not match during wrap, unwrap, or verification.
    #[error("access denied during {operation}: capability key does not match")]
    AccessDenied {
        /// The operation that was refused.
        operation: String,
    },

    /// A trust grant was attempted from an object carrying no key.
    #[error("trust grant requires a tagged source object")]
    UntaggedObject,

    /// A re-tag was attempted without presenting the object's current key.
    #[error("object is already tagged for namespace '{namespace}'")]
    AlreadyTagged {
        /// Namespace of the key the object currently carries.
        namespace: String,
    },

    /// A fault raised inside sandboxed code, passed through unchanged.
    #[error(transparent)]
    Execution(ScriptError),
}

impl LockerError {
    /// Builds an [`LockerError::AccessDenied`] for the named operation.
    pub fn access_denied(operation: impl Into<String>) -> Self {
        Self::AccessDenied {
            operation: operation.into(),
        }
    }
}
