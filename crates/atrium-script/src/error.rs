//! Domain errors raised by the scripting runtime.

use thiserror::Error;

/// Errors raised while compiling or executing script source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The source text could not be tokenised or parsed.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// One-based line of the offending token.
        line: u32,
        /// One-based column of the offending token.
        column: u32,
        /// Human-readable description of the failure.
        message: String,
    },

    /// A fault occurred while the compiled unit was executing.
    #[error("runtime error: {message}")]
    Runtime {
        /// Human-readable description of the fault.
        message: String,
    },
}

impl ScriptError {
    /// Builds a runtime fault from a displayable message.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Returns `true` when the error was raised at compile time.
    #[must_use]
    pub const fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}
