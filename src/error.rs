//! Error taxonomy for plan construction and execution.
//!
//! Operators never recover from these locally: any error aborts the pull
//! chain and is surfaced to the caller as the statement's failure.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Errors raised while building or executing a plan.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Wrong arity or operand kind passed to a builtin or operator.
    #[error("invalid argument for {func}: {reason}")]
    Argument {
        /// Function or operator that rejected the input.
        func: String,
        /// Human readable cause.
        reason: String,
    },
    /// Evaluator type rules were violated.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Evaluation failed at runtime (divide by zero, invalid cast).
    #[error("evaluation error: {0}")]
    Evaluation(String),
    /// A plan invariant was broken.
    #[error("internal error: {0}")]
    Internal(String),
    /// A reachable branch that is deliberately left unhandled.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// Malformed query content such as an unknown variable or label.
    #[error("input error: {0}")]
    Input(String),
    /// The storage collaborator reported a failure.
    #[error("storage error: {0}")]
    Storage(String),
    /// Options could not be read or parsed.
    #[error("config error at {path}: {reason}")]
    Config {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },
}

impl ExecError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Argument { .. } => "ARGUMENT_ERROR",
            ExecError::TypeMismatch(_) => "TYPE_MISMATCH",
            ExecError::Evaluation(_) => "EVALUATION_ERROR",
            ExecError::Internal(_) => "INTERNAL_ERROR",
            ExecError::NotImplemented(_) => "NOT_IMPLEMENTED",
            ExecError::Input(_) => "INPUT_ERROR",
            ExecError::Storage(_) => "INTERNAL_ERROR",
            ExecError::Config { .. } => "CONFIG_ERROR",
        }
    }

    /// Helper for builtin/operator argument failures.
    pub fn argument(func: impl Into<String>, reason: impl Into<String>) -> Self {
        ExecError::Argument {
            func: func.into(),
            reason: reason.into(),
        }
    }

    /// Helper for broken plan invariants.
    pub fn internal(msg: impl Into<String>) -> Self {
        ExecError::Internal(msg.into())
    }

    /// Helper for explicit incompleteness markers.
    pub fn not_implemented(what: impl Into<String>) -> Self {
        ExecError::NotImplemented(what.into())
    }

    /// Helper for user-content errors.
    pub fn input(msg: impl Into<String>) -> Self {
        ExecError::Input(msg.into())
    }

    /// Helper for type rule violations.
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        ExecError::TypeMismatch(msg.into())
    }

    /// Helper for runtime evaluation failures.
    pub fn evaluation(msg: impl Into<String>) -> Self {
        ExecError::Evaluation(msg.into())
    }

    /// Returns true for the explicit "not implemented" marker.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ExecError::NotImplemented(_))
    }
}

/// Wrapper that prefixes an error's display output with its code.
pub struct ExecErrorWithCode<'a>(pub &'a ExecError);

impl fmt::Display for ExecErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
