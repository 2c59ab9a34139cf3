//! Error types for the trace-and-compile front end

use thiserror::Error;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation and invocation errors
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Lex error at position {position}: {message}")]
    Lex { position: usize, message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Parameter '{param}' is missing a type annotation")]
    MissingAnnotation { param: String },

    #[error("Invalid annotation: {message}")]
    BadAnnotation { message: String },

    #[error("Expected exactly one function definition, found {found}")]
    MultipleModules { found: usize },

    #[error("Simultaneous assignment to {targets} targets is not supported")]
    UnsupportedAssignment { targets: usize },

    #[error("Unsupported binary operator '{op}' (only '+' and '*' are supported)")]
    UnsupportedOperator { op: String },

    #[error("Unsupported syntax: {construct}")]
    UnsupportedSyntax { construct: String },

    #[error("Name '{name}' is not bound")]
    UnboundName { name: String },

    #[error("Unknown target '{target}' (expected 'cpu' or 'gpu')")]
    UnknownTarget { target: String },

    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("Dtype mismatch: expected {expected}, got {got}")]
    DtypeMismatch { expected: String, got: String },

    #[error("Kernel expects {expected} argument(s), got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CompileError {
    pub fn parse_error(msg: impl Into<String>) -> Self {
        CompileError::Parse { message: msg.into() }
    }

    pub fn missing_annotation(param: impl Into<String>) -> Self {
        CompileError::MissingAnnotation { param: param.into() }
    }

    pub fn bad_annotation(msg: impl Into<String>) -> Self {
        CompileError::BadAnnotation { message: msg.into() }
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        CompileError::UnboundName { name: name.into() }
    }

    pub fn unsupported_syntax(construct: impl Into<String>) -> Self {
        CompileError::UnsupportedSyntax { construct: construct.into() }
    }

    pub fn unknown_target(target: impl Into<String>) -> Self {
        CompileError::UnknownTarget { target: target.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal { message: msg.into() }
    }
}
