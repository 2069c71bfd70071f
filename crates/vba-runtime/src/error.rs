use thiserror::Error;

/// Errors raised while parsing or executing macro code.
///
/// Runtime variants carry the legacy error numbers via [`VbaError::code`]
/// so host bindings can surface familiar diagnostics.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VbaError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("type mismatch")]
    TypeMismatch,

    #[error("overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("subscript out of range")]
    SubscriptOutOfRange,

    #[error("object required")]
    ObjectRequired,

    #[error("invalid procedure call: {0}")]
    InvalidProcedureCall(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("sub or function not defined: {0}")]
    ProcedureNotDefined(String),

    #[error("out of stack space")]
    StackOverflow,

    #[error("{0}")]
    Generic(String),
}

impl VbaError {
    /// Legacy error number associated with this error.
    pub fn code(&self) -> i32 {
        match self {
            VbaError::Syntax { .. } => 2,
            VbaError::TypeMismatch => 13,
            VbaError::Overflow => 6,
            VbaError::DivisionByZero => 11,
            VbaError::SubscriptOutOfRange => 9,
            VbaError::ObjectRequired => 424,
            VbaError::InvalidProcedureCall(_) => 5,
            VbaError::NotImplemented(_) => 445,
            VbaError::ProcedureNotDefined(_) => 35,
            VbaError::StackOverflow => 28,
            VbaError::Generic(_) => 0,
        }
    }
}
