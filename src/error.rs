use std::fmt;

use thiserror::Error;

use crate::encoder::Conflict;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    UndeclaredVariable,
    UnsupportedWidth,
    DanglingArc,
    InvalidArc,
    UnknownResetPlace,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Errors: {0:#?}")]
    InvalidGraph(Vec<ValidationError>),

    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("{} state conflicts left unresolved", .0.len())]
    Unresolved(Vec<Conflict>),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<Vec<ValidationError>> for Error {
    fn from(errors: Vec<ValidationError>) -> Self {
        Error::InvalidGraph(errors)
    }
}
