use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug)]
pub enum ModelError {
    InvalidId(String),
    InvalidStatus(String),
    InvalidKind(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidId(msg) => write!(f, "invalid id: {msg}"),
            ModelError::InvalidStatus(msg) => {
                write!(f, "invalid scan status: {msg}")
            }
            ModelError::InvalidKind(msg) => write!(f, "invalid item kind: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}
