//! Crate-level error type
//!
//! Data-access failures travel as [`RepositoryError`] and are wrapped here
//! unchanged, so callers can still inspect the kind and operation.

use thiserror::Error;

use crate::repository::{RepositoryError, RepositoryErrorKind};

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Pool could not be created
    #[error("Connection error: {0}")]
    Connection(String),

    /// Structured data-access error
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Input rejected by a business rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Repository error kind, if this wraps one
    pub fn repository_kind(&self) -> Option<RepositoryErrorKind> {
        match self {
            Error::Repository(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Repository(e) => e.is_retriable(),
            Error::Connection(_) => true,
            _ => false,
        }
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

/// Sanitize a database URL by removing the password
pub fn sanitize_url(url: &str) -> String {
    if let (Some(scheme_end), Some(at_pos)) = (url.find("://"), url.rfind('@')) {
        let credentials = &url[scheme_end + 3..at_pos];
        if let Some(colon) = credentials.find(':') {
            let scheme = &url[..scheme_end + 3];
            let username = &credentials[..colon];
            return format!("{}{}:***{}", scheme, username, &url[at_pos..]);
        }
    }
    url.to_string()
}
