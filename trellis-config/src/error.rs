//! Resolution error types

use thiserror::Error;

/// Result type alias for resolution operations
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors that abort a whole configuration resolution.
///
/// Resolution never returns a partially merged tree: any of these raised
/// while processing one include fails the entire run. Locations embedded in
/// messages are masked before the error is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The include ceiling for this run was reached.
    #[error("`{location}`: maximum of {max} includes exceeded")]
    TooManyIncludes { location: String, max: usize },

    /// The resolution deadline passed; no further fetches are issued.
    #[error("configuration resolution exceeded the timeout")]
    Timeout,

    /// An included file does not exist at the referenced location.
    #[error("`{location}`: included file not found")]
    NotFound { location: String },

    /// The include is already part of the current expansion.
    #[error("`{location}`: circular include detected")]
    CircularInclude { location: String },

    /// The configuration or one of its fragments cannot be parsed or is
    /// structurally invalid.
    #[error("`{location}`: {message}")]
    Malformed { location: String, message: String },
}

impl ResolveError {
    pub fn malformed(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            location: location.into(),
            message: message.into(),
        }
    }
}
