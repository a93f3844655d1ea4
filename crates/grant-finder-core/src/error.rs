//! Error taxonomy for the grant search engine.
//!
//! Zero matches is not an error: an empty page is a valid, successfully
//! assembled result. Range violations inside a filter (`min > max`) are
//! normalized rather than rejected, so they never surface here either.

pub type Result<T, E = GrantError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrantError {
    /// Structurally malformed input, rejected rather than corrected.
    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },
    /// Unknown sort key, filter field, or filter value.
    #[error("Unsupported filter {field}: {value}")]
    UnsupportedFilter { field: String, value: String },
    /// Record or preference store failure. Never retried by the engine.
    #[error("Fetch failed: {message}")]
    Fetch { message: String },
}

impl GrantError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidFilter { message: message.into() }
    }

    pub fn unsupported(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnsupportedFilter { field: field.into(), value: value.into() }
    }

    pub(crate) fn fetch(err: anyhow::Error) -> Self {
        Self::Fetch { message: format!("{err:#}") }
    }
}
