//! Typed failures at the search boundary.
//!
//! An empty query, an empty access-filtered shortlist and an unresolvable
//! citation are not represented here: those are ordinary outcomes (an empty
//! response, a canned answer, a dropped source).

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The request itself is unusable, such as a non-numeric filter.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No language model is configured, or its credentials are missing.
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("language model timed out after {0:?}")]
    ModelTimeout(Duration),

    /// Transport failure or non-success status from the model endpoint.
    #[error("language model request failed: {0}")]
    ModelRequest(String),

    /// The model answered, but not in the required output shape.
    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("record enrichment timed out after {0}s")]
    EnrichmentTimeout(u64),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_convert_from_anyhow() {
        let err: SearchError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, SearchError::Store(_)));
        assert_eq!(err.to_string(), "disk full");
    }
}
