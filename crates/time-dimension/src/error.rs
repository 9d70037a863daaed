//! Error types for time-dimension resolution.

use thiserror::Error;

/// Result type alias using DimensionError.
pub type DimensionResult<T> = Result<T, DimensionError>;

/// Failures while resolving a layer's time axis.
#[derive(Debug, Error)]
pub enum DimensionError {
    // === Capabilities content ===
    #[error("No TIME dimension found for layer '{layer}'")]
    MissingTimeDimension { layer: String },

    #[error("Malformed time interval: {0}")]
    MalformedInterval(String),

    #[error("Capabilities XML error: {0}")]
    Xml(String),

    // === Request lifecycle ===
    #[error("Stale resolve result (request {issued}, latest {latest})")]
    StaleResult { issued: u64, latest: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Capabilities request to {url} returned HTTP {status}")]
    HttpStatus { status: u16, url: String },
}

impl DimensionError {
    /// Short machine-readable code, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            DimensionError::MissingTimeDimension { .. } => "missing_time_dimension",
            DimensionError::MalformedInterval(_) => "malformed_interval",
            DimensionError::Xml(_) => "xml",
            DimensionError::StaleResult { .. } => "stale_result",
            DimensionError::Network(_) => "network",
            DimensionError::HttpStatus { .. } => "http_status",
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DimensionError::Network(_) => true,
            DimensionError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DimensionError {
    fn from(err: reqwest::Error) -> Self {
        DimensionError::Network(err.to_string())
    }
}

impl From<quick_xml::Error> for DimensionError {
    fn from(err: quick_xml::Error) -> Self {
        DimensionError::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DimensionError::Network("reset".into()).is_transient());
        assert!(DimensionError::HttpStatus { status: 503, url: "x".into() }.is_transient());
        assert!(!DimensionError::HttpStatus { status: 404, url: "x".into() }.is_transient());
        assert!(!DimensionError::MissingTimeDimension { layer: "radar".into() }.is_transient());
    }

    #[test]
    fn test_codes() {
        assert_eq!(DimensionError::MalformedInterval("a/b/c".into()).code(), "malformed_interval");
        assert_eq!(
            DimensionError::StaleResult { issued: 1, latest: 2 }.to_string(),
            "Stale resolve result (request 1, latest 2)"
        );
    }
}
