//! Error types for the openapi-assist crate.

use thiserror::Error;

/// Errors that can occur while running an assisted API call.
///
/// Every variant except [`AssistError::LlmUnavailable`] aborts the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssistError {
    #[error("failed to fetch OpenAPI document from {url}")]
    SpecFetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("OpenAPI document at {url} returned HTTP {status}")]
    SpecStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("OpenAPI document is not valid JSON")]
    SpecParse(#[source] serde_json::Error),

    #[error("OpenAPI document root must be a JSON object")]
    SpecShape,

    #[error("endpoint not found in OpenAPI document: {method} {path}")]
    EndpointNotFound { method: String, path: String },

    #[error("unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },

    #[error("HTTP request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read user input")]
    Input(#[source] std::io::Error),

    #[error("language model backend unavailable: {reason}")]
    LlmUnavailable { reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file: {path}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {path}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl AssistError {
    /// Whether the run may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LlmUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, AssistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_llm_unavailable_is_recoverable() {
        let llm = AssistError::LlmUnavailable {
            reason: "connection refused".into(),
        };
        assert!(llm.is_recoverable());

        let missing = AssistError::EndpointNotFound {
            method: "POST".into(),
            path: "/login".into(),
        };
        assert!(!missing.is_recoverable());
        assert!(!AssistError::SpecShape.is_recoverable());
    }

    #[test]
    fn endpoint_not_found_message_names_method_and_path() {
        let err = AssistError::EndpointNotFound {
            method: "DELETE".into(),
            path: "/orders/{id}".into(),
        };
        assert_eq!(
            err.to_string(),
            "endpoint not found in OpenAPI document: DELETE /orders/{id}"
        );
    }
}
