//! Error type definitions
//!
//! A hierarchical error system: stage specific enums are wrapped by the
//! top-level [`AppError`] so callers can either match on the stage or just
//! propagate with `?`.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Downloading a guide source failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// A guide document could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// An external metadata provider failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Persistence layer failures other than raw driver errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised while fetching a guide source
#[derive(Error, Debug)]
pub enum FetchError {
    /// Non-success HTTP status
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// Connection or read timeout
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Any other transport failure
    #[error("Network failure fetching {url}: {message}")]
    Network { url: String, message: String },
}

/// Errors raised while decoding an XMLTV document
#[derive(Error, Debug)]
pub enum ParseError {
    /// The XML itself is not well formed
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// A required element is missing
    #[error("Missing <{element}> element in {context}")]
    MissingElement { element: String, context: String },

    /// A required attribute is missing
    #[error("Missing '{attribute}' attribute on <{element}>")]
    MissingAttribute { attribute: String, element: String },

    /// A value could not be interpreted
    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: String, value: String },
}

/// Errors raised by external metadata providers
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request could not be sent or timed out
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    /// Unexpected HTTP status
    #[error("{provider} returned HTTP {status}")]
    Status { provider: String, status: u16 },

    /// The response body could not be interpreted
    #[error("{provider} response could not be decoded: {message}")]
    Decode { provider: String, message: String },
}

/// Persistence errors that are not plain driver errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// A transaction could not complete
    #[error("Transaction failed: {message}")]
    Transaction { message: String },

    /// Serialized list/mapping columns could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration failures
    #[error("Migration {name} failed: {message}")]
    Migration { name: String, message: String },
}

impl AppError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for failures that only affect a single guide source
    pub fn is_source_failure(&self) -> bool {
        matches!(self, AppError::Fetch(_) | AppError::Parse(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(StorageError::Serialization(err))
    }
}

impl FetchError {
    /// Classify a transport error from the HTTP client
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl ParseError {
    pub fn missing_attribute(attribute: &str, element: &str) -> Self {
        ParseError::MissingAttribute {
            attribute: attribute.to_string(),
            element: element.to_string(),
        }
    }
}

impl ProviderError {
    pub fn request<P: Into<String>>(provider: P, err: impl std::fmt::Display) -> Self {
        ProviderError::Request {
            provider: provider.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_failures_are_classified() {
        let fetch: AppError = FetchError::Timeout {
            url: "http://example.com/guide.xml".to_string(),
        }
        .into();
        let parse: AppError = ParseError::missing_attribute("id", "channel").into();
        let storage: AppError = StorageError::Transaction {
            message: "busy".to_string(),
        }
        .into();

        assert!(fetch.is_source_failure());
        assert!(parse.is_source_failure());
        assert!(!storage.is_source_failure());
    }

    #[test]
    fn test_error_messages_name_the_construct() {
        let err = ParseError::missing_attribute("channel", "programme");
        assert_eq!(
            err.to_string(),
            "Missing 'channel' attribute on <programme>"
        );

        let err = AppError::not_found("guide source", "abc");
        assert_eq!(err.to_string(), "Not found: guide source with id abc");
    }
}
