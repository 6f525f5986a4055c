//! Error handling for the guide pipeline
//!
//! The taxonomy follows the pipeline stages:
//!
//! - **Fetch errors**: network or HTTP failures while downloading a guide source
//! - **Parse errors**: malformed XMLTV documents
//! - **Provider errors**: failed lookups against external metadata services
//! - **Storage errors**: transactional persistence failures
//!
//! Fetch and parse errors abort only the ingestion of their own source. Provider
//! errors never escape the enrichment engine. An output channel whose guide
//! mapping does not resolve is not an error at all; the mapper returns `None`.
//!
//! ```rust
//! use epg_weaver::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::validation("channel number must be positive"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for XMLTV decoding results
pub type ParseResult<T> = Result<T, ParseError>;

/// Convenience type alias for metadata provider results
pub type ProviderResult<T> = Result<T, ProviderError>;
