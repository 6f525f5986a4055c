//! Programme metadata enrichment from external providers

pub mod cache;
pub mod engine;
pub mod providers;

pub use cache::TitleCache;
pub use engine::{EnrichmentEngine, EnrichmentSummary};
pub use providers::{GoogleImageSearch, ImageSearch, MovieDetails, MovieSearch, TmdbClient};
