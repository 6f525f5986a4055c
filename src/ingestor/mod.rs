pub mod download;
pub mod ingest_guide;
pub mod state_manager;

pub use ingest_guide::GuideIngestor;
pub use state_manager::IngestionStateManager;
