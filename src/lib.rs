pub mod assets;
pub mod config;
pub mod database;
pub mod enrichment;
pub mod errors;
pub mod ingestor;
pub mod mapper;
pub mod models;
pub mod pipeline;
pub mod reload;
pub mod synthesizer;
pub mod utils;
pub mod xmltv;
