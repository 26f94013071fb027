pub mod catalog;
pub mod config;
pub mod database;
pub mod datafusion_engine;
pub mod domain;
pub mod engine;
pub mod error;
pub mod generation;
pub mod loader;
pub mod models;
pub mod profiler;
pub mod prompt;
pub mod report;
pub mod rows;
pub mod sanitizer;
pub mod schema;
pub mod store;

pub use config::Config;
pub use engine::AnalysisEngine;
pub use error::AnalysisError;
