use std::time::Duration;

use clap::{Args, ValueEnum};
use url::Url;

use crate::error::AnalysisError;

pub const DEFAULT_GENERATION_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub endpoint: Url,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MaterializationMode {
    /// A fresh engine instance per request.
    Ephemeral,
    /// One engine instance per dataset, reused across requests.
    Persistent,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub materialization: MaterializationMode,
    pub memory_limit_bytes: usize,
    pub memory_fraction: f64,
    /// Uploads larger than this are rejected before parsing.
    pub max_upload_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            materialization: MaterializationMode::Persistent,
            memory_limit_bytes: 2 * 1024 * 1024 * 1024,
            memory_fraction: 0.8,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub generation: GenerationConfig,
    pub engine: EngineConfig,
    /// PostgreSQL URL for session storage; in-memory storage when absent.
    pub database_url: Option<String>,
}

/// Flags and environment variables the binary reads its `Config` from.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, env = "GENERATION_ENDPOINT", default_value = DEFAULT_GENERATION_ENDPOINT)]
    pub endpoint: String,

    #[arg(long, env = "GENERATION_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    pub model: String,

    #[arg(long, env = "GENERATION_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    #[arg(long, env = "MATERIALIZATION", value_enum, default_value_t = MaterializationMode::Persistent)]
    pub materialization: MaterializationMode,

    #[arg(long, env = "ENGINE_MEMORY_LIMIT_MB", default_value_t = 2048)]
    pub memory_limit_mb: usize,

    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 16)]
    pub max_upload_mb: usize,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<Config, AnalysisError> {
        if self.api_key.trim().is_empty() {
            return Err(AnalysisError::ConfigError {
                message: "GEMINI_API_KEY must not be empty".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(AnalysisError::ConfigError {
                message: "generation timeout must be at least one second".to_string(),
            });
        }

        if self.max_upload_mb == 0 {
            return Err(AnalysisError::ConfigError {
                message: "upload limit must be at least one megabyte".to_string(),
            });
        }

        let endpoint = Url::parse(&self.endpoint).map_err(|e| AnalysisError::ConfigError {
            message: format!("Invalid generation endpoint '{}': {}", self.endpoint, e),
        })?;

        Ok(Config {
            generation: GenerationConfig {
                api_key: self.api_key,
                endpoint,
                model: self.model,
                timeout: Duration::from_secs(self.timeout_secs),
            },
            engine: EngineConfig {
                materialization: self.materialization,
                memory_limit_bytes: self.memory_limit_mb * 1024 * 1024,
                max_upload_bytes: self.max_upload_mb * 1024 * 1024,
                ..EngineConfig::default()
            },
            database_url: self.database_url.filter(|url| !url.trim().is_empty()),
        })
    }
}

/// Hides the credentials part of a connection URL for logging.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparseable url>".to_string(),
    }
}
