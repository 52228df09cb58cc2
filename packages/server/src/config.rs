use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::kernel::CLAUDE_3_7_SONNET;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub anthropic_base_url: String,
    pub pipeline: PipelineConfig,
}

/// Tunables for the summarization pipeline.
///
/// Collaborators receive these explicitly; nothing in the pipeline reads
/// the process environment at call time.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model used when the request does not name one
    pub default_model: String,
    /// Chunk budget in characters
    pub max_chunk_chars: usize,
    /// Completion attempts per chunk before it is marked failed
    pub max_chunk_attempts: i32,
    /// Wall-clock budget for one worker invocation
    pub time_budget_ms: u64,
    /// Safety margin subtracted from the budget
    pub budget_margin_ms: u64,
    /// Backoff after a rate-limited completion call
    pub rate_limit_backoff_ms: u64,
    /// Backoff after other transient completion failures
    pub retry_backoff_ms: u64,
    /// Summary job lease duration
    pub lease_duration_ms: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_model: CLAUDE_3_7_SONNET.to_string(),
            max_chunk_chars: 400_000,
            max_chunk_attempts: 3,
            time_budget_ms: 240_000,
            budget_margin_ms: 30_000,
            rate_limit_backoff_ms: 60_000,
            retry_backoff_ms: 5_000,
            lease_duration_ms: 600_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            anthropic_base_url: env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            pipeline: PipelineConfig {
                default_model: env::var("DEFAULT_MODEL")
                    .unwrap_or_else(|_| CLAUDE_3_7_SONNET.to_string()),
                max_chunk_chars: env::var("MAX_CHUNK_CHARS")
                    .unwrap_or_else(|_| "400000".to_string())
                    .parse()
                    .context("MAX_CHUNK_CHARS must be a valid number")?,
                max_chunk_attempts: env::var("MAX_CHUNK_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .context("MAX_CHUNK_ATTEMPTS must be a valid number")?,
                time_budget_ms: env::var("TIME_BUDGET_MS")
                    .unwrap_or_else(|_| "240000".to_string())
                    .parse()
                    .context("TIME_BUDGET_MS must be a valid number")?,
                budget_margin_ms: env::var("BUDGET_MARGIN_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()
                    .context("BUDGET_MARGIN_MS must be a valid number")?,
                rate_limit_backoff_ms: env::var("RATE_LIMIT_BACKOFF_MS")
                    .unwrap_or_else(|_| "60000".to_string())
                    .parse()
                    .context("RATE_LIMIT_BACKOFF_MS must be a valid number")?,
                retry_backoff_ms: env::var("RETRY_BACKOFF_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .context("RETRY_BACKOFF_MS must be a valid number")?,
                lease_duration_ms: env::var("LEASE_DURATION_MS")
                    .unwrap_or_else(|_| "600000".to_string())
                    .parse()
                    .context("LEASE_DURATION_MS must be a valid number")?,
            },
        })
    }
}
