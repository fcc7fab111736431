//! Configuration module for the CAT engine.

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Address to bind the server to.
    pub bind_address: String,
    /// Prior variance used by the Newton-Raphson ability update.
    pub irt_prior_var: f64,
    /// Mean-SE threshold below which a session stops.
    pub stop_se_threshold: f64,
    /// Maximum Newton-Raphson iterations per ability update.
    pub irt_max_iterations: u32,
    /// Window size for "recent responses" queries.
    pub recent_responses_limit: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env_var("DATABASE_URL")?,
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8080"),
            irt_prior_var: env_var_parsed_or("IRT_PRIOR_VAR", 1.0)?,
            stop_se_threshold: env_var_parsed_or("STOP_SE_THRESHOLD", 0.30)?,
            irt_max_iterations: env_var_parsed_or("IRT_MAX_ITERATIONS", 25)?,
            recent_responses_limit: env_var_parsed_or("RECENT_RESPONSES_LIMIT", 200)?,
        })
    }
}

fn env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_var_parsed_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}
