//! Application configuration loaded from environment variables.
//!
//! All timing knobs are milliseconds, matching the wire timestamp unit.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Maximum members per race room
    pub room_capacity: usize,
    /// Countdown between "all ready" and the synchronized start (ms)
    pub room_countdown_ms: i64,
    /// Long-poll timeout for ranking/room subscriptions (ms)
    pub subscribe_timeout_ms: u64,
    /// How long a confirmed remote sync counts as fresh (ms)
    pub freshness_ttl_ms: u64,
    /// Optional GeoJSON file with event courses, loaded at startup
    pub courses_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            room_capacity: parse_or("ROOM_CAPACITY", 8),
            room_countdown_ms: parse_or("ROOM_COUNTDOWN_MS", 10_000),
            subscribe_timeout_ms: parse_or("SUBSCRIBE_TIMEOUT_MS", 25_000),
            freshness_ttl_ms: parse_or("FRESHNESS_TTL_MS", 5_000),
            courses_path: env::var("COURSES_PATH").ok(),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            room_capacity: 8,
            room_countdown_ms: 10_000,
            subscribe_timeout_ms: 500,
            freshness_ttl_ms: 0,
            courses_path: None,
        }
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
