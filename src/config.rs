// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use dotenvy::dotenv;

/// Length of the human-shareable quiz code.
pub const QUIZ_CODE_LEN: usize = 6;

/// Maximum length of a participant display name.
pub const MAX_NAME_LEN: usize = 50;

/// Number of random base36 characters appended to a device token.
pub const DEVICE_TOKEN_SUFFIX_LEN: usize = 9;

/// How long a finished or unavailable run stays queryable before the registry drops it.
pub const FINISHED_RUN_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Default for `RUN_IDLE_TIMEOUT_SECS`.
pub const DEFAULT_RUN_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Period of the background registry sweep.
pub const RUN_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
    /// A live run untouched for this long is evicted. Its stored answers
    /// survive, so reopening resumes it.
    pub run_idle_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        let run_idle_timeout = env::var("RUN_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RUN_IDLE_TIMEOUT);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            bind_addr,
            cors_origins,
            run_idle_timeout,
        }
    }
}
