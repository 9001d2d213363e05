use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::retry::RetryPolicy;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/parking";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub store: StoreBackend,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub retry: RetryPolicy,
    /// `None` disables the background reconciliation pass.
    pub reconcile_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Self {
        let store = match env::var("PARKING_STORE").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("postgres") | Err(_) => StoreBackend::Postgres,
            Ok(other) => {
                tracing::warn!("Config: unknown PARKING_STORE '{}', using postgres", other);
                StoreBackend::Postgres
            }
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or("STORE_RETRY_ATTEMPTS", defaults.max_attempts),
            base_backoff_ms: parse_or("STORE_RETRY_BASE_MS", defaults.base_backoff_ms),
        };

        let reconcile_secs = parse_or("RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS);

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            store,
            bind_addr: parse_or("BIND_ADDR", default_bind_addr()),
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            retry,
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    DEFAULT_BIND_ADDR
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3001)))
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Config: invalid {} '{}', using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_numbers_fall_back_to_default() {
        std::env::set_var("PARKING_TEST_RETRY_ATTEMPTS", "lots");
        assert_eq!(parse_or("PARKING_TEST_RETRY_ATTEMPTS", 4usize), 4);
        std::env::set_var("PARKING_TEST_RETRY_ATTEMPTS", " 7 ");
        assert_eq!(parse_or("PARKING_TEST_RETRY_ATTEMPTS", 4usize), 7);
        std::env::remove_var("PARKING_TEST_RETRY_ATTEMPTS");
    }

    #[test]
    fn default_bind_addr_parses() {
        assert_eq!(default_bind_addr().port(), 3001);
    }
}
