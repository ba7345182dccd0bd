//! PostgreSQL connection pool with a fixed shape and exactly-once close.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Connection;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::health::HealthChecker;
use crate::error::AppError;

pub const MAX_CONNECTIONS: u32 = 4;
pub const MIN_CONNECTIONS: u32 = 1;
pub const MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(60);
/// Deadline for the startup probe and for acquiring a pooled connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the service's PostgreSQL pool.
///
/// Cloning is cheap; every clone refers to the same pool and the same
/// closed flag, so whichever clone closes first wins and later calls are
/// no-ops.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
    closed: Arc<AtomicBool>,
    /// Stops the background health checker when the pool is closed.
    shutdown: CancellationToken,
}

impl PostgresPool {
    /// Parse `dsn` (see [`parse_dsn`]), build the pool and verify the database answers within
    /// [`CONNECT_TIMEOUT`]. Starts the periodic health checker on success.
    pub async fn open(dsn: &str) -> Result<Self, AppError> {
        let options = parse_dsn(dsn).map_err(AppError::InvalidDsn)?;

        let pool = Self::from_pool(pool_options().connect_lazy_with(options));

        tracing::info!(
            dsn = %mask_dsn(dsn),
            max_connections = MAX_CONNECTIONS,
            min_connections = MIN_CONNECTIONS,
            "Connecting to PostgreSQL"
        );

        let probe = match timeout(CONNECT_TIMEOUT, pool.ping()).await {
            Ok(result) => result,
            Err(_) => Err(sqlx::Error::PoolTimedOut),
        };
        if let Err(e) = probe {
            pool.close().await;
            return Err(AppError::Connectivity(e));
        }

        HealthChecker::new(pool.clone(), HEALTH_CHECK_PERIOD).spawn();

        tracing::info!(
            pool_size = pool.size(),
            "PostgreSQL connection pool created"
        );

        Ok(pool)
    }

    /// Wrap an already configured sqlx pool without probing it.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            closed: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Acquire a connection and round-trip a ping on it.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await
    }

    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.pool.is_closed()
    }

    /// Token cancelled once the pool starts closing.
    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Close the pool gracefully.
    ///
    /// Returns `true` only for the call that actually closed the pool.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("PostgreSQL connection pool already closed");
            return false;
        }

        self.shutdown.cancel();
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
        true
    }
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(MIN_CONNECTIONS)
        .max_lifetime(MAX_LIFETIME)
        .idle_timeout(IDLE_TIMEOUT)
        .acquire_timeout(CONNECT_TIMEOUT)
}

/// Parse a connection string in URL form (`postgres://user@host/db`) or
/// libpq keyword/value form (`host=localhost user=app dbname=db`).
///
/// Keywords not set in the string fall back to the `PG*` environment
/// variables, as libpq does.
pub fn parse_dsn(dsn: &str) -> Result<PgConnectOptions, sqlx::Error> {
    let dsn = dsn.trim();
    if dsn.contains("://") {
        return PgConnectOptions::from_str(dsn);
    }

    let mut options = PgConnectOptions::new();
    for (key, value) in keyword_pairs(dsn)? {
        options = match key.as_str() {
            "host" | "hostaddr" if value.starts_with('/') => options.socket(&value),
            "host" | "hostaddr" => options.host(&value),
            "port" => {
                let port = value
                    .parse::<u16>()
                    .map_err(|_| config_error(format!("invalid port {value:?}")))?;
                options.port(port)
            }
            "user" => options.username(&value),
            "password" => options.password(&value),
            "dbname" => options.database(&value),
            "sslmode" => options.ssl_mode(value.parse()?),
            "sslrootcert" => options.ssl_root_cert(&value),
            "sslcert" => options.ssl_client_cert(&value),
            "sslkey" => options.ssl_client_key(&value),
            "application_name" => options.application_name(&value),
            // Connection attempts are bounded by CONNECT_TIMEOUT instead
            "connect_timeout" => options,
            _ => {
                return Err(config_error(format!(
                    "unknown connection parameter {key:?}"
                )))
            }
        };
    }
    Ok(options)
}

/// Split `key=value` pairs separated by whitespace. Values may be single
/// quoted; a backslash escapes the next character.
fn keyword_pairs(dsn: &str) -> Result<Vec<(String, String)>, sqlx::Error> {
    let mut pairs = Vec::new();
    let mut chars = dsn.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if key.is_empty() || chars.next() != Some('=') {
            return Err(config_error(format!(
                "expected key=value in connection string near {key:?}"
            )));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\\') => value.extend(chars.next()),
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => {
                        return Err(config_error(
                            "unterminated quoted value in connection string".to_string(),
                        ))
                    }
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    value.extend(chars.next());
                } else {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}

fn config_error(message: String) -> sqlx::Error {
    sqlx::Error::Configuration(message.into())
}

/// Mask the password in a connection string for safe logging.
pub fn mask_dsn(dsn: &str) -> String {
    if !dsn.contains("://") {
        return match keyword_pairs(dsn) {
            Ok(pairs) => pairs
                .into_iter()
                .map(|(key, value)| match key.as_str() {
                    "password" => format!("{key}=***"),
                    _ => format!("{key}={value}"),
                })
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => "***".to_string(),
        };
    }

    if let Some(at_pos) = dsn.find('@') {
        if let Some(colon_pos) = dsn[..at_pos].rfind(':') {
            // "user@host" without a password leaves only the scheme colon
            if !dsn[colon_pos..].starts_with("://") {
                let prefix = &dsn[..colon_pos + 1];
                let suffix = &dsn[at_pos..];
                return format!("{}***{}", prefix, suffix);
            }
        }
    }
    dsn.to_string()
}
