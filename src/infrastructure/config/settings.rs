use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

/// Prefix shared by every environment variable the service reads.
const ENV_PREFIX: &str = "SERVICE";

/// Directory searched for `default.*` and `{RUN_MODE}.*` config files.
const CONFIG_DIR: &str = "config";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// PostgreSQL connection string (`SERVICE_DSN`)
    #[serde(default)]
    pub dsn: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for the database queries behind one request, in seconds.
    /// Must not exceed `write_timeout_secs`.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Upper bound on producing any response, in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    /// Upper bound on waiting for in-flight requests after a signal
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    10
}

fn default_write_timeout() -> u64 {
    15
}

fn default_drain_timeout() -> u64 {
    10
}

impl Settings {
    /// Load settings from config files, `.env` and `SERVICE_*` variables.
    pub fn new() -> Result<Self, AppError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        Self::load(Some(Path::new(CONFIG_DIR)), environment())
    }

    /// Load settings from an explicit variable map only.
    ///
    /// Keys use the same `SERVICE_*` names. Neither the process environment
    /// nor config files on disk are consulted.
    pub fn from_env_map(vars: HashMap<String, String>) -> Result<Self, AppError> {
        Self::load(None, environment().source(Some(vars)))
    }

    /// Defaults, then `config_dir` files when given, then `environment`.
    fn load(config_dir: Option<&Path>, environment: Environment) -> Result<Self, AppError> {
        let mut builder = defaults()?;

        if let Some(dir) = config_dir {
            let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
            for name in ["default", run_mode.as_str()] {
                let path = dir.join(name);
                builder = builder.add_source(File::with_name(&path.to_string_lossy()).required(false));
            }
        }

        let settings: Settings = builder
            // SERVICE_DSN, SERVICE_SERVER__PORT, SERVICE_LOG__FORMAT, ...
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.dsn.trim().is_empty() {
            return Err(AppError::MissingDsn);
        }

        let server = &self.server;
        if server.write_timeout_secs == 0 {
            return Err(AppError::InvalidSetting(
                "server.write_timeout_secs must be at least 1".into(),
            ));
        }
        if !(1..=server.write_timeout_secs).contains(&server.request_timeout_secs) {
            return Err(AppError::InvalidSetting(format!(
                "server.request_timeout_secs must be between 1 and server.write_timeout_secs ({})",
                server.write_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.server.write_timeout_secs)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, AppError> {
    Ok(Config::builder()
        .set_default("server.host", default_host())?
        .set_default("server.port", i64::from(default_port()))?
        .set_default("server.request_timeout_secs", default_request_timeout() as i64)?
        .set_default("server.write_timeout_secs", default_write_timeout() as i64)?
        .set_default("shutdown.drain_timeout_secs", default_drain_timeout() as i64)?)
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}
