use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use sqlx::ConnectOptions;

use crate::error::{Result, ShiftError};

/// Database configuration.
///
/// Either `url` is set, or the discrete connection fields are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the discrete fields.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_database")]
    pub database: String,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    /// Level sqlx logs executed statements at ("off", "trace", "debug", "info", ...).
    #[serde(default = "default_statement_log_level")]
    pub statement_log_level: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            database: default_database(),
            max_connections: default_max_connections(),
            pool_timeout_secs: default_pool_timeout(),
            statement_log_level: default_statement_log_level(),
        }
    }
}

impl DatabaseConfig {
    /// Configuration pointing at a connection URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Read `DATABASE_URL` and the `PG_*` variables, falling back to defaults.
    ///
    /// Unparseable or zero numeric values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str, default: String| {
            lookup(name).filter(|v| !v.is_empty()).unwrap_or(default)
        };
        let number = |name: &str| -> Option<u64> {
            let raw = lookup(name).filter(|v| !v.is_empty())?;
            match raw.parse::<u64>() {
                Ok(value) if value != 0 => Some(value),
                _ => {
                    tracing::warn!(variable = name, value = %raw, "Ignoring invalid value, using default");
                    None
                }
            }
        };

        Self {
            url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            host: text("PG_HOST", default_host()),
            port: number("PG_PORT")
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or_else(default_port),
            username: text("PG_USERNAME", String::new()),
            password: text("PG_PASSWORD", String::new()),
            database: text("PG_DATABASE", default_database()),
            max_connections: number("PG_MAX_CONNECTIONS")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or_else(default_max_connections),
            pool_timeout_secs: default_pool_timeout(),
            statement_log_level: default_statement_log_level(),
        }
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_secs)
    }

    /// Build driver connect options from this configuration.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let options = match &self.url {
            Some(url) => url
                .parse::<PgConnectOptions>()
                .map_err(|e| ShiftError::Config(format!("Invalid database URL: {}", e)))?,
            None => {
                let mut options = PgConnectOptions::new()
                    .host(&self.host)
                    .port(self.port)
                    .database(&self.database);
                if !self.username.is_empty() {
                    options = options.username(&self.username);
                }
                if !self.password.is_empty() {
                    options = options.password(&self.password);
                }
                options
            }
        };

        Ok(options.log_statements(self.statement_level()?))
    }

    fn statement_level(&self) -> Result<log::LevelFilter> {
        self.statement_log_level.parse().map_err(|_| {
            ShiftError::Config(format!(
                "Invalid statement_log_level: {}",
                self.statement_log_level
            ))
        })
    }

    /// Connection target with the password hidden, for logs.
    pub fn display_target(&self) -> String {
        match &self.url {
            Some(url) => mask_url_password(url),
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

fn mask_url_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.find('@') else {
        return url.to_string();
    };
    match rest[..at].find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end + 3],
            &rest[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_statement_log_level() -> String {
    "debug".to_string()
}
