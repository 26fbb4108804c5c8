//! Command-line and environment configuration

use clap::{Parser, ValueEnum};
use common::database::DatabaseConfig;
use std::fmt;
use std::time::Duration;

use crate::{mailer::SmtpConfig, rate_limiter::RateLimiterConfig};

/// Version reported by `--version`, the healthcheck and `/debug/vars`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item catalog HTTP service
#[derive(Debug, Clone, Parser)]
#[command(name = "item-service", disable_version_flag = true)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "ITEMS_PORT", default_value_t = 80)]
    pub port: u16,

    /// Environment (development|staging|production)
    #[arg(long, env = "ITEMS_ENV", value_enum, default_value_t = Environment::Development)]
    pub env: Environment,

    /// PostgreSQL DSN
    #[arg(long = "db-dsn", env = "ITEMS_DB_DSN", default_value = "")]
    pub db_dsn: String,

    /// PostgreSQL max open connections
    #[arg(long = "db-max-open-conns", env = "ITEMS_DB_MAX_OPEN_CONNS", default_value_t = 25)]
    pub db_max_open_conns: u32,

    /// PostgreSQL max idle connections
    #[arg(long = "db-max-idle-conns", env = "ITEMS_DB_MAX_IDLE_CONNS", default_value_t = 25)]
    pub db_max_idle_conns: u32,

    /// PostgreSQL max connection idle time
    #[arg(
        long = "db-max-idle-time",
        env = "ITEMS_DB_MAX_IDLE_TIME",
        default_value = "15m",
        value_parser = humantime::parse_duration
    )]
    pub db_max_idle_time: Duration,

    /// Rate limiter maximum requests per second
    #[arg(long = "limiter-rps", env = "ITEMS_LIMITER_RPS", default_value_t = 2.0)]
    pub limiter_rps: f64,

    /// Rate limiter maximum burst
    #[arg(long = "limiter-burst", env = "ITEMS_LIMITER_BURST", default_value_t = 4)]
    pub limiter_burst: u32,

    /// Enable rate limiter
    #[arg(
        long = "limiter-enabled",
        env = "ITEMS_LIMITER_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub limiter_enabled: bool,

    /// SMTP host
    #[arg(long = "smtp-host", env = "ITEMS_SMTP_HOST", default_value = "smtp.mailtrap.io")]
    pub smtp_host: String,

    /// SMTP port
    #[arg(long = "smtp-port", env = "ITEMS_SMTP_PORT", default_value_t = 25)]
    pub smtp_port: u16,

    /// SMTP username
    #[arg(long = "smtp-username", env = "ITEMS_SMTP_USERNAME", default_value = "")]
    pub smtp_username: String,

    /// SMTP password
    #[arg(long = "smtp-password", env = "ITEMS_SMTP_PASSWORD", default_value = "")]
    pub smtp_password: String,

    /// SMTP sender
    #[arg(
        long = "smtp-sender",
        env = "ITEMS_SMTP_SENDER",
        default_value = "IMS <no-reply@fakemail.com>"
    )]
    pub smtp_sender: String,

    /// Trusted CORS origins (space separated)
    #[arg(
        long = "cors-trusted-origins",
        env = "ITEMS_CORS_TRUSTED_ORIGINS",
        default_value = "",
        value_parser = parse_origins
    )]
    pub cors_trusted_origins: Origins,

    /// Display version and exit
    #[arg(long)]
    pub version: bool,
}

/// Space-separated list of origins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origins(pub Vec<String>);

impl Origins {
    pub fn contains(&self, origin: &str) -> bool {
        self.0.iter().any(|trusted| trusted == origin)
    }
}

fn parse_origins(value: &str) -> Result<Origins, String> {
    Ok(Origins(value.split_whitespace().map(String::from).collect()))
}

impl Config {
    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig {
            database_url: self.db_dsn.clone(),
            max_open_conns: self.db_max_open_conns,
            max_idle_conns: self.db_max_idle_conns,
            max_idle_time: self.db_max_idle_time,
        }
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            enabled: self.limiter_enabled,
            rps: self.limiter_rps,
            burst: self.limiter_burst,
        }
    }

    pub fn smtp(&self) -> SmtpConfig {
        SmtpConfig {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            sender: self.smtp_sender.clone(),
        }
    }
}
