//! # rb-config
//!
//! Layered settings for the Rusty-Blog binary, lowest precedence first:
//! built-in defaults, `config/default.toml` (optional), `.env`, then
//! `RUSTY_BLOG__SECTION__KEY` environment variables.

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "RUSTY_BLOG";
pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
/// Longest session lifetime accepted for `session.ttl_days`.
pub const MAX_SESSION_TTL_DAYS: i64 = 365;
/// Overrides [`DEFAULT_CONFIG_FILE`].
pub const CONFIG_PATH_VAR: &str = "RUSTY_BLOG_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("failed to read .env: {0}")]
    DotEnv(dotenvy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub session: SessionSettings,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// e.g. `sqlite:rusty_blog.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    /// HMAC key for session cookies. Unset means a random per-process key.
    pub secret: Option<SecretString>,
    pub ttl_days: i64,
    /// Adds `Secure` to the cookie; turn on in production.
    pub secure_cookie: bool,
}

/// Account bootstrapped with the admin role at startup.
#[derive(Debug, Default, Deserialize)]
pub struct AdminSettings {
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogSettings {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl SessionSettings {
    /// The configured secret, if one is set and non-empty.
    pub fn secret_bytes(&self) -> Option<&[u8]> {
        self.secret
            .as_ref()
            .map(|s| s.expose_secret().as_bytes())
            .filter(|b| !b.is_empty())
    }
}

impl AdminSettings {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.expose_secret())),
            _ => None,
        }
    }
}

impl Settings {
    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }

    fn validate(self) -> Result<Self> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&self.session.ttl_days) {
            return Err(ConfigError::Invalid(format!(
                "session.ttl_days must be between 1 and {MAX_SESSION_TTL_DAYS}"
            )));
        }
        if self.admin.username.is_some() != self.admin.password.is_some() {
            return Err(ConfigError::Invalid(
                "admin.username and admin.password must be set together".into(),
            ));
        }
        Ok(self)
    }
}

/// Reads `.env`, the optional config file and the environment.
pub fn load() -> Result<Settings> {
    check_dotenv(dotenvy::dotenv().map(|_| ()))?;

    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let builder = defaults()?
        .add_source(File::with_name(&path).required(false))
        .add_source(env_source(ENV_PREFIX));
    finish(builder)
}

/// A missing `.env` is fine; one that exists but cannot be read is not.
fn check_dotenv(loaded: dotenvy::Result<()>) -> Result<()> {
    match loaded {
        Err(e) if !e.not_found() => Err(ConfigError::DotEnv(e)),
        _ => Ok(()),
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(config::Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080_i64)?
        .set_default("database.url", "sqlite:rusty_blog.db")?
        .set_default("database.max_connections", 5_i64)?
        .set_default("session.ttl_days", 7_i64)?
        .set_default("session.secure_cookie", false)?
        .set_default("log.json", false)?)
}

fn env_source(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Settings> {
    builder.build()?.try_deserialize::<Settings>()?.validate()
}
