use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// Argon2 cost parameters. Defaults match `argon2::Params::default()`.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub password_hash: PasswordHashConfig,
    pub reset_url_base: Url,
    /// `None` when `SMTP_HOST` is unset; outbound mail is then disabled.
    pub smtp: Option<SmtpConfig>,
}

const DEFAULT_RESET_URL: &str = "http://localhost/halo-kaka-project/frontend/lupa-password.html";

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let host = get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&get, "APP_PORT", 5000)?;
        let listen_addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "APP_HOST",
                reason: e.to_string(),
            })?;

        let jwt = JwtConfig {
            secret: require("JWT_SECRET")?,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "halokaka".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "halokaka-users".into()),
        };

        let defaults = PasswordHashConfig::default();
        let password_hash = PasswordHashConfig {
            memory_kib: parse_or(&get, "PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&get, "PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&get, "PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        };

        let reset_url_raw = get("RESET_URL_BASE").unwrap_or_else(|| DEFAULT_RESET_URL.into());
        let reset_url_base = Url::parse(&reset_url_raw).map_err(|e| ConfigError::Invalid {
            var: "RESET_URL_BASE",
            reason: e.to_string(),
        })?;

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&get, "SMTP_PORT", 465)?,
                username: require("SMTP_USERNAME")?,
                password: require("SMTP_PASSWORD")?,
                from_name: get("MAIL_FROM_NAME").unwrap_or_else(|| "Halo KAKA Admin".into()),
            }),
            None => None,
        };

        Ok(Self {
            listen_addr,
            database_url: require("DATABASE_URL")?,
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt,
            password_hash,
            reset_url_base,
            smtp,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            var: key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
