//! Store connection settings sourced from the process environment.
//!
//! # Invariants
//! - `DB_URL` and `DB_NAME` are mandatory; empty values count as absent.
//! - Credentials are used only when both user and password are present.
//! - The password never appears in `Debug` output.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

pub const ENV_URL: &str = "DB_URL";
pub const ENV_USER: &str = "DB_USER";
pub const ENV_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_DATABASE: &str = "DB_NAME";

const MONGODB_SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Startup configuration failure. Fatal for the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required setting `{key}`"),
        }
    }
}

impl Error for ConfigError {}

/// Username/password pair for an authenticated connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings needed to open the process-wide store connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store address, with or without a `mongodb://` scheme.
    pub url: String,
    pub credentials: Option<Credentials>,
    /// Database selected for every collection operation.
    pub database: String,
}

impl StoreConfig {
    /// Reads `DB_URL`, `DB_USER`, `DB_PASSWORD` and `DB_NAME`.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let url = read(ENV_URL).ok_or(ConfigError::Missing(ENV_URL))?;
        let database = read(ENV_DATABASE).ok_or(ConfigError::Missing(ENV_DATABASE))?;
        let credentials = match (read(ENV_USER), read(ENV_PASSWORD)) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        Ok(Self {
            url,
            credentials,
            database,
        })
    }

    /// Connection string handed to the MongoDB driver.
    pub fn connection_uri(&self) -> String {
        if MONGODB_SCHEMES
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
        {
            self.url.clone()
        } else {
            format!("mongodb://{}", self.url)
        }
    }
}
