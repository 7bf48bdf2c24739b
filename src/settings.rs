use std::str::FromStr;
use std::time::Duration;

use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::Level;

use crate::dns::stackpath::{Credentials, DEFAULT_API_URL};
use crate::filter::{DomainFilter, ZoneIdFilter};
use crate::provider::ProviderConfig;

// Later entries override earlier ones.
static DEFAULT_PATHS: [&str; 2] = ["/etc/stackpath-dns/config", "config"];

pub const CLIENT_ID_ENV: &str = "STACKPATH_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "STACKPATH_CLIENT_SECRET";
pub const STACK_ID_ENV: &str = "STACKPATH_STACK_ID";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Json,
}

/// The config file as written.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    stack_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    api_url: Option<String>,
    request_timeout: Option<String>,
    dry_run: bool,
    testing: bool,
    domain_filter: Vec<String>,
    exclude_domains: Vec<String>,
    zone_id_filter: Vec<String>,
    log_level: Option<String>,
    log_format: LogFormat,
}

/// Where and how to reach the StackPath API.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub url: String,
    pub stack_id: String,
    pub credentials: Credentials,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` in test mode, where the built-in fixture replaces the API.
    pub api: Option<ApiSettings>,
    pub dry_run: bool,
    pub testing: bool,
    pub domain_filter: DomainFilter,
    pub zone_id_filter: ZoneIdFilter,
    pub log_level: Level,
    pub log_format: LogFormat,
}

impl Settings {
    /// Loads `path`, or whichever default locations exist, then applies
    /// `STACKPATH_*` environment overrides. An explicit path must exist.
    pub fn new(path: Option<&str>) -> Result<Self, SettingsError> {
        let builder = match path {
            Some(path) => Config::builder()
                .add_source(File::new(&shellexpand::tilde(path), FileFormat::Toml)),
            None => DEFAULT_PATHS
                .iter()
                .fold(Config::builder(), |builder, name| {
                    builder.add_source(File::with_name(name).required(false))
                }),
        };

        Self::from_config(builder.build()?, |key| std::env::var(key).ok())
    }

    /// Builds settings from config file contents and an environment lookup.
    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder();
        if let Some(contents) = file {
            builder = builder.add_source(File::from_str(contents, FileFormat::Toml));
        }

        Self::from_config(builder.build()?, env)
    }

    fn from_config<F>(cfg: Config, env: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: FileSettings = cfg.try_deserialize()?;

        // Only file values are expanded; environment values are taken verbatim.
        let expand = |value: String| -> String {
            shellexpand::env_with_context_no_errors(&value, |var| env(var)).into_owned()
        };
        let lookup = |key: &'static str, from_file: Option<String>| -> Option<String> {
            env(key)
                .or_else(|| from_file.map(expand))
                .filter(|v| !v.is_empty())
        };

        let client_id = lookup(CLIENT_ID_ENV, raw.client_id);
        let client_secret = lookup(CLIENT_SECRET_ENV, raw.client_secret);
        let stack_id = lookup(STACK_ID_ENV, raw.stack_id);

        let api = if raw.testing {
            None
        } else {
            let timeout = raw
                .request_timeout
                .map(|t| humantime::parse_duration(&t))
                .transpose()?;

            Some(ApiSettings {
                url: raw.api_url.map(expand).unwrap_or_else(|| DEFAULT_API_URL.to_owned()),
                stack_id: stack_id.ok_or(SettingsError::Missing(STACK_ID_ENV))?,
                credentials: Credentials {
                    client_id: client_id.ok_or(SettingsError::Missing(CLIENT_ID_ENV))?,
                    client_secret: client_secret
                        .ok_or(SettingsError::Missing(CLIENT_SECRET_ENV))?,
                },
                timeout,
            })
        };

        let log_level = match raw.log_level {
            Some(level) => Level::from_str(&level).map_err(|_| SettingsError::LogLevel(level))?,
            None => Level::INFO,
        };

        Ok(Self {
            api,
            dry_run: raw.dry_run,
            testing: raw.testing,
            domain_filter: DomainFilter::with_exclusions(raw.domain_filter, raw.exclude_domains),
            zone_id_filter: ZoneIdFilter::new(raw.zone_id_filter),
            log_level,
            log_format: raw.log_format,
        })
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            domain_filter: self.domain_filter.clone(),
            zone_id_filter: self.zone_id_filter.clone(),
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid request_timeout: {0}")]
    Timeout(#[from] humantime::DurationError),
    #[error("invalid log_level {0:?}")]
    LogLevel(String),
}
