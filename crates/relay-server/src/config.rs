use std::path::PathBuf;
use std::time::Duration;

use relay_db::TableName;
use relay_notify::PollerConfig;
use relay_telegram::client::DEFAULT_API_URL;

/// Signing secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "changeme",
    "secret",
    "your-secret-here",
    "SUPER_SECRET_KEY_123",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{0} is still a placeholder value")]
    Placeholder(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub send_secret: String,
    pub db_path: PathBuf,
    pub subscriber_table: TableName,
    pub catalog_tables: Vec<TableName>,
    pub poll_interval: Duration,
    pub poll_batch_size: u32,
    pub bot_username: Option<String>,
    pub api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = var("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let send_secret = var("SEND_SECRET").ok_or(ConfigError::Missing("SEND_SECRET"))?;
        if PLACEHOLDER_SECRETS
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&send_secret))
        {
            return Err(ConfigError::Placeholder("SEND_SECRET"));
        }

        let db_path: PathBuf = var("RELAY_DB_PATH").unwrap_or_else(|| "relay.db".into()).into();

        let subscriber_table = table_name(
            "SUBSCRIBER_TABLE",
            &var("SUBSCRIBER_TABLE").unwrap_or_else(|| "bot_subscribers".into()),
        )?;

        let raw_tables = var("CATALOG_TABLES").unwrap_or_else(|| "movies,movie_items".into());
        let catalog_tables = raw_tables
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| table_name("CATALOG_TABLES", t))
            .collect::<Result<Vec<_>, _>>()?;
        if catalog_tables.is_empty() {
            return Err(ConfigError::Invalid { name: "CATALOG_TABLES", value: raw_tables });
        }

        let poll_interval = Duration::from_secs(number("POLL_INTERVAL_SECS", var("POLL_INTERVAL_SECS"), 60)?);
        let poll_batch_size = number("POLL_BATCH_SIZE", var("POLL_BATCH_SIZE"), 50)?;

        let bot_username = var("BOT_USERNAME").map(|u| u.trim_start_matches('@').to_string());
        let api_url = var("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());

        Ok(Self {
            bot_token,
            send_secret,
            db_path,
            subscriber_table,
            catalog_tables,
            poll_interval,
            poll_batch_size,
            bot_username,
            api_url,
        })
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog_tables.iter().map(|t| t.to_string()).collect()
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            tables: self.table_names(),
            interval: self.poll_interval,
            batch_size: self.poll_batch_size,
        }
    }
}

fn table_name(name: &'static str, value: &str) -> Result<TableName, ConfigError> {
    TableName::new(value).map_err(|_| ConfigError::Invalid { name, value: value.to_string() })
}

/// Positive integer with a default.
fn number<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(value) = value else {
        return Ok(default);
    };
    match value.parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}
