use std::{
    net::{Ipv4Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context as _, anyhow};

use crate::FuelRates;

pub const DEFAULT_PORT: u16 = 8080;
/// Consecutive errors after which a session is abandoned.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;
pub const DEFAULT_TRACE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub fuel: FuelRates,
    pub error_threshold: u32,
    /// Buffered traces untouched for this long are dropped.
    pub trace_ttl: Duration,
    /// Read timeout per connection; `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// `None` keeps trips in memory.
    pub postgres: Option<PostgresConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: (Ipv4Addr::UNSPECIFIED, DEFAULT_PORT).into(),
            fuel: FuelRates::default(),
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            trace_ttl: DEFAULT_TRACE_TTL,
            idle_timeout: None,
            postgres: None,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_lookup`].
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration from a key lookup. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Fails when a listening, threshold, timeout or database value is set but
    /// cannot be parsed. Fuel values never fail, they fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let bind_address = if let Some(addr) = get("BIND_ADDRESS") {
            parse(&addr, "BIND_ADDRESS")?
        } else if let Some(port) = get("WEBSOCKET_PORT") {
            (Ipv4Addr::UNSPECIFIED, parse::<u16>(&port, "WEBSOCKET_PORT")?).into()
        } else {
            defaults.bind_address
        };

        let error_threshold = match get("ERROR_THRESHOLD") {
            Some(v) => parse::<u32>(&v, "ERROR_THRESHOLD")?,
            None => defaults.error_threshold,
        };
        if error_threshold == 0 {
            return Err(anyhow!("ERROR_THRESHOLD must be at least 1"));
        }

        let trace_ttl = match get("TRACE_TTL_SECS") {
            Some(v) => Duration::from_secs(parse(&v, "TRACE_TTL_SECS")?),
            None => defaults.trace_ttl,
        };
        // 0 disables the timeout like leaving it unset
        let idle_timeout = get("IDLE_TIMEOUT_SECS")
            .map(|v| parse::<u64>(&v, "IDLE_TIMEOUT_SECS"))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let postgres = get("POSTGRES_HOST")
            .map(|host| {
                Ok::<_, anyhow::Error>(PostgresConfig {
                    host,
                    port: get("POSTGRES_PORT")
                        .map(|v| parse(&v, "POSTGRES_PORT"))
                        .transpose()?
                        .unwrap_or(5432),
                    user: get("POSTGRES_USER").unwrap_or_else(|| "postgres".to_string()),
                    password: get("POSTGRES_PASSWORD"),
                    database: get("POSTGRES_DATABASE").unwrap_or_else(|| "fuelmeter".to_string()),
                })
            })
            .transpose()?;

        Ok(Self {
            bind_address,
            fuel: FuelRates::from_raw(
                get("FUEL_PRICE_PER_LITER").as_deref(),
                get("FUEL_EFFICIENCY").as_deref(),
            ),
            error_threshold,
            trace_ttl,
            idle_timeout,
            postgres,
        })
    }
}

fn parse<T>(value: &str, key: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: `{value}`"))
}
