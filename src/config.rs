//! Environment-driven configuration.

use std::num::NonZeroUsize;
use std::time::Duration;
use std::{env, num};

use thiserror::Error;

use crate::pipeline::PipelineSettings;
use crate::pipeline::stage::ScanCaps;
use crate::util::retry::RetryConfig;

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    db_dsn: String,
    max_concurrency: NonZeroUsize,
    stage_timeout: Duration,
    fetch_timeout: Duration,
    upsert_timeout: Duration,
    citation_scan_soft_cap: usize,
    court_content_scan_window: usize,
    judge_content_scan_window: usize,
    rate_floor: u32,
    rate_pause: Duration,
    purchase_budget_cents: u64,
    http_max_retries: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,
    batch_max_records: Option<NonZeroUsize>,
    db_max_connections: u32,
    db_min_connections: u32,
    db_acquire_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Load and validate configuration from the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when `CASELAW_DB_DSN` is unset or any value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_dsn = env_var("CASELAW_DB_DSN")?;

        let max_concurrency = parse_non_zero_usize("PIPELINE_MAX_CONCURRENCY", 5)?;
        let stage_timeout = parse_duration_ms("PIPELINE_STAGE_TIMEOUT_MS", 5_000)?;
        let fetch_timeout = parse_duration_ms("PIPELINE_FETCH_TIMEOUT_MS", 30_000)?;
        let upsert_timeout = parse_duration_ms("PIPELINE_UPSERT_TIMEOUT_MS", 10_000)?;

        let citation_scan_soft_cap = parse_usize("CITATION_SCAN_SOFT_CAP", 250_000)?;
        let court_content_scan_window = parse_usize("COURT_CONTENT_SCAN_WINDOW", 2_000)?;
        let judge_content_scan_window = parse_usize("JUDGE_CONTENT_SCAN_WINDOW", 1_500)?;

        let rate_floor = parse_u32("SOURCE_RATE_FLOOR", 10)?;
        let rate_pause = parse_duration_ms("SOURCE_RATE_PAUSE_MS", 2_000)?;
        let purchase_budget_cents = parse_u64("PURCHASE_BUDGET_CENTS", 0)?;

        let http_max_retries = parse_usize("HTTP_MAX_RETRIES", 3)?;
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", 250)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", 10_000)?;

        let batch_max_records = parse_optional_non_zero_usize("BATCH_MAX_RECORDS")?;

        let db_max_connections = parse_u32("CASELAW_DB_MAX_CONNECTIONS", 20)?;
        let db_min_connections = parse_u32("CASELAW_DB_MIN_CONNECTIONS", 2)?;
        let db_acquire_timeout = parse_duration_secs("CASELAW_DB_ACQUIRE_TIMEOUT_SECS", 30)?;

        Ok(Self {
            db_dsn,
            max_concurrency,
            stage_timeout,
            fetch_timeout,
            upsert_timeout,
            citation_scan_soft_cap,
            court_content_scan_window,
            judge_content_scan_window,
            rate_floor,
            rate_pause,
            purchase_budget_cents,
            http_max_retries,
            http_backoff_base_ms,
            http_backoff_cap_ms,
            batch_max_records,
            db_max_connections,
            db_min_connections,
            db_acquire_timeout,
        })
    }

    #[must_use]
    pub fn db_dsn(&self) -> &str {
        &self.db_dsn
    }

    #[must_use]
    pub fn batch_max_records(&self) -> Option<NonZeroUsize> {
        self.batch_max_records
    }

    #[must_use]
    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    #[must_use]
    pub fn db_min_connections(&self) -> u32 {
        self.db_min_connections
    }

    #[must_use]
    pub fn db_acquire_timeout(&self) -> Duration {
        self.db_acquire_timeout
    }

    /// Pipeline runtime knobs derived from this configuration.
    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_concurrency: self.max_concurrency.get(),
            stage_timeout: self.stage_timeout,
            fetch_timeout: self.fetch_timeout,
            upsert_timeout: self.upsert_timeout,
            scan_caps: ScanCaps {
                citation_soft_cap: self.citation_scan_soft_cap,
                court_content_window: self.court_content_scan_window,
                judge_content_window: self.judge_content_scan_window,
            },
            rate_floor: self.rate_floor,
            rate_pause: self.rate_pause,
            purchase_budget_cents: self.purchase_budget_cents,
            retry: RetryConfig::new(
                self.http_max_retries,
                self.http_backoff_base_ms,
                self.http_backoff_cap_ms,
            ),
        }
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    parse_with(name, default, str::parse::<usize>)
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    parse_with(name, default, str::parse::<u32>)
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    parse_with(name, default, str::parse::<u64>)
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_u64(name, default_ms)?))
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parse_u64(name, default_secs)?))
}

fn parse_non_zero_usize(
    name: &'static str,
    default: usize,
) -> Result<NonZeroUsize, ConfigError> {
    let value = parse_usize(name, default)?;
    NonZeroUsize::new(value).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_optional_non_zero_usize(
    name: &'static str,
) -> Result<Option<NonZeroUsize>, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => {
            let value: usize = raw.parse().map_err(|e: num::ParseIntError| {
                ConfigError::Invalid {
                    name,
                    source: e.into(),
                }
            })?;
            NonZeroUsize::new(value)
                .map(Some)
                .ok_or_else(|| ConfigError::Invalid {
                    name,
                    source: anyhow::anyhow!("must be greater than zero"),
                })
        }
    }
}

fn parse_with<T, F, E>(name: &'static str, default: T, parse: F) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => parse(&raw).map_err(|e| ConfigError::Invalid {
            name,
            source: e.into(),
        }),
    }
}
