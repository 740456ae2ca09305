//! Resilient remote calls: retry with exponential backoff and jitter.
//!
//! Every remote operation (fetching the record, the batched write-back, each
//! reference lookup) goes through [`Retrier::run`]. Only transient errors are
//! retried; see [`SyncError::class`].

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_MAX_RETRIES: &str = "VAULTSYNC_MAX_RETRIES";
pub const ENV_INITIAL_DELAY: &str = "VAULTSYNC_RETRY_INITIAL_DELAY";
pub const ENV_BACKOFF: &str = "VAULTSYNC_RETRY_BACKOFF";
pub const ENV_MAX_DELAY: &str = "VAULTSYNC_RETRY_MAX_DELAY";
pub const ENV_JITTER: &str = "VAULTSYNC_RETRY_JITTER";
pub const ENV_DISABLE: &str = "VAULTSYNC_RETRY_DISABLE";
pub const ENV_QUIET: &str = "VAULTSYNC_RETRY_QUIET";

const MAX_RETRIES_RANGE: RangeInclusive<u32> = 0..=10;
const INITIAL_DELAY_RANGE: RangeInclusive<f64> = 0.1..=10.0;
const MULTIPLIER_RANGE: RangeInclusive<f64> = 1.5..=5.0;
const MAX_DELAY_RANGE: RangeInclusive<f64> = 5.0..=300.0;
const MAX_JITTER_FRACTION: f64 = 0.25;

/// Retry behaviour for remote calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Growth factor applied per retry.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Shave a random 0-25% off each delay.
    pub jitter: bool,
    /// Make exactly one attempt.
    pub disabled: bool,
    /// Log retries at debug instead of warn.
    pub quiet: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
            disabled: false,
            quiet: false,
        }
    }
}

impl RetryConfig {
    /// Sets the number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, starting from the defaults.
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = raw
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_MAX_RETRIES, &raw))?;
        }
        if let Some(raw) = lookup(ENV_INITIAL_DELAY) {
            config.initial_delay = parse_seconds(ENV_INITIAL_DELAY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_BACKOFF) {
            config.backoff_multiplier = raw
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_BACKOFF, &raw))?;
        }
        if let Some(raw) = lookup(ENV_MAX_DELAY) {
            config.max_delay = parse_seconds(ENV_MAX_DELAY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_JITTER) {
            config.jitter = parse_bool(ENV_JITTER, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DISABLE) {
            config.disabled = parse_bool(ENV_DISABLE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_QUIET) {
            config.quiet = parse_bool(ENV_QUIET, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks every value against its allowed range. Nothing is clamped.
    pub fn validate(&self) -> SyncResult<()> {
        if !MAX_RETRIES_RANGE.contains(&self.max_retries) {
            return Err(out_of_range("max_retries", self.max_retries, "0-10"));
        }
        let initial = self.initial_delay.as_secs_f64();
        if !INITIAL_DELAY_RANGE.contains(&initial) {
            return Err(out_of_range("initial_delay", initial, "0.1-10 seconds"));
        }
        if !MULTIPLIER_RANGE.contains(&self.backoff_multiplier) {
            return Err(out_of_range(
                "backoff_multiplier",
                self.backoff_multiplier,
                "1.5-5",
            ));
        }
        let max = self.max_delay.as_secs_f64();
        if !MAX_DELAY_RANGE.contains(&max) {
            return Err(out_of_range("max_delay", max, "5-300 seconds"));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (0 for the first retry), before jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Delay before retry number `retry`, jitter applied.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !self.jitter {
            return base;
        }
        let reduction = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
        base.mul_f64(1.0 - reduction)
    }

    /// Total attempts a permanently failing transient operation receives.
    pub fn max_attempts(&self) -> u32 {
        if self.disabled {
            1
        } else {
            self.max_retries + 1
        }
    }
}

fn invalid(key: &str, raw: &str) -> SyncError {
    SyncError::Config(format!("{key}: cannot parse {raw:?}"))
}

fn out_of_range(name: &str, value: impl std::fmt::Display, range: &str) -> SyncError {
    SyncError::Config(format!("{name} = {value} is outside the allowed range {range}"))
}

fn parse_seconds(key: &str, raw: &str) -> SyncResult<Duration> {
    let secs: f64 = raw.trim().parse().map_err(|_| invalid(key, raw))?;
    Duration::try_from_secs_f64(secs).map_err(|_| invalid(key, raw))
}

fn parse_bool(key: &str, raw: &str) -> SyncResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(key, raw)),
    }
}

/// Runs remote operations under a validated [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    /// Creates a retrier, rejecting out-of-range configuration.
    pub fn new(config: RetryConfig) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// A retrier that makes exactly one attempt.
    pub fn single_attempt() -> Self {
        Self {
            config: RetryConfig {
                disabled: true,
                ..RetryConfig::default()
            },
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The last error is returned exactly as the operation produced it.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!("{} failed permanently: {}", operation, err);
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!(
                    "{} failed after {} attempt(s): {}",
                    operation, attempt, err
                );
                return Err(err);
            }

            let delay = self.config.delay_for(attempt - 1);
            if self.config.quiet {
                debug!(
                    "{} attempt {}/{} failed ({}), retrying in {:?}",
                    operation, attempt, max_attempts, err, delay
                );
            } else {
                warn!(
                    "{} attempt {}/{} failed ({}), retrying in {:?}",
                    operation, attempt, max_attempts, err, delay
                );
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }
}
