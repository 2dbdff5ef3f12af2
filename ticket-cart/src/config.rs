//! Sync engine configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::expiry::ExpiryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Quiet period before local edits are written back
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

/// Countdown refresh period
pub const DEFAULT_COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Errors that can occur while loading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but does not parse
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },

    /// Values parse but contradict each other
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Configuration of the cart sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period before a local change is written back (`CART_SYNC_DEBOUNCE_MS`)
    pub debounce: Duration,
    /// Hold window and warning threshold
    /// (`CART_EXPIRY_WINDOW_SECS`, `CART_EXPIRY_WARNING_SECS`)
    pub expiry: ExpiryPolicy,
    /// Countdown refresh period (`CART_COUNTDOWN_TICK_MS`)
    pub countdown_tick: Duration,
    /// Tax rate in basis points (`CART_TAX_RATE_BPS`)
    pub tax_rate_bps: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            expiry: ExpiryPolicy::default(),
            countdown_tick: DEFAULT_COUNTDOWN_TICK,
            tax_rate_bps: 0,
        }
    }
}

impl SyncConfig {
    /// Load configuration from the process environment
    ///
    /// Unset variables take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparsable value or
    /// the warning threshold exceeds the expiry window.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// ```
    /// use std::time::Duration;
    /// use ticket_cart::SyncConfig;
    ///
    /// let config = SyncConfig::from_lookup(|name| match name {
    ///     "CART_SYNC_DEBOUNCE_MS" => Some("250".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.debounce, Duration::from_millis(250));
    /// assert_eq!(config.tax_rate_bps, 0);
    /// ```
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let debounce = parse(&lookup, "CART_SYNC_DEBOUNCE_MS")?
            .map_or(defaults.debounce, Duration::from_millis);
        let window = parse(&lookup, "CART_EXPIRY_WINDOW_SECS")?
            .map_or(defaults.expiry.window, Duration::from_secs);
        let warning = parse(&lookup, "CART_EXPIRY_WARNING_SECS")?
            .map_or(defaults.expiry.warning, Duration::from_secs);
        let countdown_tick = parse(&lookup, "CART_COUNTDOWN_TICK_MS")?
            .map_or(defaults.countdown_tick, Duration::from_millis);
        let tax_rate_bps = parse(&lookup, "CART_TAX_RATE_BPS")?.unwrap_or(defaults.tax_rate_bps);

        if warning > window {
            return Err(ConfigError::Inconsistent(format!(
                "expiry warning ({}s) exceeds expiry window ({}s)",
                warning.as_secs(),
                window.as_secs()
            )));
        }
        if countdown_tick.is_zero() {
            return Err(ConfigError::Inconsistent(
                "countdown tick must be positive".to_string(),
            ));
        }

        Ok(Self {
            debounce,
            expiry: ExpiryPolicy { window, warning },
            countdown_tick,
            tax_rate_bps,
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = SyncConfig::from_lookup(|_| None);
        assert_eq!(config, Ok(SyncConfig::default()));

        let config = SyncConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(800));
        assert_eq!(config.expiry.window, Duration::from_secs(900));
        assert_eq!(config.expiry.warning, Duration::from_secs(300));
        assert_eq!(config.countdown_tick, Duration::from_secs(1));
    }

    #[test]
    fn reads_every_variable() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("CART_SYNC_DEBOUNCE_MS", "100"),
            ("CART_EXPIRY_WINDOW_SECS", "600"),
            ("CART_EXPIRY_WARNING_SECS", " 60 "),
            ("CART_COUNTDOWN_TICK_MS", "250"),
            ("CART_TAX_RATE_BPS", "1800"),
        ]));

        assert_eq!(
            config,
            Ok(SyncConfig {
                debounce: Duration::from_millis(100),
                expiry: ExpiryPolicy {
                    window: Duration::from_secs(600),
                    warning: Duration::from_secs(60),
                },
                countdown_tick: Duration::from_millis(250),
                tax_rate_bps: 1_800,
            })
        );
    }

    #[test]
    fn rejects_unparsable_values() {
        let err = SyncConfig::from_lookup(lookup(&[("CART_TAX_RATE_BPS", "18%")]));
        assert!(matches!(
            err,
            Err(ConfigError::Invalid { name: "CART_TAX_RATE_BPS", ref value, .. }) if value == "18%"
        ));
    }

    #[test]
    fn rejects_warning_longer_than_window() {
        let err = SyncConfig::from_lookup(lookup(&[
            ("CART_EXPIRY_WINDOW_SECS", "60"),
            ("CART_EXPIRY_WARNING_SECS", "120"),
        ]));
        assert!(matches!(err, Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn rejects_zero_tick() {
        let err = SyncConfig::from_lookup(lookup(&[("CART_COUNTDOWN_TICK_MS", "0")]));
        assert!(matches!(err, Err(ConfigError::Inconsistent(_))));
    }
}
