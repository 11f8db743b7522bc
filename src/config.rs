//! Configuration Module
//!
//! Handles loading and validating engine and server configuration from
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Engine and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on the summed size of all stored entries
    pub capacity_bytes: usize,
    /// TTL in milliseconds for keys that match no key class
    pub default_ttl_ms: u64,
    /// Fraction of the TTL after which an entry counts as stale
    pub stale_ratio: f64,
    /// Number of keys reported in the hot-key ranking
    pub hot_keys_limit: usize,
    /// Gzip level (0-9) used by the compression transform
    pub compression_level: u32,
    /// Hex-encoded 32 byte AES-256 key; a random key is generated when unset
    pub encryption_key: Option<String>,
    /// Expired-entry sweep interval in seconds, 0 disables the sweep
    pub sweep_interval_secs: u64,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY_BYTES` - Capacity bound in bytes (default: 64 MiB)
    /// - `CACHE_DEFAULT_TTL_MS` - Fallback TTL in milliseconds (default: 60000)
    /// - `CACHE_STALE_RATIO` - Stale threshold as fraction of TTL (default: 0.8)
    /// - `CACHE_HOT_KEYS` - Hot keys reported by stats (default: 10)
    /// - `CACHE_COMPRESSION_LEVEL` - Gzip level (default: 6)
    /// - `CACHE_ENCRYPTION_KEY` - Hex AES-256 key (default: random per process)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Expired sweep interval (default: 0, disabled)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity_bytes: env_or("CACHE_CAPACITY_BYTES", defaults.capacity_bytes),
            default_ttl_ms: env_or("CACHE_DEFAULT_TTL_MS", defaults.default_ttl_ms),
            stale_ratio: env_or("CACHE_STALE_RATIO", defaults.stale_ratio),
            hot_keys_limit: env_or("CACHE_HOT_KEYS", defaults.hot_keys_limit),
            compression_level: env_or("CACHE_COMPRESSION_LEVEL", defaults.compression_level),
            encryption_key: env::var("CACHE_ENCRYPTION_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            sweep_interval_secs: env_or("CACHE_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Checks that the configuration describes a usable engine.
    pub fn validate(&self) -> Result<()> {
        if self.capacity_bytes == 0 {
            return Err(CacheError::Config(
                "capacity_bytes must be greater than zero".to_string(),
            ));
        }
        if !(self.stale_ratio > 0.0 && self.stale_ratio <= 1.0) {
            return Err(CacheError::Config(format!(
                "stale_ratio must be in (0, 1], got {}",
                self.stale_ratio
            )));
        }
        if self.compression_level > 9 {
            return Err(CacheError::Config(format!(
                "compression_level must be in 0..=9, got {}",
                self.compression_level
            )));
        }
        self.encryption_key_bytes()?;
        Ok(())
    }

    /// Decodes the configured encryption key, if any.
    pub fn encryption_key_bytes(&self) -> Result<Option<[u8; 32]>> {
        let Some(encoded) = &self.encryption_key else {
            return Ok(None);
        };
        let raw = hex::decode(encoded.trim())
            .map_err(|e| CacheError::Config(format!("encryption key is not valid hex: {e}")))?;
        let key: [u8; 32] = raw.try_into().map_err(|raw: Vec<u8>| {
            CacheError::Config(format!(
                "encryption key must be 32 bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Some(key))
    }

    /// Interval of the expired-entry sweep, `None` when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity_bytes: 64 * 1024 * 1024,
            default_ttl_ms: 60_000,
            stale_ratio: 0.8,
            hot_keys_limit: 10,
            compression_level: 6,
            encryption_key: None,
            sweep_interval_secs: 0,
            server_port: 3000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.capacity_bytes, 64 * 1024 * 1024);
        assert_eq!(config.default_ttl_ms, 60_000);
        assert_eq!(config.stale_ratio, 0.8);
        assert_eq!(config.server_port, 3000);
        assert!(config.sweep_interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_CAPACITY_BYTES");
        env::remove_var("CACHE_DEFAULT_TTL_MS");
        env::remove_var("CACHE_STALE_RATIO");
        env::remove_var("CACHE_ENCRYPTION_KEY");
        env::remove_var("SERVER_PORT");

        let config = Config::from_env();
        assert_eq!(config.capacity_bytes, 64 * 1024 * 1024);
        assert_eq!(config.default_ttl_ms, 60_000);
        assert_eq!(config.server_port, 3000);
        assert!(config.encryption_key.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = Config {
            capacity_bytes: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_stale_ratio() {
        let config = Config {
            stale_ratio: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_encryption_key_decoding() {
        let config = Config {
            encryption_key: Some("ab".repeat(32)),
            ..Config::default()
        };
        assert_eq!(config.encryption_key_bytes().unwrap(), Some([0xab; 32]));

        let short = Config {
            encryption_key: Some("abcd".to_string()),
            ..Config::default()
        };
        assert!(short.validate().is_err());

        let not_hex = Config {
            encryption_key: Some("zz".repeat(32)),
            ..Config::default()
        };
        assert!(not_hex.validate().is_err());
    }

    #[test]
    fn test_sweep_interval() {
        let config = Config {
            sweep_interval_secs: 5,
            ..Config::default()
        };
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(5)));
    }
}
