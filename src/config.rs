//! Configuration management via environment variables
//!
//! Loads configuration from environment variables with .env file support.
//! Follows 12-factor app principles for cloud-native deployments.

use std::env;
use std::time::Duration;

use crate::error::{FirewallError, Result};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub firewall: FirewallConfig,
}

/// Server binding configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub upstream_url: String,
    pub timeout: Duration,
    pub preserve_host: bool,
}

/// Inspection and rate-tracking settings
#[derive(Debug, Clone)]
pub struct FirewallConfig {
    pub window_secs: u64,
    pub base_allow_threshold: u32,
    pub base_throttle_threshold: u32,
    pub base_block_threshold: u32,
    pub allow_floor: u32,
    pub throttle_floor: u32,
    pub block_floor: u32,
    pub ban_duration_secs: u64,
    pub throttle_delay: Duration,
    pub decay_rate_per_sec: f64,
    pub csrf_block_threshold: f64,
    pub csrf_safe_origin: String,
    pub event_log_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Reads .env file if present, then parses environment variables.
    /// Returns error if required variables are missing or invalid.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            server: ServerConfig::from_env()?,
            proxy: ProxyConfig::from_env()?,
            firewall: FirewallConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| FirewallError::Config(format!("Invalid SERVER_PORT: {}", e)))?;

        Ok(Self { host, port })
    }
}

impl ProxyConfig {
    fn from_env() -> Result<Self> {
        let upstream_url = env::var("PROXY_UPSTREAM_URL")
            .map_err(|_| FirewallError::Config("PROXY_UPSTREAM_URL is required".to_string()))?;

        let timeout_secs = env::var("PROXY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|e| FirewallError::Config(format!("Invalid PROXY_TIMEOUT_SECS: {}", e)))?;

        let preserve_host = env::var("PROXY_PRESERVE_HOST")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .map_err(|e| FirewallError::Config(format!("Invalid PROXY_PRESERVE_HOST: {}", e)))?;

        Ok(Self {
            upstream_url,
            timeout: Duration::from_secs(timeout_secs),
            preserve_host,
        })
    }
}

impl FirewallConfig {
    fn from_env() -> Result<Self> {
        let window_secs = env::var("FIREWALL_WINDOW_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map_err(|e| FirewallError::Config(format!("Invalid FIREWALL_WINDOW_SECS: {}", e)))?;

        let base_allow_threshold = env::var("FIREWALL_BASE_ALLOW_THRESHOLD")
            .unwrap_or_else(|_| "50".to_string())
            .parse::<u32>()
            .map_err(|e| {
                FirewallError::Config(format!("Invalid FIREWALL_BASE_ALLOW_THRESHOLD: {}", e))
            })?;

        let base_throttle_threshold = env::var("FIREWALL_BASE_THROTTLE_THRESHOLD")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u32>()
            .map_err(|e| {
                FirewallError::Config(format!("Invalid FIREWALL_BASE_THROTTLE_THRESHOLD: {}", e))
            })?;

        let base_block_threshold = env::var("FIREWALL_BASE_BLOCK_THRESHOLD")
            .unwrap_or_else(|_| "90".to_string())
            .parse::<u32>()
            .map_err(|e| {
                FirewallError::Config(format!("Invalid FIREWALL_BASE_BLOCK_THRESHOLD: {}", e))
            })?;

        if base_allow_threshold >= base_throttle_threshold
            || base_throttle_threshold >= base_block_threshold
        {
            return Err(FirewallError::Config(
                "FIREWALL_BASE_ALLOW_THRESHOLD < FIREWALL_BASE_THROTTLE_THRESHOLD < \
                 FIREWALL_BASE_BLOCK_THRESHOLD must hold"
                    .to_string(),
            ));
        }

        let allow_floor = env::var("FIREWALL_ALLOW_FLOOR")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .map_err(|e| FirewallError::Config(format!("Invalid FIREWALL_ALLOW_FLOOR: {}", e)))?;

        let throttle_floor = env::var("FIREWALL_THROTTLE_FLOOR")
            .unwrap_or_else(|_| "20".to_string())
            .parse::<u32>()
            .map_err(|e| {
                FirewallError::Config(format!("Invalid FIREWALL_THROTTLE_FLOOR: {}", e))
            })?;

        let block_floor = env::var("FIREWALL_BLOCK_FLOOR")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u32>()
            .map_err(|e| FirewallError::Config(format!("Invalid FIREWALL_BLOCK_FLOOR: {}", e)))?;

        if allow_floor >= throttle_floor || throttle_floor >= block_floor {
            return Err(FirewallError::Config(
                "FIREWALL_ALLOW_FLOOR < FIREWALL_THROTTLE_FLOOR < FIREWALL_BLOCK_FLOOR must hold"
                    .to_string(),
            ));
        }

        if allow_floor > base_allow_threshold
            || throttle_floor > base_throttle_threshold
            || block_floor > base_block_threshold
        {
            return Err(FirewallError::Config(
                "FIREWALL floors must not exceed their base thresholds".to_string(),
            ));
        }

        let ban_duration_secs = env::var("FIREWALL_BAN_DURATION_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .map_err(|e| {
                FirewallError::Config(format!("Invalid FIREWALL_BAN_DURATION_SECS: {}", e))
            })?;

        let throttle_delay_ms = env::var("FIREWALL_THROTTLE_DELAY_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse::<u64>()
            .map_err(|e| {
                FirewallError::Config(format!("Invalid FIREWALL_THROTTLE_DELAY_MS: {}", e))
            })?;

        let decay_rate_per_sec = env::var("FIREWALL_DECAY_RATE")
            .unwrap_or_else(|_| "0.05".to_string())
            .parse::<f64>()
            .map_err(|e| FirewallError::Config(format!("Invalid FIREWALL_DECAY_RATE: {}", e)))?;

        if decay_rate_per_sec < 0.0 {
            return Err(FirewallError::Config(
                "FIREWALL_DECAY_RATE must be non-negative".to_string(),
            ));
        }

        let csrf_block_threshold = env::var("FIREWALL_CSRF_BLOCK_THRESHOLD")
            .unwrap_or_else(|_| "3.0".to_string())
            .parse::<f64>()
            .map_err(|e| {
                FirewallError::Config(format!("Invalid FIREWALL_CSRF_BLOCK_THRESHOLD: {}", e))
            })?;

        if csrf_block_threshold < 0.0 {
            return Err(FirewallError::Config(
                "FIREWALL_CSRF_BLOCK_THRESHOLD must be non-negative".to_string(),
            ));
        }

        let csrf_safe_origin =
            env::var("FIREWALL_CSRF_SAFE_ORIGIN").unwrap_or_else(|_| "http://localhost".to_string());

        let event_log_capacity = env::var("FIREWALL_EVENT_LOG_CAPACITY")
            .unwrap_or_else(|_| "500".to_string())
            .parse::<usize>()
            .map_err(|e| {
                FirewallError::Config(format!("Invalid FIREWALL_EVENT_LOG_CAPACITY: {}", e))
            })?;

        Ok(Self {
            window_secs,
            base_allow_threshold,
            base_throttle_threshold,
            base_block_threshold,
            allow_floor,
            throttle_floor,
            block_floor,
            ban_duration_secs,
            throttle_delay: Duration::from_millis(throttle_delay_ms),
            decay_rate_per_sec,
            csrf_block_threshold,
            csrf_safe_origin,
            event_log_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        temp_env::with_vars_unset(vec!["SERVER_HOST", "SERVER_PORT"], || {
            let config = ServerConfig::from_env().unwrap();
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
        });
    }

    #[test]
    fn test_server_config_custom() {
        temp_env::with_vars(
            vec![
                ("SERVER_HOST", Some("0.0.0.0")),
                ("SERVER_PORT", Some("3000")),
            ],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.host, "0.0.0.0");
                assert_eq!(config.port, 3000);
            },
        );
    }

    #[test]
    fn test_proxy_config_required_upstream() {
        temp_env::with_var_unset("PROXY_UPSTREAM_URL", || {
            let result = ProxyConfig::from_env();
            assert!(result.is_err());
            assert!(
                result
                    .unwrap_err()
                    .to_string()
                    .contains("PROXY_UPSTREAM_URL")
            );
        });
    }

    #[test]
    fn test_proxy_config_with_defaults() {
        temp_env::with_vars(
            vec![
                ("PROXY_UPSTREAM_URL", Some("http://backend:8000")),
                ("PROXY_TIMEOUT_SECS", None),
                ("PROXY_PRESERVE_HOST", None),
            ],
            || {
                let config = ProxyConfig::from_env().unwrap();
                assert_eq!(config.upstream_url, "http://backend:8000");
                assert_eq!(config.timeout, Duration::from_secs(30));
                assert!(!config.preserve_host);
            },
        );
    }

    #[test]
    fn test_firewall_defaults() {
        temp_env::with_vars_unset(
            vec![
                "FIREWALL_WINDOW_SECS",
                "FIREWALL_BASE_ALLOW_THRESHOLD",
                "FIREWALL_BASE_THROTTLE_THRESHOLD",
                "FIREWALL_BASE_BLOCK_THRESHOLD",
                "FIREWALL_ALLOW_FLOOR",
                "FIREWALL_THROTTLE_FLOOR",
                "FIREWALL_BLOCK_FLOOR",
                "FIREWALL_BAN_DURATION_SECS",
                "FIREWALL_THROTTLE_DELAY_MS",
                "FIREWALL_DECAY_RATE",
                "FIREWALL_CSRF_BLOCK_THRESHOLD",
                "FIREWALL_CSRF_SAFE_ORIGIN",
                "FIREWALL_EVENT_LOG_CAPACITY",
            ],
            || {
                let config = FirewallConfig::from_env().unwrap();
                assert_eq!(config.window_secs, 10);
                assert_eq!(config.base_allow_threshold, 50);
                assert_eq!(config.base_throttle_threshold, 60);
                assert_eq!(config.base_block_threshold, 90);
                assert_eq!(config.allow_floor, 10);
                assert_eq!(config.throttle_floor, 20);
                assert_eq!(config.block_floor, 30);
                assert_eq!(config.ban_duration_secs, 60);
                assert_eq!(config.throttle_delay, Duration::from_millis(500));
                assert_eq!(config.decay_rate_per_sec, 0.05);
                assert_eq!(config.csrf_block_threshold, 3.0);
                assert_eq!(config.csrf_safe_origin, "http://localhost");
                assert_eq!(config.event_log_capacity, 500);
            },
        );
    }

    #[test]
    fn test_firewall_custom() {
        temp_env::with_vars(
            vec![
                ("FIREWALL_WINDOW_SECS", Some("5")),
                ("FIREWALL_BASE_ALLOW_THRESHOLD", Some("20")),
                ("FIREWALL_BASE_THROTTLE_THRESHOLD", Some("30")),
                ("FIREWALL_BASE_BLOCK_THRESHOLD", Some("40")),
                ("FIREWALL_ALLOW_FLOOR", Some("2")),
                ("FIREWALL_THROTTLE_FLOOR", Some("4")),
                ("FIREWALL_BLOCK_FLOOR", Some("6")),
                ("FIREWALL_BAN_DURATION_SECS", Some("120")),
                ("FIREWALL_THROTTLE_DELAY_MS", Some("250")),
                ("FIREWALL_DECAY_RATE", Some("0.1")),
                ("FIREWALL_CSRF_BLOCK_THRESHOLD", Some("5.0")),
                ("FIREWALL_CSRF_SAFE_ORIGIN", Some("https://app.example.com")),
                ("FIREWALL_EVENT_LOG_CAPACITY", Some("50")),
            ],
            || {
                let config = FirewallConfig::from_env().unwrap();
                assert_eq!(config.window_secs, 5);
                assert_eq!(config.base_allow_threshold, 20);
                assert_eq!(config.base_throttle_threshold, 30);
                assert_eq!(config.base_block_threshold, 40);
                assert_eq!(config.allow_floor, 2);
                assert_eq!(config.throttle_floor, 4);
                assert_eq!(config.block_floor, 6);
                assert_eq!(config.ban_duration_secs, 120);
                assert_eq!(config.throttle_delay, Duration::from_millis(250));
                assert_eq!(config.decay_rate_per_sec, 0.1);
                assert_eq!(config.csrf_block_threshold, 5.0);
                assert_eq!(config.csrf_safe_origin, "https://app.example.com");
                assert_eq!(config.event_log_capacity, 50);
            },
        );
    }

    #[test]
    fn test_firewall_threshold_order_validation() {
        temp_env::with_vars(
            vec![
                ("FIREWALL_BASE_ALLOW_THRESHOLD", Some("60")),
                ("FIREWALL_BASE_THROTTLE_THRESHOLD", Some("50")),
                ("FIREWALL_BASE_BLOCK_THRESHOLD", Some("90")),
            ],
            || {
                let result = FirewallConfig::from_env();
                assert!(result.is_err());
                assert!(result.unwrap_err().to_string().contains("must hold"));
            },
        );
    }

    #[test]
    fn test_firewall_floor_order_validation() {
        temp_env::with_vars(
            vec![
                ("FIREWALL_ALLOW_FLOOR", Some("25")),
                ("FIREWALL_THROTTLE_FLOOR", Some("20")),
            ],
            || {
                let result = FirewallConfig::from_env();
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn test_firewall_floor_exceeds_base_validation() {
        temp_env::with_vars(
            vec![
                ("FIREWALL_BASE_ALLOW_THRESHOLD", Some("5")),
                ("FIREWALL_BASE_THROTTLE_THRESHOLD", Some("60")),
                ("FIREWALL_BASE_BLOCK_THRESHOLD", Some("90")),
                ("FIREWALL_ALLOW_FLOOR", Some("10")),
            ],
            || {
                let result = FirewallConfig::from_env();
                assert!(result.is_err());
                assert!(
                    result
                        .unwrap_err()
                        .to_string()
                        .contains("must not exceed their base")
                );
            },
        );
    }

    #[test]
    fn test_firewall_negative_decay_rejected() {
        temp_env::with_vars(vec![("FIREWALL_DECAY_RATE", Some("-0.5"))], || {
            let result = FirewallConfig::from_env();
            assert!(result.is_err());
            assert!(
                result
                    .unwrap_err()
                    .to_string()
                    .contains("FIREWALL_DECAY_RATE")
            );
        });
    }

    #[test]
    fn test_firewall_invalid_number_rejected() {
        temp_env::with_vars(vec![("FIREWALL_WINDOW_SECS", Some("ten"))], || {
            let result = FirewallConfig::from_env();
            assert!(result.is_err());
            assert!(
                result
                    .unwrap_err()
                    .to_string()
                    .contains("Invalid FIREWALL_WINDOW_SECS")
            );
        });
    }
}
