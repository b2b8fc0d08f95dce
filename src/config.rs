// Server Configuration
// Reads STOREFRONT_* environment variables, falling back to defaults

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use log::LevelFilter;

use crate::services::EngineSettings;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_PORT: u16 = 8010;
const DEFAULT_DEBOUNCE_MS: u64 = 100;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:*,http://127.0.0.1:*";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub log_level: LevelFilter,
    pub preview_debounce: Duration,
    /// Allowed origins; a trailing `:*` matches any port
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> (Self, Vec<String>) {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Warnings are returned rather
    /// than logged since this runs before the logger is installed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = var("STOREFRONT_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let log_dir = var("STOREFRONT_LOG_DIR").unwrap_or_else(|| format!("{data_dir}/logs"));

        let host = match var("STOREFRONT_HOST") {
            Some(value) => parse_host(&value).unwrap_or_else(|| {
                warnings.push(format!("Invalid STOREFRONT_HOST '{value}', using 127.0.0.1"));
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            }),
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };

        let port = match var("STOREFRONT_PORT") {
            Some(value) => value.parse().unwrap_or_else(|_| {
                warnings.push(format!("Invalid STOREFRONT_PORT '{value}', using {DEFAULT_PORT}"));
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let log_level = match var("STOREFRONT_LOG_LEVEL") {
            Some(value) => value.parse().unwrap_or_else(|_| {
                warnings.push(format!("Invalid STOREFRONT_LOG_LEVEL '{value}', using info"));
                LevelFilter::Info
            }),
            None => LevelFilter::Info,
        };

        let debounce_ms = match var("STOREFRONT_PREVIEW_DEBOUNCE_MS") {
            Some(value) => value.parse().unwrap_or_else(|_| {
                warnings.push(format!(
                    "Invalid STOREFRONT_PREVIEW_DEBOUNCE_MS '{value}', using {DEFAULT_DEBOUNCE_MS}"
                ));
                DEFAULT_DEBOUNCE_MS
            }),
            None => DEFAULT_DEBOUNCE_MS,
        };

        let cors_origins = var("STOREFRONT_CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            data_dir: PathBuf::from(data_dir),
            log_dir: PathBuf::from(log_dir),
            host,
            port,
            log_level,
            preview_debounce: Duration::from_millis(debounce_ms),
            cors_origins,
        };
        (config, warnings)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            propagation_debounce: self.preview_debounce,
        }
    }

    /// Whether a request origin matches the configured list
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.iter().any(|allowed| {
            if allowed == "*" {
                return true;
            }
            match allowed.strip_suffix(":*") {
                Some(prefix) => origin
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.is_empty() || is_port_suffix(rest)),
                None => origin == allowed,
            }
        })
    }
}

fn is_port_suffix(rest: &str) -> bool {
    rest.strip_prefix(':')
        .is_some_and(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
}

fn parse_host(host: &str) -> Option<IpAddr> {
    if host.eq_ignore_ascii_case("localhost") {
        return Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    host.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> (ServerConfig, Vec<String>) {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let (config, warnings) = config_from(&[]);
        assert!(warnings.is_empty());
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.log_dir, PathBuf::from("data/logs"));
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, 8010);
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.engine_settings().propagation_debounce, Duration::from_millis(100));
    }

    #[test]
    fn test_overrides() {
        let (config, warnings) = config_from(&[
            ("STOREFRONT_DATA_DIR", "/srv/shop"),
            ("STOREFRONT_HOST", "0.0.0.0"),
            ("STOREFRONT_PORT", "9000"),
            ("STOREFRONT_LOG_LEVEL", "debug"),
            ("STOREFRONT_PREVIEW_DEBOUNCE_MS", "250"),
        ]);
        assert!(warnings.is_empty());
        assert_eq!(config.log_dir, PathBuf::from("/srv/shop/logs"));
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.preview_debounce, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let (config, warnings) = config_from(&[
            ("STOREFRONT_PORT", "eighty"),
            ("STOREFRONT_LOG_LEVEL", "loud"),
            ("STOREFRONT_PREVIEW_DEBOUNCE_MS", "-5"),
        ]);
        assert_eq!(warnings.len(), 3);
        assert_eq!(config.port, 8010);
        assert_eq!(config.log_level, LevelFilter::Info);
        assert_eq!(config.preview_debounce, Duration::from_millis(100));
    }

    #[test]
    fn test_origin_matching() {
        let (config, _) = config_from(&[("STOREFRONT_CORS_ORIGINS", "http://localhost:*, https://shop.example")]);
        assert!(config.origin_allowed("http://localhost:5173"));
        assert!(config.origin_allowed("http://localhost"));
        assert!(config.origin_allowed("https://shop.example"));
        assert!(!config.origin_allowed("http://localhost.evil:80"));
        assert!(!config.origin_allowed("https://other.example"));
    }
}
