use crate::error::ThrottlerError;
use crate::rate_limit_config::ThrottleSettings;
use crate::request_admission::PathClassifier;
use envconfig::Envconfig;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Log level for this crate when RUST_LOG is unset
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Paths under this prefix are throttled as general API traffic
    #[envconfig(from = "API_PREFIX", default = "/api/")]
    pub api_prefix: String,

    /// Paths under this prefix use the inventory budget instead
    #[envconfig(from = "INVENTORY_PREFIX", default = "/api/inventory/")]
    pub inventory_prefix: String,

    /// JSON throttle settings; built-in defaults when unset
    #[envconfig(from = "THROTTLE_CONFIG")]
    pub throttle_config: Option<PathBuf>,

    /// Largest request body buffered for upload measurement
    #[envconfig(from = "MAX_UPLOAD_BYTES", default = "104857600")]
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn path_classifier(&self) -> PathClassifier {
        PathClassifier::new(self.api_prefix.clone(), self.inventory_prefix.clone())
    }

    /// Throttle settings from `throttle_config`, or the defaults
    pub fn throttle_settings(&self) -> Result<ThrottleSettings, ThrottlerError> {
        match &self.throttle_config {
            Some(path) => ThrottleSettings::from_file(path),
            None => Ok(ThrottleSettings::default()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            api_prefix: "/api/".to_string(),
            inventory_prefix: "/api/inventory/".to_string(),
            throttle_config: None,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_admission::ApiScope;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.api_prefix, "/api/");
        assert_eq!(config.max_upload_bytes, 104_857_600);
        assert!(config.throttle_config.is_none());
        assert_eq!(config.throttle_settings().unwrap(), ThrottleSettings::default());
    }

    #[test]
    fn test_prefix_overrides() {
        let mut env = HashMap::new();
        env.insert("API_PREFIX".to_string(), "/rest/".to_string());
        env.insert("INVENTORY_PREFIX".to_string(), "/rest/inv/".to_string());
        let config = Config::init_from_hashmap(&env).unwrap();

        let classifier = config.path_classifier();
        assert_eq!(classifier.classify("/rest/inv/samples"), ApiScope::Inventory);
        assert_eq!(classifier.classify("/rest/docs"), ApiScope::General);
        assert_eq!(classifier.classify("/api/docs"), ApiScope::Unthrottled);
    }

    #[test]
    fn test_missing_settings_file_is_configuration_error() {
        let config = Config {
            throttle_config: Some(PathBuf::from("/nonexistent/throttle.json")),
            ..Config::default()
        };
        assert!(matches!(config.throttle_settings(), Err(ThrottlerError::Configuration(_))));
    }

    #[test]
    fn test_invalid_bind_addr() {
        let mut env = HashMap::new();
        env.insert("BIND_ADDR".to_string(), "localhost".to_string());
        assert!(Config::init_from_hashmap(&env).is_err());
    }
}
