use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Freifunk Rhein-Neckar map data
pub const DEFAULT_NODE_LIST_URL: &str = "https://map.ffrn.de/data/meshviewer.json";

/// Corrently virtual meter reading endpoint
pub const DEFAULT_READING_URL: &str = "https://api.corrently.io/core/reading";

/// Corrently CO2 emission endpoint
pub const DEFAULT_EMISSION_URL: &str = "https://api.corrently.io/core/emission";

/// German postal code used by Corrently to localize the GrünstromIndex
pub const DEFAULT_ZIP: &str = "69256";

/// Prefix of generated meter ids
pub const DEFAULT_METER_PREFIX: &str = "freifunk_rrnk";

/// Environment variable overriding the identity store location
pub const STORE_ENV: &str = "MESHMETER_STORE";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Meshviewer JSON document listing the mesh nodes
    #[serde(default = "default_node_list_url")]
    pub node_list_url: String,
    /// Endpoint receiving the virtual meter reading
    #[serde(default = "default_reading_url")]
    pub reading_url: String,
    /// Endpoint computing the CO2 emission of a meter account
    #[serde(default = "default_emission_url")]
    pub emission_url: String,
    /// Postal code sent with every reading
    #[serde(default = "default_zip")]
    pub zip: String,
    /// Prefix for newly generated meter ids
    #[serde(default = "default_meter_prefix")]
    pub meter_prefix: String,
    /// SQLite file holding the meter identity (default: ~/.meshmeter/meter.db)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Timeout applied to each HTTP request, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_node_list_url() -> String {
    DEFAULT_NODE_LIST_URL.to_string()
}

fn default_reading_url() -> String {
    DEFAULT_READING_URL.to_string()
}

fn default_emission_url() -> String {
    DEFAULT_EMISSION_URL.to_string()
}

fn default_zip() -> String {
    DEFAULT_ZIP.to_string()
}

fn default_meter_prefix() -> String {
    DEFAULT_METER_PREFIX.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_list_url: default_node_list_url(),
            reading_url: default_reading_url(),
            emission_url: default_emission_url(),
            zip: default_zip(),
            meter_prefix: default_meter_prefix(),
            store_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check URLs, the postal code, the id prefix and the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, url) in [
            ("node_list_url", &self.node_list_url),
            ("reading_url", &self.reading_url),
            ("emission_url", &self.emission_url),
        ] {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                ConfigError::ValidationError(format!("{field} '{url}' is not a valid URL: {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::ValidationError(format!(
                    "{field} '{url}' must use http or https"
                )));
            }
        }
        if self.zip.trim().is_empty() {
            return Err(ConfigError::ValidationError("zip must not be empty".into()));
        }
        if self.meter_prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "meter_prefix must not be empty".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Override `store_path` with the value of `MESHMETER_STORE`, if any.
    ///
    /// Takes the variable's value rather than reading the environment, so
    /// only the binary decides whether process state applies.
    pub fn with_store_override(mut self, value: Option<String>) -> Self {
        if let Some(path) = value.filter(|p| !p.trim().is_empty()) {
            self.store_path = Some(PathBuf::from(path));
        }
        self
    }

    /// Resolve the identity store location.
    ///
    /// `store_path` when set, otherwise `~/.meshmeter/meter.db`. Returns
    /// `None` when no home directory exists.
    pub fn resolve_store_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.store_path {
            return Some(path.clone());
        }
        dirs::home_dir().map(|home| home.join(".meshmeter").join("meter.db"))
    }

    /// Build the HTTP client shared by all remote calls.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .user_agent(concat!("meshmeter/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.node_list_url, DEFAULT_NODE_LIST_URL);
        assert_eq!(config.zip, "69256");
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_overrides() {
        let yaml = r#"
node_list_url: "http://localhost:8080/meshviewer.json"
zip: "10115"
store_path: "/tmp/meter.db"
timeout_secs: 5
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.node_list_url, "http://localhost:8080/meshviewer.json");
        assert_eq!(config.zip, "10115");
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/meter.db")));
        assert_eq!(config.timeout_secs, 5);
        // untouched fields keep their defaults
        assert_eq!(config.reading_url, DEFAULT_READING_URL);
        assert_eq!(config.meter_prefix, DEFAULT_METER_PREFIX);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = Config::parse("zipcode: \"69256\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = Config::parse("reading_url: \"not a url\"");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        let result = Config::parse("emission_url: \"ftp://example.org/emission\"");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::parse("timeout_secs: 0");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_empty_zip_rejected() {
        let result = Config::parse("zip: \"  \"");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file("/nonexistent/meshmeter.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_store_path_from_config() {
        let config = Config {
            store_path: Some(PathBuf::from("/srv/meter.db")),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_store_path(),
            Some(PathBuf::from("/srv/meter.db"))
        );
    }

    #[test]
    fn test_store_override_replaces_config_path() {
        let config = Config {
            store_path: Some(PathBuf::from("/srv/meter.db")),
            ..Config::default()
        }
        .with_store_override(Some("/var/lib/meshmeter/meter.db".to_string()));
        assert_eq!(
            config.resolve_store_path(),
            Some(PathBuf::from("/var/lib/meshmeter/meter.db"))
        );
    }

    #[test]
    fn test_store_override_absent_or_empty() {
        let base = Config {
            store_path: Some(PathBuf::from("/srv/meter.db")),
            ..Config::default()
        };
        assert_eq!(base.clone().with_store_override(None), base);
        assert_eq!(base.clone().with_store_override(Some("  ".into())), base);
    }
}
