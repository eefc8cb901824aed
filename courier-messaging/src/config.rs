//! Configuration types for the broker bridge

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "COURIER";

/// How message types map to broker topic names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityNaming {
    /// Full Rust path with `::` replaced by `.`
    #[default]
    FullyQualified,
    /// Bare type name without module path or generics
    TypeName,
}

impl EntityNaming {
    /// Topic name for `E`
    pub fn entity_name<E: ?Sized>(self) -> String {
        self.format(std::any::type_name::<E>())
    }

    /// Topic name for a Rust type path
    pub fn format(self, type_name: &str) -> String {
        match self {
            EntityNaming::FullyQualified => type_name.replace("::", "."),
            EntityNaming::TypeName => {
                let base = type_name.split('<').next().unwrap_or(type_name);
                base.rsplit("::").next().unwrap_or(base).to_string()
            }
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "fully_qualified" | "fullyqualified" | "full" => Some(EntityNaming::FullyQualified),
            "type_name" | "typename" | "short" => Some(EntityNaming::TypeName),
            _ => None,
        }
    }
}

/// Host-supplied identity stamped on every outgoing envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub machine_name: String,
    pub app_name: String,
}

impl HostIdentity {
    pub fn new(machine_name: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
            app_name: app_name.into(),
        }
    }

    /// Broker endpoint owned by this application for `topic`
    pub fn endpoint(&self, topic: &str) -> String {
        format!("{}.{}", self.app_name, topic)
    }
}

/// Configuration for the distributed bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Application name; drives endpoint naming and envelope stamping
    pub app_name: String,
    /// Host name stamped on outgoing envelopes
    #[serde(default = "default_machine_name")]
    pub machine_name: String,
    /// Message type to topic mapping
    #[serde(default)]
    pub entity_naming: EntityNaming,
    /// How long a request waits for its reply, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_machine_name() -> String {
    env::var("HOSTNAME")
        .or_else(|_| env::var("COMPUTERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl MessagingConfig {
    /// Create a new configuration for the given application
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            machine_name: default_machine_name(),
            entity_naming: EntityNaming::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// Load from `COURIER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_env_with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Load from `{prefix}_APP_NAME`, `{prefix}_MACHINE_NAME`,
    /// `{prefix}_ENTITY_NAMING` and `{prefix}_REQUEST_TIMEOUT_MS`
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigurationError> {
        let var = |key: &str| env::var(format!("{}_{}", prefix, key)).ok();

        let app_name = var("APP_NAME").ok_or_else(|| {
            ConfigurationError::InvalidConfig(format!("{}_APP_NAME is not set", prefix))
        })?;
        let mut config = Self::new(app_name);

        if let Some(machine_name) = var("MACHINE_NAME") {
            config.machine_name = machine_name;
        }
        if let Some(naming) = var("ENTITY_NAMING") {
            config.entity_naming = EntityNaming::parse(&naming).ok_or_else(|| {
                ConfigurationError::InvalidConfig(format!("Unknown entity naming: {}", naming))
            })?;
        }
        if let Some(timeout) = var("REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = timeout.parse().map_err(|_| {
                ConfigurationError::InvalidConfig(format!("Invalid request timeout: {}", timeout))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigurationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_machine_name(mut self, machine_name: impl Into<String>) -> Self {
        self.machine_name = machine_name.into();
        self
    }

    pub fn with_entity_naming(mut self, naming: EntityNaming) -> Self {
        self.entity_naming = naming;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn identity(&self) -> HostIdentity {
        HostIdentity::new(&self.machine_name, &self.app_name)
    }

    /// Reject configurations the bus cannot start with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigurationError::InvalidConfig(
                "app_name must not be empty".to_string(),
            ));
        }
        if self.app_name.contains(char::is_whitespace) {
            return Err(ConfigurationError::InvalidConfig(format!(
                "app_name must not contain whitespace: {:?}",
                self.app_name
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod billing {
        pub struct QuoteRequest;
        pub struct Wrapper<T>(pub T);
    }

    #[test]
    fn test_entity_naming() {
        let full = EntityNaming::FullyQualified.entity_name::<billing::QuoteRequest>();
        assert!(full.ends_with(".billing.QuoteRequest"));
        assert!(!full.contains("::"));

        assert_eq!(
            EntityNaming::TypeName.entity_name::<billing::QuoteRequest>(),
            "QuoteRequest"
        );
        assert_eq!(
            EntityNaming::TypeName.entity_name::<billing::Wrapper<u32>>(),
            "Wrapper"
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = MessagingConfig::new("orders");
        assert_eq!(config.entity_naming, EntityNaming::FullyQualified);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(!config.machine_name.is_empty());
        assert_eq!(config.identity().endpoint("Shipped"), "orders.Shipped");
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let config = MessagingConfig::new("orders").with_request_timeout(Duration::MAX);
        assert_eq!(config.request_timeout_ms, u64::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = MessagingConfig::from_toml_str(
            r#"
            app_name = "billing"
            machine_name = "node-7"
            entity_naming = "type_name"
            request_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.app_name, "billing");
        assert_eq!(config.machine_name, "node-7");
        assert_eq!(config.entity_naming, EntityNaming::TypeName);
        assert_eq!(config.request_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_toml_requires_app_name() {
        assert!(MessagingConfig::from_toml_str("machine_name = \"x\"").is_err());
        assert!(MessagingConfig::from_toml_str("app_name = \"\"").is_err());
    }

    #[test]
    fn test_validate() {
        assert!(MessagingConfig::new("billing").validate().is_ok());
        assert!(MessagingConfig::new("   ").validate().is_err());
        assert!(MessagingConfig::new("my app").validate().is_err());
        assert!(
            MessagingConfig::new("billing")
                .with_request_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_from_env_missing_app_name() {
        let result = MessagingConfig::from_env_with_prefix("COURIER_TEST_MISSING_98765");
        assert!(matches!(result, Err(ConfigurationError::InvalidConfig(_))));
    }

    #[test]
    fn test_parse_entity_naming() {
        assert_eq!(EntityNaming::parse("TypeName"), Some(EntityNaming::TypeName));
        assert_eq!(
            EntityNaming::parse("fully_qualified"),
            Some(EntityNaming::FullyQualified)
        );
        assert_eq!(EntityNaming::parse("weird"), None);
    }
}
