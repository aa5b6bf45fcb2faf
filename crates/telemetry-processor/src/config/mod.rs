// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration shared by every processor and plugin instance.

pub mod log_level;
pub mod processors;

use std::env;
use std::str::FromStr;

use crate::errors::Error;
use log_level::LogLevel;

const DEFAULT_HOSTNAME: &str = "localhost";

/// Process-wide settings a processor keeps a reference to.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Default log level for plugin instances
    pub log_level: LogLevel,
    /// Host name attached to records by enriching plugins
    pub hostname: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            hostname: DEFAULT_HOSTNAME.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment variables
    ///
    /// * `TP_LOG_LEVEL`: error, warn, info, debug or trace
    /// * `TP_HOSTNAME`, falling back to `HOSTNAME`
    pub fn from_env() -> Result<Self, Error> {
        let log_level = match env::var("TP_LOG_LEVEL") {
            Ok(val) => LogLevel::from_str(&val).map_err(Error::InvalidArgument)?,
            Err(_) => LogLevel::default(),
        };
        let hostname = env::var("TP_HOSTNAME")
            .or_else(|_| env::var("HOSTNAME"))
            .unwrap_or_else(|_| DEFAULT_HOSTNAME.to_string());

        let config = Self {
            log_level,
            hostname,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        if self.hostname.trim().is_empty() {
            return Err(Error::invalid_argument("hostname cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_hostname() {
        let config = RuntimeConfig {
            hostname: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("TP_LOG_LEVEL", "Debug");
        env::set_var("TP_HOSTNAME", "collector-1");
        let config = RuntimeConfig::from_env().unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.hostname, "collector-1");

        env::set_var("TP_LOG_LEVEL", "loud");
        assert!(RuntimeConfig::from_env().is_err());

        env::remove_var("TP_LOG_LEVEL");
        env::remove_var("TP_HOSTNAME");
    }
}
