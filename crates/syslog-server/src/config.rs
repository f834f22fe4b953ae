// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use syslog_intake::{
    errors::Creation,
    frame_decoder::{OversizedFramePolicy, DEFAULT_MAX_FRAME_SIZE},
    pipeline::PipelineConfig,
    process_buffer::DEFAULT_CAPACITY,
    server::SyslogTcpConfig,
};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5140;
const DEFAULT_INPUT_ID: &str = "syslog-tcp";
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid pipeline configuration: {0}")]
    Pipeline(#[from] Creation),
}

/// Configuration for the syslog TCP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the TCP listener to
    pub host: String,
    pub port: u16,
    /// Frame delimiter mode (`line` or `null`)
    pub delimiter_mode: String,
    pub max_frame_size: usize,
    /// What to do with frames over `max_frame_size` (`disconnect` or `discard`)
    pub oversized_frame_policy: String,
    /// Capacity of the process buffer, in messages
    pub process_buffer_size: usize,
    /// Drop messages after waiting this long for buffer capacity. Waits forever when unset.
    pub process_buffer_timeout_ms: Option<u64>,
    /// Input id stamped on every message
    pub input_id: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            delimiter_mode: "line".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            oversized_frame_policy: OversizedFramePolicy::default().to_string(),
            process_buffer_size: DEFAULT_CAPACITY,
            process_buffer_timeout_ms: None,
            input_id: DEFAULT_INPUT_ID.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("SYSLOG_TCP_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("SYSLOG_TCP_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        // SYSLOG_DELIMITER wins over the boolean flag when both are set.
        let delimiter_mode = match env::var("SYSLOG_DELIMITER") {
            Ok(mode) => mode,
            Err(_) => {
                let use_null_delimiter = match env::var("SYSLOG_USE_NULL_DELIMITER") {
                    Ok(val) => parse_bool("SYSLOG_USE_NULL_DELIMITER", &val)?,
                    Err(_) => false,
                };
                let mode = if use_null_delimiter { "null" } else { "line" };
                mode.to_string()
            }
        };
        let max_frame_size = env::var("SYSLOG_MAX_FRAME_SIZE")
            .ok()
            .and_then(|size| size.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE);
        let oversized_frame_policy = env::var("SYSLOG_OVERSIZED_FRAME_POLICY")
            .unwrap_or_else(|_| OversizedFramePolicy::default().to_string());
        let process_buffer_size = env::var("SYSLOG_PROCESS_BUFFER_SIZE")
            .ok()
            .and_then(|size| size.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CAPACITY);
        let process_buffer_timeout_ms = env::var("SYSLOG_PROCESS_BUFFER_TIMEOUT_MS")
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok());
        let input_id =
            env::var("SYSLOG_INPUT_ID").unwrap_or_else(|_| DEFAULT_INPUT_ID.to_string());
        let log_level = env::var("LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            host,
            port,
            delimiter_mode,
            max_frame_size,
            oversized_frame_policy,
            process_buffer_size,
            process_buffer_timeout_ms,
            input_id,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "SYSLOG_TCP_HOST cannot be empty".to_string(),
            ));
        }

        if self.process_buffer_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Process buffer size must be greater than 0".to_string(),
            ));
        }

        if self.input_id.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "SYSLOG_INPUT_ID cannot be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        self.pipeline_config()?;
        Ok(())
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig, Creation> {
        let policy: OversizedFramePolicy = self.oversized_frame_policy.parse()?;
        PipelineConfig::from_mode(&self.delimiter_mode, self.max_frame_size, policy)
    }

    pub fn tcp_config(&self) -> SyslogTcpConfig {
        SyslogTcpConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn process_buffer_timeout(&self) -> Option<Duration> {
        self.process_buffer_timeout_ms.map(Duration::from_millis)
    }
}

/// Accepts `true`/`false`, `1`/`0`, `yes`/`no` and `on`/`off`, case-insensitively.
fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidConfig(format!(
            "Invalid boolean '{}' for {}",
            value, name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        let pipeline = config.pipeline_config().unwrap();
        assert!(!pipeline.use_null_delimiter);
        assert_eq!(pipeline.max_frame_size, 2 * 1024 * 1024);
        assert_eq!(
            pipeline.oversized_frame_policy,
            OversizedFramePolicy::Disconnect
        );
    }

    #[test]
    fn test_null_delimiter_mode() {
        let config = ServerConfig {
            delimiter_mode: "null".to_string(),
            ..Default::default()
        };
        assert!(config.pipeline_config().unwrap().use_null_delimiter);
    }

    #[test]
    fn test_validate_unknown_delimiter() {
        let config = ServerConfig {
            delimiter_mode: "semicolon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Pipeline(Creation::UnknownDelimiter(_)))
        ));
    }

    #[test]
    fn test_validate_unknown_policy() {
        let config = ServerConfig {
            oversized_frame_policy: "truncate".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Pipeline(Creation::UnknownOversizedFramePolicy(_)))
        ));
    }

    #[test]
    fn test_validate_zero_sizes() {
        let config = ServerConfig {
            max_frame_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Pipeline(Creation::InvalidMaxFrameSize))
        ));

        let config = ServerConfig {
            process_buffer_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_host_and_input_id() {
        let config = ServerConfig {
            host: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            input_id: "".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let config = ServerConfig {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Log level '{}' should be valid",
                level
            );
        }

        let config = ServerConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool_spellings() {
        for value in ["true", "TRUE", "1", "yes", "on", " Yes "] {
            assert!(parse_bool("FLAG", value).unwrap(), "{value}");
        }
        for value in ["false", "0", "no", "OFF"] {
            assert!(!parse_bool("FLAG", value).unwrap(), "{value}");
        }
    }

    #[test]
    fn test_parse_bool_rejects_unknown_values() {
        let error = parse_bool("SYSLOG_USE_NULL_DELIMITER", "maybe").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid configuration: Invalid boolean 'maybe' for SYSLOG_USE_NULL_DELIMITER"
        );
    }

    #[test]
    fn test_buffer_timeout() {
        assert_eq!(ServerConfig::default().process_buffer_timeout(), None);
        let config = ServerConfig {
            process_buffer_timeout_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(
            config.process_buffer_timeout(),
            Some(Duration::from_millis(250))
        );
    }
}
