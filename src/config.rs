/*!
 * Configuration types for the bridge
 */

use msf_connect::{ConnectSettings, CredentialOverrides};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Upper bound accepted for any wait, in seconds
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Top-level bridge configuration, usually loaded from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Connection to the RPC service
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Bounded wait tuning
    #[serde(default)]
    pub polling: PollingConfig,
}

/// `[rpc]` section
///
/// Every credential field is optional; unset fields fall through to the
/// `MSF_RPC_*` environment and then to built-in defaults.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default)]
    pub ssl: Option<bool>,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            ssl: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("ssl", &self.ssl)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl RpcConfig {
    /// Credential values contributed by the config file
    pub fn overrides(&self) -> CredentialOverrides {
        CredentialOverrides {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone().map(SecretString::from),
            ssl: self.ssl,
        }
    }

    pub fn connect_settings(&self) -> ConnectSettings {
        ConnectSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// `[polling]` section
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    /// Interval between status reads
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Default wait for `run_console_command`
    #[serde(default = "default_console_timeout_secs")]
    pub console_timeout_secs: u64,

    /// Default wait for `session_run_with_output`
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Default wait for `check_exploit`
    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            console_timeout_secs: default_console_timeout_secs(),
            session_timeout_secs: default_session_timeout_secs(),
            check_timeout_secs: default_check_timeout_secs(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_console_timeout_secs() -> u64 {
    30
}

fn default_session_timeout_secs() -> u64 {
    310
}

fn default_check_timeout_secs() -> u64 {
    60
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: BridgeConfig = toml::from_str(&contents)
            .map_err(|e| BridgeError::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no operation could work with
    pub fn validate(&self) -> Result<()> {
        if self.rpc.request_timeout_secs == 0 {
            return Err(BridgeError::Config(
                "rpc.request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.polling.interval_ms == 0 {
            return Err(BridgeError::Config(
                "polling.interval_ms must be positive".to_string(),
            ));
        }
        for (name, secs) in [
            ("console_timeout_secs", self.polling.console_timeout_secs),
            ("session_timeout_secs", self.polling.session_timeout_secs),
            ("check_timeout_secs", self.polling.check_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(BridgeError::Config(format!(
                    "polling.{name} must be between 1 and {MAX_TIMEOUT_SECS}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(config.log_file.is_none());
        assert_eq!(config.rpc.request_timeout_secs, 30);
        assert_eq!(config.polling.interval(), Duration::from_secs(1));
        assert_eq!(config.polling.console_timeout_secs, 30);
        assert_eq!(config.polling.session_timeout_secs, 310);
        assert_eq!(config.polling.check_timeout_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[rpc]
host = "10.0.0.2"
port = 55552
password = "s3cret"
ssl = true

[polling]
interval_ms = 250
"#
        )
        .unwrap();

        let config = BridgeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.rpc.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(config.rpc.port, Some(55552));
        assert_eq!(config.rpc.ssl, Some(true));
        assert!(config.rpc.username.is_none());
        assert_eq!(config.polling.interval(), Duration::from_millis(250));
        assert_eq!(config.polling.session_timeout_secs, 310);

        let overrides = config.rpc.overrides();
        assert_eq!(overrides.port, Some(55552));
        assert_eq!(overrides.password.unwrap().expose_secret(), "s3cret");
    }

    #[test]
    fn test_password_never_rendered() {
        let rpc = RpcConfig {
            password: Some("s3cret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{rpc:?}").contains("s3cret"));
        assert!(!toml::to_string(&rpc).unwrap().contains("s3cret"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = BridgeConfig::default();
        config.polling.interval_ms = 0;
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

        let mut config = BridgeConfig::default();
        config.polling.session_timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[rpc]\nport = \"not a number\"").unwrap();
        assert!(matches!(
            BridgeConfig::from_file(file.path()),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = BridgeConfig::from_file(Path::new("/nonexistent/msf-mcp.toml"));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
