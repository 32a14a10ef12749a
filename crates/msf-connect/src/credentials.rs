//! Connection credentials and their resolution order
//!
//! Each field is taken from the first source that supplies it:
//! explicit argument, then `MSF_RPC_*` environment variable, then the
//! configuration file, then the built-in default.

use crate::error::ConnectError;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 55553;
pub const DEFAULT_USERNAME: &str = "msf";
pub const DEFAULT_PASSWORD: &str = "msf";

pub const ENV_HOST: &str = "MSF_RPC_HOST";
pub const ENV_PORT: &str = "MSF_RPC_PORT";
pub const ENV_USERNAME: &str = "MSF_RPC_USERNAME";
pub const ENV_PASSWORD: &str = "MSF_RPC_PASSWORD";
pub const ENV_SSL: &str = "MSF_RPC_SSL";

/// A partial credential set from one source
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub ssl: Option<bool>,
}

/// Fully resolved credentials. Immutable once built.
#[derive(Clone)]
pub struct Credentials {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
    ssl: bool,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: SecretString,
        ssl: bool,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password,
            ssl,
        }
    }

    /// Resolve against the process environment
    pub fn resolve(
        explicit: &CredentialOverrides,
        file: &CredentialOverrides,
    ) -> Result<Self, ConnectError> {
        Self::resolve_with(explicit, file, |key| std::env::var(key).ok())
    }

    /// Resolve with an injectable environment lookup
    pub fn resolve_with<F>(
        explicit: &CredentialOverrides,
        file: &CredentialOverrides,
        env: F,
    ) -> Result<Self, ConnectError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_port = match env(ENV_PORT) {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|_| {
                ConnectError::InvalidConfig(format!("{ENV_PORT} is not a valid port: '{raw}'"))
            })?),
            None => None,
        };

        let host = explicit
            .host
            .clone()
            .or_else(|| env(ENV_HOST))
            .or_else(|| file.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = explicit.port.or(env_port).or(file.port).unwrap_or(DEFAULT_PORT);
        let username = explicit
            .username
            .clone()
            .or_else(|| env(ENV_USERNAME))
            .or_else(|| file.username.clone())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let password = explicit
            .password
            .clone()
            .or_else(|| env(ENV_PASSWORD).map(SecretString::from))
            .or_else(|| file.password.clone())
            .unwrap_or_else(|| SecretString::from(DEFAULT_PASSWORD.to_string()));
        let ssl = explicit
            .ssl
            .or_else(|| env(ENV_SSL).map(|v| parse_flag(&v)))
            .or(file.ssl)
            .unwrap_or(false);

        if host.trim().is_empty() {
            return Err(ConnectError::InvalidConfig("host is empty".to_string()));
        }
        if port == 0 {
            return Err(ConnectError::InvalidConfig("port must be non-zero".to_string()));
        }

        Ok(Self {
            host,
            port,
            username,
            password,
            ssl,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    pub fn ssl(&self) -> bool {
        self.ssl
    }

    /// The RPC endpoint URL
    pub fn endpoint(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}/api/", self.host, self.port)
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(
            DEFAULT_HOST,
            DEFAULT_PORT,
            DEFAULT_USERNAME,
            SecretString::from(DEFAULT_PASSWORD.to_string()),
            false,
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// `true`, `1` and `yes` (any case) enable a flag; everything else disables it
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let creds = Credentials::resolve_with(
            &CredentialOverrides::default(),
            &CredentialOverrides::default(),
            env_from(&[]),
        )
        .unwrap();

        assert_eq!(creds.host(), "127.0.0.1");
        assert_eq!(creds.port(), 55553);
        assert_eq!(creds.username(), "msf");
        assert_eq!(creds.password(), "msf");
        assert!(!creds.ssl());
        assert_eq!(creds.endpoint(), "http://127.0.0.1:55553/api/");
    }

    #[test]
    fn test_environment_overrides_file_and_defaults() {
        let file = CredentialOverrides {
            host: Some("10.1.1.1".into()),
            username: Some("fileuser".into()),
            ..Default::default()
        };
        let creds = Credentials::resolve_with(
            &CredentialOverrides::default(),
            &file,
            env_from(&[
                (ENV_HOST, "10.0.0.9"),
                (ENV_PORT, "55554"),
                (ENV_PASSWORD, "s3cret"),
                (ENV_SSL, "YES"),
            ]),
        )
        .unwrap();

        assert_eq!(creds.host(), "10.0.0.9");
        assert_eq!(creds.port(), 55554);
        assert_eq!(creds.username(), "fileuser");
        assert_eq!(creds.password(), "s3cret");
        assert!(creds.ssl());
        assert_eq!(creds.endpoint(), "https://10.0.0.9:55554/api/");
    }

    #[test]
    fn test_explicit_overrides_environment() {
        let explicit = CredentialOverrides {
            host: Some("192.168.56.10".into()),
            port: Some(4444),
            ssl: Some(false),
            ..Default::default()
        };
        let creds = Credentials::resolve_with(
            &explicit,
            &CredentialOverrides::default(),
            env_from(&[(ENV_HOST, "10.0.0.9"), (ENV_PORT, "1"), (ENV_SSL, "true")]),
        )
        .unwrap();

        assert_eq!(creds.host(), "192.168.56.10");
        assert_eq!(creds.port(), 4444);
        assert!(!creds.ssl());
    }

    #[test]
    fn test_invalid_port_in_environment() {
        let result = Credentials::resolve_with(
            &CredentialOverrides::default(),
            &CredentialOverrides::default(),
            env_from(&[(ENV_PORT, "not-a-port")]),
        );
        assert!(matches!(result, Err(ConnectError::InvalidConfig(_))));
    }

    #[test]
    fn test_parse_flag() {
        for on in ["true", "TRUE", "1", "yes", " Yes "] {
            assert!(parse_flag(on), "{on}");
        }
        for off in ["false", "0", "no", "", "on"] {
            assert!(!parse_flag(off), "{off}");
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::default();
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("password: \"msf\""));
    }
}
