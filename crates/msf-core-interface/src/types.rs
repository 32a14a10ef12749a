//! Opaque references to objects owned by the remote service

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The six module kinds the framework exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Exploit,
    Auxiliary,
    Post,
    Payload,
    Encoder,
    Nop,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid module type: {0}. Must be one of: exploit, auxiliary, post, payload, encoder, nop")]
pub struct ParseModuleTypeError(pub String);

impl ModuleType {
    pub const ALL: [ModuleType; 6] = [
        ModuleType::Exploit,
        ModuleType::Auxiliary,
        ModuleType::Post,
        ModuleType::Payload,
        ModuleType::Encoder,
        ModuleType::Nop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Exploit => "exploit",
            ModuleType::Auxiliary => "auxiliary",
            ModuleType::Post => "post",
            ModuleType::Payload => "payload",
            ModuleType::Encoder => "encoder",
            ModuleType::Nop => "nop",
        }
    }

    /// RPC method returning every module name of this kind
    pub fn list_method(&self) -> &'static str {
        match self {
            ModuleType::Exploit => "module.exploits",
            ModuleType::Auxiliary => "module.auxiliary",
            ModuleType::Post => "module.post",
            ModuleType::Payload => "module.payloads",
            ModuleType::Encoder => "module.encoders",
            ModuleType::Nop => "module.nops",
        }
    }

    /// Only exploits declare selectable targets
    pub fn has_targets(&self) -> bool {
        matches!(self, ModuleType::Exploit)
    }

    /// Only exploits carry a compatible-payload list
    pub fn has_payloads(&self) -> bool {
        matches!(self, ModuleType::Exploit)
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = ParseModuleTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseModuleTypeError(s.to_string()))
    }
}

/// A module address: kind plus path-like name (e.g. `windows/smb/ms17_010_eternalblue`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    pub module_type: ModuleType,
    pub name: String,
}

impl ModuleKey {
    pub fn new(module_type: ModuleType, name: impl Into<String>) -> Self {
        Self {
            module_type,
            name: name.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module_type, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsoleId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConsoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live session flavour. The read/write RPC pair differs per variant, so the
/// variant decides which calls are legal instead of a runtime capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Raw command shell (including powershell sessions)
    Shell,
    /// Interactive agent
    Meterpreter,
}

impl SessionKind {
    /// Map the service's `type` field onto a variant
    pub fn from_remote_type(kind: &str) -> Option<Self> {
        let kind = kind.to_ascii_lowercase();
        if kind == "meterpreter" {
            Some(SessionKind::Meterpreter)
        } else if kind.contains("shell") {
            Some(SessionKind::Shell)
        } else {
            None
        }
    }

    pub fn read_method(&self) -> &'static str {
        match self {
            SessionKind::Shell => "session.shell_read",
            SessionKind::Meterpreter => "session.meterpreter_read",
        }
    }

    pub fn write_method(&self) -> &'static str {
        match self {
            SessionKind::Shell => "session.shell_write",
            SessionKind::Meterpreter => "session.meterpreter_write",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Shell => "shell",
            SessionKind::Meterpreter => "meterpreter",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_type_parse_is_case_insensitive() {
        assert_eq!("EXPLOIT".parse::<ModuleType>(), Ok(ModuleType::Exploit));
        assert_eq!("Auxiliary".parse::<ModuleType>(), Ok(ModuleType::Auxiliary));
        assert_eq!("nop".parse::<ModuleType>(), Ok(ModuleType::Nop));
        assert!("exploits".parse::<ModuleType>().is_err());
        assert!("".parse::<ModuleType>().is_err());
    }

    #[test]
    fn test_list_methods_are_distinct() {
        let mut methods: Vec<_> = ModuleType::ALL.iter().map(|t| t.list_method()).collect();
        methods.sort();
        methods.dedup();
        assert_eq!(methods.len(), 6);
    }

    #[test]
    fn test_only_exploits_have_targets() {
        for kind in ModuleType::ALL {
            assert_eq!(kind.has_targets(), kind == ModuleType::Exploit);
            assert_eq!(kind.has_payloads(), kind == ModuleType::Exploit);
        }
    }

    #[test]
    fn test_module_key_display() {
        let key = ModuleKey::new(ModuleType::Exploit, "windows/smb/ms17_010_eternalblue");
        assert_eq!(key.to_string(), "exploit/windows/smb/ms17_010_eternalblue");
    }

    #[test]
    fn test_session_kind_from_remote_type() {
        assert_eq!(SessionKind::from_remote_type("meterpreter"), Some(SessionKind::Meterpreter));
        assert_eq!(SessionKind::from_remote_type("shell"), Some(SessionKind::Shell));
        assert_eq!(SessionKind::from_remote_type("powershell"), Some(SessionKind::Shell));
        assert_eq!(SessionKind::from_remote_type("vnc"), None);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        assert_eq!(serde_json::to_value(SessionId(3)).unwrap(), serde_json::json!(3));
        assert_eq!(
            serde_json::to_value(ConsoleId("1".into())).unwrap(),
            serde_json::json!("1")
        );
    }
}
