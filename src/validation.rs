/*!
 * Input validation for user-supplied identifiers
 *
 * Every check here is pure and runs before the connection manager is touched,
 * independent of whatever the remote service validates itself.
 */

use msf_core_interface::{ConsoleId, ModuleType};
use std::net::IpAddr;
use std::time::Duration;

use crate::config::MAX_TIMEOUT_SECS;
use crate::error::{BridgeError, Result};

/// Longest module name accepted
const MAX_MODULE_NAME_LEN: usize = 256;

/// Longest workspace name accepted
const MAX_WORKSPACE_NAME_LEN: usize = 64;

/// Parse a module type, case-insensitively, into one of the six kinds
pub fn module_type(raw: &str) -> Result<ModuleType> {
    raw.parse::<ModuleType>().map_err(|_| {
        let valid: Vec<&str> = ModuleType::ALL.iter().map(ModuleType::as_str).collect();
        BridgeError::invalid(format!(
            "Invalid module type: '{}'. Must be one of: {}",
            raw,
            valid.join(", ")
        ))
    })
}

/// Accept names made of letters, digits, `/`, `_` and `-` with no empty path segment
pub fn module_name(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(BridgeError::invalid("Module name is empty"));
    }
    if raw.len() > MAX_MODULE_NAME_LEN {
        return Err(BridgeError::invalid(format!(
            "Module name longer than {MAX_MODULE_NAME_LEN} characters"
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-');
    if !raw.chars().all(allowed) {
        return Err(BridgeError::invalid(format!(
            "Invalid module name: '{raw}'. Only letters, digits, '/', '_' and '-' are allowed"
        )));
    }
    if raw.split('/').any(str::is_empty) {
        return Err(BridgeError::invalid(format!(
            "Invalid module name: '{raw}'. Empty path segment"
        )));
    }
    Ok(raw.to_string())
}

/// Option names are strictly alphanumeric
pub fn option_name(raw: &str) -> Result<String> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BridgeError::invalid(format!(
            "Invalid option name: '{raw}'. Only letters and digits are allowed"
        )));
    }
    Ok(raw.to_string())
}

pub fn console_id(raw: &str) -> Result<ConsoleId> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BridgeError::invalid(format!("Invalid console id: '{raw}'")));
    }
    Ok(ConsoleId(raw.to_string()))
}

pub fn workspace_name(raw: &str) -> Result<String> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
    if raw.is_empty() || raw.len() > MAX_WORKSPACE_NAME_LEN || !raw.chars().all(allowed) {
        return Err(BridgeError::invalid(format!(
            "Invalid workspace name: '{raw}'. Use up to {MAX_WORKSPACE_NAME_LEN} letters, digits, '_', '-' or '.'"
        )));
    }
    Ok(raw.to_string())
}

/// An IP address, an IP/CIDR block, or a hostname
pub fn address(raw: &str) -> Result<String> {
    let invalid = || BridgeError::invalid(format!("Invalid address: '{raw}'"));

    if let Some((ip, prefix)) = raw.split_once('/') {
        let ip: IpAddr = ip.parse().map_err(|_| invalid())?;
        let max = if ip.is_ipv4() { 32 } else { 128 };
        match prefix.parse::<u8>() {
            Ok(bits) if bits <= max => return Ok(raw.to_string()),
            _ => return Err(invalid()),
        }
    }
    if raw.parse::<IpAddr>().is_ok() {
        return Ok(raw.to_string());
    }

    let hostname_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-');
    if raw.is_empty()
        || raw.len() > 253
        || !raw.chars().all(hostname_char)
        || raw.starts_with(['.', '-'])
        || raw.contains("..")
    {
        return Err(invalid());
    }
    Ok(raw.to_string())
}

/// `tcp` or `udp`, normalized to lowercase
pub fn protocol(raw: &str) -> Result<String> {
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "tcp" | "udp" => Ok(lower),
        _ => Err(BridgeError::invalid(format!(
            "Invalid protocol: '{raw}'. Must be tcp or udp"
        ))),
    }
}

pub fn timeout_secs(secs: u64) -> Result<Duration> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(BridgeError::invalid(format!(
            "Timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

pub fn command(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(BridgeError::invalid("Command is empty"));
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_module_type_accepts_all_kinds_any_case() {
        for kind in ModuleType::ALL {
            let name = kind.as_str();
            assert_eq!(module_type(name).unwrap(), kind);
            assert_eq!(module_type(&name.to_uppercase()).unwrap(), kind);
        }
        assert_eq!(module_type("ExPlOiT").unwrap(), ModuleType::Exploit);
    }

    #[test]
    fn test_module_type_rejects_others() {
        for raw in ["", "exploits", "payloads", "shellcode", "exploit ", "post;rm"] {
            let err = module_type(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{raw:?}");
        }
    }

    #[test]
    fn test_module_name() {
        assert!(module_name("windows/smb/ms17_010_eternalblue").is_ok());
        assert!(module_name("multi/handler").is_ok());
        assert!(module_name("scanner/http/http-version").is_ok());

        for bad in [
            "",
            "../../etc/passwd",
            "windows/../x",
            "multi/handler; rm -rf /",
            "multi handler",
            "multi/handler\n",
            "/multi/handler",
            "multi//handler",
            "multi/handler/",
            "exploit.rb",
            "$(id)",
        ] {
            assert!(module_name(bad).is_err(), "accepted {bad:?}");
        }
        assert!(module_name(&"a".repeat(MAX_MODULE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_option_name() {
        assert!(option_name("RHOSTS").is_ok());
        assert!(option_name("LPORT").is_ok());
        assert!(option_name("SSL2").is_ok());
        for bad in ["", "RHOSTS ", "A_B", "a-b", "x=y", "ÄB"] {
            assert!(option_name(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_console_id() {
        assert_eq!(console_id("3").unwrap(), ConsoleId("3".to_string()));
        assert!(console_id("").is_err());
        assert!(console_id("1; ls").is_err());
    }

    #[test]
    fn test_workspace_name() {
        assert!(workspace_name("default").is_ok());
        assert!(workspace_name("client-a_2024.q1").is_ok());
        assert!(workspace_name("").is_err());
        assert!(workspace_name("two words").is_err());
        assert!(workspace_name(&"w".repeat(65)).is_err());
    }

    #[test]
    fn test_address() {
        for good in ["10.0.0.5", "10.0.0.0/24", "::1", "fe80::/10", "target.example.com"] {
            assert!(address(good).is_ok(), "rejected {good:?}");
        }
        for bad in ["", "10.0.0.0/33", "::/129", "host name", "a..b", "-host", "10.0.0.5;id"] {
            assert!(address(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_protocol() {
        assert_eq!(protocol("TCP").unwrap(), "tcp");
        assert_eq!(protocol("udp").unwrap(), "udp");
        assert!(protocol("icmp").is_err());
    }

    #[test]
    fn test_timeout_bounds() {
        assert_eq!(timeout_secs(1).unwrap(), Duration::from_secs(1));
        assert_eq!(timeout_secs(3600).unwrap(), Duration::from_secs(3600));
        assert!(timeout_secs(0).is_err());
        assert!(timeout_secs(3601).is_err());
    }

    #[test]
    fn test_command_not_blank() {
        assert!(command("sysinfo").is_ok());
        assert!(command("   ").is_err());
    }
}
