//! Readiness predicates over human-readable tool output

use regex::Regex;

use crate::error::{L2tpError, L2tpResult};
use crate::validation;

/// Decides readiness from `ipsec status` and `ip addr show` text
pub trait StatusParser: Send + Sync {
    /// Whether the IPsec connection is reported as established
    fn parse_ipsec_status(&self, text: &str) -> bool;

    /// Whether the tunnel interface has an IPv4 address
    fn parse_interface_state(&self, text: &str) -> bool;
}

/// Both predicates sampled in the same tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessSignal {
    pub ipsec_established: bool,
    pub ppp_interface_up: bool,
}

impl ReadinessSignal {
    pub fn is_ready(&self) -> bool {
        self.ipsec_established && self.ppp_interface_up
    }
}

/// Regex matching for strongSwan and iproute2 output
///
/// strongSwan prints e.g.
/// `L2TP-PSK[1]: ESTABLISHED 3 seconds ago, 10.0.2.15[10.0.2.15]...203.0.113.5[203.0.113.5]`
/// and `ip addr show ppp0` prints an indented `inet 10.0.0.5 peer 10.0.0.1/32 ...` line.
#[derive(Debug, Clone)]
pub struct RegexStatusParser {
    established: Regex,
    inet: Regex,
}

impl RegexStatusParser {
    /// Parser for the strongSwan connection named `connection_name`
    pub fn new(connection_name: &str) -> L2tpResult<Self> {
        validation::validate_connection_name(connection_name)?;

        // IKE SA lines look like `<name>[<id>]: ESTABLISHED ...`
        let established = format!(
            r"(?m)^\s*{}\[\d+\]:\s+ESTABLISHED\b",
            regex::escape(connection_name)
        );

        Ok(Self {
            established: compile(&established)?,
            inet: compile(r"(?m)^\s*inet ")?,
        })
    }
}

fn compile(pattern: &str) -> L2tpResult<Regex> {
    Regex::new(pattern).map_err(|e| L2tpError::ParseError(format!("Invalid status pattern: {}", e)))
}

impl StatusParser for RegexStatusParser {
    fn parse_ipsec_status(&self, text: &str) -> bool {
        self.established.is_match(text)
    }

    fn parse_interface_state(&self, text: &str) -> bool {
        self.inet.is_match(text)
    }
}
