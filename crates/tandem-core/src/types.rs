//! Common types used throughout the server

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Identifier of a connection tracked by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier of a session tracked by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Transport security policy of a listening endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityPolicy {
    /// Plain connections only
    NoTls,
    /// Clients may upgrade to TLS
    AllowTls,
    /// Clients must upgrade to TLS before anything else
    #[default]
    RequireTls,
}

impl SecurityPolicy {
    /// Whether the policy needs certificate material to operate
    pub fn uses_tls(&self) -> bool {
        !matches!(self, SecurityPolicy::NoTls)
    }

    /// Canonical configuration spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityPolicy::NoTls => "no-tls",
            SecurityPolicy::AllowTls => "allow-tls",
            SecurityPolicy::RequireTls => "require-tls",
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-tls" => Ok(SecurityPolicy::NoTls),
            "allow-tls" => Ok(SecurityPolicy::AllowTls),
            "require-tls" => Ok(SecurityPolicy::RequireTls),
            other => Err(crate::Error::config(format!(
                "Invalid security policy: {other} (expected no-tls, allow-tls or require-tls)"
            ))),
        }
    }
}

/// Address family of a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv6
    Ipv6,
    /// IPv4
    Ipv4,
}

impl AddressFamily {
    /// Wildcard address of the family
    pub fn any_address(&self) -> IpAddr {
        match self {
            AddressFamily::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            AddressFamily::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Family of an address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V6(_) => AddressFamily::Ipv6,
            IpAddr::V4(_) => AddressFamily::Ipv4,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv6 => f.write_str("IPv6"),
            AddressFamily::Ipv4 => f.write_str("IPv4"),
        }
    }
}
