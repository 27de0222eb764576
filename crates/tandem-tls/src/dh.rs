//! Diffie-Hellman group material
//!
//! Groups are the finite-field groups of RFC 7919, selected by name. Named
//! groups need no generation step, so "ensuring" parameters either reuses the
//! live ones or resolves the configured name.
//!
//! The `ring` provider has no finite-field key exchange. The configured group
//! instead sets the minimum strength of the elliptic-curve groups a TLS
//! handshake may use, see [`DhParams::key_exchange_groups`].

use rustls::crypto::ring::kx_group;
use rustls::crypto::SupportedKxGroup;
use rustls::NamedGroup;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tandem_core::{Error, Result};
use tracing::debug;

/// Diffie-Hellman parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DhParams {
    /// 2048-bit group
    Ffdhe2048,
    /// 3072-bit group
    Ffdhe3072,
    /// 4096-bit group
    Ffdhe4096,
    /// 6144-bit group
    Ffdhe6144,
    /// 8192-bit group
    Ffdhe8192,
}

impl DhParams {
    /// Prime size in bits
    pub fn bits(&self) -> u32 {
        match self {
            DhParams::Ffdhe2048 => 2048,
            DhParams::Ffdhe3072 => 3072,
            DhParams::Ffdhe4096 => 4096,
            DhParams::Ffdhe6144 => 6144,
            DhParams::Ffdhe8192 => 8192,
        }
    }

    /// Estimated security strength in bits (RFC 7919, section 8.5)
    pub fn strength_bits(&self) -> u32 {
        match self {
            DhParams::Ffdhe2048 => 103,
            DhParams::Ffdhe3072 => 125,
            DhParams::Ffdhe4096 => 150,
            DhParams::Ffdhe6144 => 175,
            DhParams::Ffdhe8192 => 192,
        }
    }

    /// Key exchange groups at least as strong as this group, in preference order
    ///
    /// Never empty: secp384r1 matches even the largest group.
    pub fn key_exchange_groups(&self) -> Vec<&'static dyn SupportedKxGroup> {
        let minimum = self.strength_bits();
        [kx_group::X25519, kx_group::SECP256R1, kx_group::SECP384R1]
            .into_iter()
            .filter(|group| curve_strength_bits(group.name()) >= minimum)
            .collect()
    }

    /// TLS group identifier
    pub fn named_group(&self) -> NamedGroup {
        match self {
            DhParams::Ffdhe2048 => NamedGroup::FFDHE2048,
            DhParams::Ffdhe3072 => NamedGroup::FFDHE3072,
            DhParams::Ffdhe4096 => NamedGroup::FFDHE4096,
            DhParams::Ffdhe6144 => NamedGroup::FFDHE6144,
            DhParams::Ffdhe8192 => NamedGroup::FFDHE8192,
        }
    }

    /// Configuration spelling of the group
    pub fn name(&self) -> &'static str {
        match self {
            DhParams::Ffdhe2048 => "ffdhe2048",
            DhParams::Ffdhe3072 => "ffdhe3072",
            DhParams::Ffdhe4096 => "ffdhe4096",
            DhParams::Ffdhe6144 => "ffdhe6144",
            DhParams::Ffdhe8192 => "ffdhe8192",
        }
    }

    /// Make sure parameters for `group` exist
    ///
    /// Live parameters of the same group are reused as they are.
    pub fn ensure(live: Option<&Arc<DhParams>>, group: &str) -> Result<Arc<DhParams>> {
        let wanted: DhParams = group.parse()?;

        match live {
            Some(live) if **live == wanted => {
                debug!(group = %wanted, "Reusing live DH parameters");
                Ok(Arc::clone(live))
            }
            _ => {
                debug!(group = %wanted, bits = wanted.bits(), "Resolved DH parameters");
                Ok(Arc::new(wanted))
            }
        }
    }
}

fn curve_strength_bits(group: NamedGroup) -> u32 {
    match group {
        NamedGroup::X25519 | NamedGroup::secp256r1 => 128,
        NamedGroup::secp384r1 => 192,
        NamedGroup::secp521r1 => 256,
        _ => 0,
    }
}

impl fmt::Display for DhParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DhParams {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ffdhe2048" => Ok(DhParams::Ffdhe2048),
            "ffdhe3072" => Ok(DhParams::Ffdhe3072),
            "ffdhe4096" => Ok(DhParams::Ffdhe4096),
            "ffdhe6144" => Ok(DhParams::Ffdhe6144),
            "ffdhe8192" => Ok(DhParams::Ffdhe8192),
            other => Err(Error::security(format!("Unknown DH group: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group() {
        assert_eq!("ffdhe3072".parse::<DhParams>().unwrap(), DhParams::Ffdhe3072);
        assert_eq!("FFDHE2048".parse::<DhParams>().unwrap().bits(), 2048);
        assert!("modp1024".parse::<DhParams>().is_err());
    }

    #[test]
    fn test_ensure_reuses_live() {
        let live = Arc::new(DhParams::Ffdhe2048);
        let ensured = DhParams::ensure(Some(&live), "ffdhe2048").unwrap();
        assert!(Arc::ptr_eq(&live, &ensured));
    }

    #[test]
    fn test_ensure_resolves_new_group() {
        let live = Arc::new(DhParams::Ffdhe2048);
        let ensured = DhParams::ensure(Some(&live), "ffdhe4096").unwrap();
        assert_eq!(*ensured, DhParams::Ffdhe4096);
        assert_eq!(ensured.named_group(), NamedGroup::FFDHE4096);

        assert!(DhParams::ensure(None, "bogus").is_err());
    }

    fn offered(params: DhParams) -> Vec<NamedGroup> {
        params.key_exchange_groups().iter().map(|g| g.name()).collect()
    }

    #[test]
    fn test_key_exchange_groups_follow_strength() {
        let all = vec![NamedGroup::X25519, NamedGroup::secp256r1, NamedGroup::secp384r1];
        assert_eq!(offered(DhParams::Ffdhe2048), all);
        assert_eq!(offered(DhParams::Ffdhe3072), all);

        assert_eq!(offered(DhParams::Ffdhe4096), vec![NamedGroup::secp384r1]);
        assert_eq!(offered(DhParams::Ffdhe8192), vec![NamedGroup::secp384r1]);
    }
}
