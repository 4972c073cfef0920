use super::{EnvelopeError, Result};
use ip_network::IpNetwork;
use std::net::{AddrParseError, IpAddr};
use std::num::ParseIntError;

/// CIDR gate for batch updates.
///
/// Host bits in the configured address are ignored, so `10.0.0.7/8`
/// admits the whole `10.0.0.0/8` range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedSubnet(IpNetwork);

impl TrustedSubnet {
    pub fn parse(cidr: &str) -> Result<Self> {
        let invalid = |reason: String| EnvelopeError::Subnet {
            cidr: cidr.to_string(),
            reason,
        };
        let (addr, mask) = cidr
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("missing prefix length".to_string()))?;
        let addr: IpAddr = addr.parse().map_err(|e: AddrParseError| invalid(e.to_string()))?;
        let mask: u8 = mask.parse().map_err(|e: ParseIntError| invalid(e.to_string()))?;
        IpNetwork::new_truncate(addr, mask)
            .map(Self)
            .map_err(|e| invalid(e.to_string()))
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (&self.0, ip) {
            (IpNetwork::V4(net), IpAddr::V4(addr)) => net.contains(addr),
            (IpNetwork::V6(net), IpAddr::V6(addr)) => net.contains(addr),
            _ => false,
        }
    }

    /// Checks a client-declared address; absent or unparseable is untrusted.
    pub fn admits(&self, declared: Option<&str>) -> bool {
        declared
            .and_then(|raw| raw.trim().parse::<IpAddr>().ok())
            .is_some_and(|ip| self.contains(ip))
    }
}

impl std::fmt::Display for TrustedSubnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
