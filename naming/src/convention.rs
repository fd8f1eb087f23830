//! Kernel interface naming convention.
//!
//! Device names carry their own identity so that a scan of `ip link`
//! output can be matched back to VMs and tenants without the registry:
//!
//! ```text
//! <role>-<owner...>-<octet>-<octet>-<octet>-<octet>-<prefix-len>
//! ```
//!
//! The owner segment may contain hyphens (UUIDs, guest names). Decoding
//! always takes the last five tokens as the address and prefix length and
//! joins everything between the role and those five tokens as the owner.

use crate::error::NamingError;
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;

/// Role of a tap interface owned by a single VM.
pub const TAP_ROLE: &str = "chtap";
/// Role of the bridge realizing the host default network.
pub const DEFAULT_BRIDGE_ROLE: &str = "chbrdef";
/// Role of a bridge realizing a tenant VPC network.
pub const VPC_BRIDGE_ROLE: &str = "chbrvpc";

const SEPARATOR: char = '-';
const MIN_TOKENS: usize = 7;
const ADDRESS_TOKENS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConvention {
    pub role: String,
    pub owner: String,
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
}

impl NamingConvention {
    pub fn new(
        role: &str,
        owner: &str,
        ip: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<Self, NamingError> {
        if role.is_empty() || role.contains(SEPARATOR) {
            return Err(NamingError::InvalidRole(role.to_string()));
        }
        if prefix_len > 32 {
            return Err(NamingError::InvalidPrefixLength(prefix_len));
        }

        Ok(Self {
            role: role.to_string(),
            owner: owner.to_string(),
            ip,
            prefix_len,
        })
    }

    pub fn parse(name: &str) -> Result<Self, NamingError> {
        let parts: Vec<&str> = name.split(SEPARATOR).collect();
        if parts.len() < MIN_TOKENS {
            return Err(NamingError::MalformedName(name.to_string()));
        }

        let tail = &parts[parts.len() - ADDRESS_TOKENS..];
        let mut octets = [0u8; 4];
        for (octet, token) in octets.iter_mut().zip(&tail[..4]) {
            *octet = parse_decimal(token)
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| NamingError::MalformedName(name.to_string()))?;
        }
        let prefix_len = parse_decimal(tail[4])
            .filter(|v| *v <= 32)
            .ok_or_else(|| NamingError::MalformedName(name.to_string()))? as u8;

        Ok(Self {
            role: parts[0].to_string(),
            owner: parts[1..parts.len() - ADDRESS_TOKENS].join("-"),
            ip: Ipv4Addr::from(octets),
            prefix_len,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}-{}-{}",
            self.role,
            self.owner,
            ip_to_device_string(self.ip, self.prefix_len)
        )
    }

    /// Exact, case-sensitive role comparison.
    pub fn is(&self, role: &str) -> bool {
        self.role == role
    }

    pub fn is_virtual_machine_tap(&self) -> bool {
        self.is(TAP_ROLE)
    }

    pub fn is_bridge(&self) -> bool {
        self.is(DEFAULT_BRIDGE_ROLE) || self.is(VPC_BRIDGE_ROLE)
    }

    pub fn network(&self) -> Ipv4Net {
        // prefix_len is validated on every construction path
        Ipv4Net::new(self.ip, self.prefix_len)
            .map(|net| net.trunc())
            .unwrap_or_else(|_| Ipv4Net::from(self.ip))
    }

    pub fn netmask(&self) -> Ipv4Addr {
        self.network().netmask()
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Render `ip` and `prefix_len` as the five trailing device-name tokens,
/// e.g. `192-168-0-4-24`.
pub fn ip_to_device_string(ip: Ipv4Addr, prefix_len: u8) -> String {
    let [a, b, c, d] = ip.octets();
    format!("{}-{}-{}-{}-{}", a, b, c, d, prefix_len)
}

fn parse_decimal(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 3 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
