use crate::convention::{DEFAULT_BRIDGE_ROLE, NamingConvention, TAP_ROLE, VPC_BRIDGE_ROLE};
use crate::error::NamingError;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Owner token of the bridge realizing the host default network.
pub const DEFAULT_BRIDGE_OWNER: &str = "host";

/// Identity of one VM interface as requested by the orchestrator.
#[derive(Debug, Clone)]
pub struct NetworkIdentifier {
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
    pub tenant: String,
    pub guest_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNames {
    pub bridge: String,
    pub tap: String,
    /// Reserved for overlay networking, never populated.
    pub vxlan: Option<String>,
}

/// Derives self-describing tap and bridge names, separating guests on the
/// host default network from guests on a tenant VPC.
#[derive(Debug, Clone)]
pub struct DeviceNameGenerator {
    default_network: Ipv4Net,
}

impl DeviceNameGenerator {
    pub fn new(default_network: Ipv4Net) -> Self {
        Self {
            default_network: default_network.trunc(),
        }
    }

    pub fn default_network(&self) -> Ipv4Net {
        self.default_network
    }

    pub fn generate(&self, id: &NetworkIdentifier) -> Result<DeviceNames, NamingError> {
        let network = Ipv4Net::new(id.ip, id.prefix_len)
            .map_err(|_| NamingError::InvalidPrefixLength(id.prefix_len))?
            .trunc();

        let (bridge, tap) = if self.is_default_network(id) {
            (
                NamingConvention::new(
                    DEFAULT_BRIDGE_ROLE,
                    DEFAULT_BRIDGE_OWNER,
                    self.default_network.network(),
                    id.prefix_len,
                )?,
                NamingConvention::new(TAP_ROLE, &id.guest_name, id.ip, id.prefix_len)?,
            )
        } else {
            (
                NamingConvention::new(
                    VPC_BRIDGE_ROLE,
                    &id.tenant,
                    network.network(),
                    id.prefix_len,
                )?,
                NamingConvention::new(TAP_ROLE, &id.tenant, id.ip, id.prefix_len)?,
            )
        };

        let names = DeviceNames {
            bridge: bridge.encode(),
            tap: tap.encode(),
            vxlan: None,
        };
        tracing::debug!(bridge = %names.bridge, tap = %names.tap, "generated device names");
        Ok(names)
    }

    fn is_default_network(&self, id: &NetworkIdentifier) -> bool {
        id.prefix_len == self.default_network.prefix_len() && self.default_network.contains(&id.ip)
    }
}

/// Parse an address and a dotted-quad mask into the host address and its
/// canonical network, e.g. `("10.0.0.2", "255.255.255.0")` gives
/// `10.0.0.2` and `10.0.0.0/24`.
pub fn parse_cidr4(ip: &str, mask: &str) -> Result<(Ipv4Addr, Ipv4Net), NamingError> {
    let ip: Ipv4Addr = ip
        .trim()
        .parse()
        .map_err(|_| NamingError::InvalidAddress(ip.to_string()))?;
    let mask_addr: Ipv4Addr = mask
        .trim()
        .parse()
        .map_err(|_| NamingError::InvalidMask(mask.to_string()))?;
    let prefix_len = ipnet::ipv4_mask_to_prefix(mask_addr)
        .map_err(|_| NamingError::InvalidMask(mask.to_string()))?;
    let network = Ipv4Net::new(ip, prefix_len)
        .map_err(|_| NamingError::InvalidPrefixLength(prefix_len))?
        .trunc();
    Ok((ip, network))
}
