mod convention;
mod error;
mod generator;

pub use convention::{
    DEFAULT_BRIDGE_ROLE, NamingConvention, TAP_ROLE, VPC_BRIDGE_ROLE, ip_to_device_string,
};
pub use error::NamingError;
pub use generator::{
    DEFAULT_BRIDGE_OWNER, DeviceNameGenerator, DeviceNames, NetworkIdentifier, parse_cidr4,
};
