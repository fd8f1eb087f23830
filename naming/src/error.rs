use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("malformed device name: {0}")]
    MalformedName(String),

    #[error("invalid device role: {0:?}")]
    InvalidRole(String),

    #[error("invalid prefix length: {0}")]
    InvalidPrefixLength(u8),

    #[error("expected an ipv4 address: {0}")]
    InvalidAddress(String),

    #[error("expected a contiguous ipv4 mask: {0}")]
    InvalidMask(String),
}
