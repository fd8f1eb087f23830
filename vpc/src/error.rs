use ipnet::Ipv4Net;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum VpcError {
    #[error("not enough bytes: record needs {needed}, {available} available")]
    NotEnoughBytes { needed: usize, available: usize },

    #[error("unknown record tag: {0:#04x}")]
    UnknownRecordTag(u8),

    #[error("record tag mismatch: expected {expected:#04x}, found {found:#04x}")]
    TagMismatch { expected: u8, found: u8 },

    #[error(
        "bridge mismatch for tenant {tenant} network {network}: bound to {existing}, requested {requested}"
    )]
    BridgeMismatch {
        tenant: Uuid,
        network: Ipv4Net,
        existing: String,
        requested: String,
    },

    #[error("bridge name exceeds {max} bytes: {name}")]
    BridgeNameTooLong { name: String, max: usize },

    #[error("invalid bridge name: {0:?}")]
    InvalidBridgeName(String),

    #[error("invalid prefix length: {0}")]
    InvalidPrefixLength(u8),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VpcError {
    /// True when the snapshot or log could not be read or written.
    pub fn is_persistence(&self) -> bool {
        matches!(self, VpcError::Io(_) | VpcError::Serialization(_))
    }
}
