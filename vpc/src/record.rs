//! Write-ahead log records for the tenant network registry.
//!
//! The log is a bare concatenation of fixed-size records with no header and
//! no separators. The first byte of every record is its tag, and the tag
//! alone determines the record length:
//!
//! - AddNetwork (37 bytes): tag, tenant (16), address (4), prefix (1),
//!   bridge name (15, NUL padded)
//! - DeleteNetwork (22 bytes): tag, tenant (16), address (4), prefix (1)
//! - DeleteTenant (17 bytes): tag, tenant (16)
//!
//! Addresses are stored in network byte order.

use crate::error::VpcError;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use uuid::Uuid;

/// Width of the bridge-name field: IFNAMSIZ without the terminator.
pub const BRIDGE_NAME_WIDTH: usize = 15;

const TENANT_LEN: usize = 16;
const NETWORK_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordTag {
    AddNetwork = 1,
    DeleteNetwork = 2,
    DeleteTenant = 3,
}

impl RecordTag {
    /// Largest fixed size of any record.
    pub const MAX_SIZE: usize = 1 + TENANT_LEN + NETWORK_LEN + BRIDGE_NAME_WIDTH;

    pub fn from_byte(byte: u8) -> Result<Self, VpcError> {
        match byte {
            1 => Ok(RecordTag::AddNetwork),
            2 => Ok(RecordTag::DeleteNetwork),
            3 => Ok(RecordTag::DeleteTenant),
            other => Err(VpcError::UnknownRecordTag(other)),
        }
    }

    pub const fn fixed_size(self) -> usize {
        match self {
            RecordTag::AddNetwork => 1 + TENANT_LEN + NETWORK_LEN + BRIDGE_NAME_WIDTH,
            RecordTag::DeleteNetwork => 1 + TENANT_LEN + NETWORK_LEN,
            RecordTag::DeleteTenant => 1 + TENANT_LEN,
        }
    }
}

/// Common shape of the three record types.
pub trait LogRow: Sized {
    const TAG: RecordTag;

    /// Decode a record starting at `offset`, where `buffer[offset]` holds the
    /// tag byte.
    fn parse(buffer: &[u8], offset: usize) -> Result<Self, VpcError>;

    /// Encode the record, tag first.
    fn row(&self) -> Vec<u8>;

    fn fixed_size(&self) -> usize {
        Self::TAG.fixed_size()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddNetwork {
    tenant: Uuid,
    network: Ipv4Net,
    bridge: String,
}

impl AddNetwork {
    /// Fails if `bridge` does not fit the fixed-width field; names are never
    /// truncated.
    pub fn new(tenant: Uuid, network: Ipv4Net, bridge: &str) -> Result<Self, VpcError> {
        validate_bridge_name(bridge)?;
        Ok(Self {
            tenant,
            network: network.trunc(),
            bridge: bridge.to_string(),
        })
    }

    pub fn tenant(&self) -> Uuid {
        self.tenant
    }

    pub fn network(&self) -> Ipv4Net {
        self.network
    }

    pub fn bridge(&self) -> &str {
        &self.bridge
    }
}

impl LogRow for AddNetwork {
    const TAG: RecordTag = RecordTag::AddNetwork;

    fn parse(buffer: &[u8], offset: usize) -> Result<Self, VpcError> {
        let record = frame(buffer, offset, Self::TAG)?;
        let bridge_start = 1 + TENANT_LEN + NETWORK_LEN;
        Ok(Self {
            tenant: read_tenant(record),
            network: read_network(record)?,
            bridge: read_bridge_name(&record[bridge_start..bridge_start + BRIDGE_NAME_WIDTH])?,
        })
    }

    fn row(&self) -> Vec<u8> {
        let mut row = Vec::with_capacity(Self::TAG.fixed_size());
        row.push(Self::TAG as u8);
        row.extend_from_slice(self.tenant.as_bytes());
        write_network(&mut row, self.network);
        let mut field = [0u8; BRIDGE_NAME_WIDTH];
        field[..self.bridge.len()].copy_from_slice(self.bridge.as_bytes());
        row.extend_from_slice(&field);
        row
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNetwork {
    tenant: Uuid,
    network: Ipv4Net,
}

impl DeleteNetwork {
    pub fn new(tenant: Uuid, network: Ipv4Net) -> Self {
        Self {
            tenant,
            network: network.trunc(),
        }
    }

    pub fn tenant(&self) -> Uuid {
        self.tenant
    }

    pub fn network(&self) -> Ipv4Net {
        self.network
    }
}

impl LogRow for DeleteNetwork {
    const TAG: RecordTag = RecordTag::DeleteNetwork;

    fn parse(buffer: &[u8], offset: usize) -> Result<Self, VpcError> {
        let record = frame(buffer, offset, Self::TAG)?;
        Ok(Self {
            tenant: read_tenant(record),
            network: read_network(record)?,
        })
    }

    fn row(&self) -> Vec<u8> {
        let mut row = Vec::with_capacity(Self::TAG.fixed_size());
        row.push(Self::TAG as u8);
        row.extend_from_slice(self.tenant.as_bytes());
        write_network(&mut row, self.network);
        row
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTenant {
    tenant: Uuid,
}

impl DeleteTenant {
    pub fn new(tenant: Uuid) -> Self {
        Self { tenant }
    }

    pub fn tenant(&self) -> Uuid {
        self.tenant
    }
}

impl LogRow for DeleteTenant {
    const TAG: RecordTag = RecordTag::DeleteTenant;

    fn parse(buffer: &[u8], offset: usize) -> Result<Self, VpcError> {
        let record = frame(buffer, offset, Self::TAG)?;
        Ok(Self {
            tenant: read_tenant(record),
        })
    }

    fn row(&self) -> Vec<u8> {
        let mut row = Vec::with_capacity(Self::TAG.fixed_size());
        row.push(Self::TAG as u8);
        row.extend_from_slice(self.tenant.as_bytes());
        row
    }
}

/// Any record found in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    AddNetwork(AddNetwork),
    DeleteNetwork(DeleteNetwork),
    DeleteTenant(DeleteTenant),
}

impl LogRecord {
    /// Peek the tag at `offset` and decode the matching record.
    pub fn parse(buffer: &[u8], offset: usize) -> Result<Self, VpcError> {
        let tag = *buffer.get(offset).ok_or(VpcError::NotEnoughBytes {
            needed: 1,
            available: 0,
        })?;

        match RecordTag::from_byte(tag)? {
            RecordTag::AddNetwork => AddNetwork::parse(buffer, offset).map(LogRecord::AddNetwork),
            RecordTag::DeleteNetwork => {
                DeleteNetwork::parse(buffer, offset).map(LogRecord::DeleteNetwork)
            }
            RecordTag::DeleteTenant => {
                DeleteTenant::parse(buffer, offset).map(LogRecord::DeleteTenant)
            }
        }
    }

    pub fn row(&self) -> Vec<u8> {
        match self {
            LogRecord::AddNetwork(r) => r.row(),
            LogRecord::DeleteNetwork(r) => r.row(),
            LogRecord::DeleteTenant(r) => r.row(),
        }
    }

    pub fn tag(&self) -> RecordTag {
        match self {
            LogRecord::AddNetwork(_) => RecordTag::AddNetwork,
            LogRecord::DeleteNetwork(_) => RecordTag::DeleteNetwork,
            LogRecord::DeleteTenant(_) => RecordTag::DeleteTenant,
        }
    }

    pub fn fixed_size(&self) -> usize {
        self.tag().fixed_size()
    }

    pub fn tenant(&self) -> Uuid {
        match self {
            LogRecord::AddNetwork(r) => r.tenant(),
            LogRecord::DeleteNetwork(r) => r.tenant(),
            LogRecord::DeleteTenant(r) => r.tenant(),
        }
    }
}

impl From<AddNetwork> for LogRecord {
    fn from(record: AddNetwork) -> Self {
        LogRecord::AddNetwork(record)
    }
}

impl From<DeleteNetwork> for LogRecord {
    fn from(record: DeleteNetwork) -> Self {
        LogRecord::DeleteNetwork(record)
    }
}

impl From<DeleteTenant> for LogRecord {
    fn from(record: DeleteTenant) -> Self {
        LogRecord::DeleteTenant(record)
    }
}

/// Bounds- and tag-check a record, returning exactly its bytes.
fn frame(buffer: &[u8], offset: usize, tag: RecordTag) -> Result<&[u8], VpcError> {
    let needed = tag.fixed_size();
    let available = buffer.len().saturating_sub(offset);
    if available < needed {
        return Err(VpcError::NotEnoughBytes { needed, available });
    }

    let record = &buffer[offset..offset + needed];
    if record[0] != tag as u8 {
        return Err(VpcError::TagMismatch {
            expected: tag as u8,
            found: record[0],
        });
    }
    Ok(record)
}

fn read_tenant(record: &[u8]) -> Uuid {
    let mut bytes = [0u8; TENANT_LEN];
    bytes.copy_from_slice(&record[1..1 + TENANT_LEN]);
    Uuid::from_bytes(bytes)
}

// Host bits are cleared on read so that a stale or damaged record can never
// name a different network than its canonical form.
fn read_network(record: &[u8]) -> Result<Ipv4Net, VpcError> {
    let start = 1 + TENANT_LEN;
    let mut octets = [0u8; 4];
    octets.copy_from_slice(&record[start..start + 4]);
    let prefix_len = record[start + 4];
    let network = Ipv4Net::new(Ipv4Addr::from(octets), prefix_len)
        .map_err(|_| VpcError::InvalidPrefixLength(prefix_len))?;
    Ok(network.trunc())
}

fn write_network(row: &mut Vec<u8>, network: Ipv4Net) {
    row.extend_from_slice(&network.network().octets());
    row.push(network.prefix_len());
}

fn read_bridge_name(field: &[u8]) -> Result<String, VpcError> {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    let name = std::str::from_utf8(&field[..end])
        .map_err(|_| VpcError::InvalidBridgeName(String::from_utf8_lossy(field).into_owned()))?;
    if name.is_empty() {
        return Err(VpcError::InvalidBridgeName(String::new()));
    }
    Ok(name.to_string())
}

fn validate_bridge_name(name: &str) -> Result<(), VpcError> {
    if name.len() > BRIDGE_NAME_WIDTH {
        return Err(VpcError::BridgeNameTooLong {
            name: name.to_string(),
            max: BRIDGE_NAME_WIDTH,
        });
    }
    if name.is_empty() || name.contains('\0') {
        return Err(VpcError::InvalidBridgeName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TENANT: &str = "c8ddee26-bc2b-465a-9726-483f117cf618";

    fn tenant() -> Uuid {
        Uuid::parse_str(TENANT).unwrap()
    }

    fn add_network_bytes() -> Vec<u8> {
        let mut row = vec![RecordTag::AddNetwork as u8];
        row.extend_from_slice(tenant().as_bytes());
        row.extend_from_slice(&[10, 0, 0, 0, 24]);
        row.extend_from_slice(b"chbr-0000000001");
        row
    }

    #[test]
    fn test_add_network_row() {
        let record =
            AddNetwork::new(tenant(), "10.0.0.0/24".parse().unwrap(), "chbr-0000000001").unwrap();
        let row = record.row();
        assert_eq!(row, add_network_bytes());
        assert_eq!(row.len(), record.fixed_size());
        assert_eq!(row.len(), 37);
    }

    #[test]
    fn test_add_network_parse() {
        let record = AddNetwork::parse(&add_network_bytes(), 0).unwrap();
        assert_eq!(record.tenant().to_string(), TENANT);
        assert_eq!(record.network().to_string(), "10.0.0.0/24");
        assert_eq!(record.bridge(), "chbr-0000000001");
    }

    #[test]
    fn test_add_network_short_name_is_padded() {
        let record = AddNetwork::new(tenant(), "10.1.0.0/16".parse().unwrap(), "brvm-7").unwrap();
        let row = record.row();
        assert_eq!(row.len(), 37);
        assert_eq!(&row[22..28], b"brvm-7");
        assert!(row[28..].iter().all(|b| *b == 0));
        assert_eq!(AddNetwork::parse(&row, 0).unwrap(), record);
    }

    #[test]
    fn test_add_network_rejects_long_name() {
        let result = AddNetwork::new(
            tenant(),
            "10.0.0.0/24".parse().unwrap(),
            "chbr-00000000001",
        );
        assert!(matches!(
            result,
            Err(VpcError::BridgeNameTooLong { max: 15, .. })
        ));
        assert!(matches!(
            AddNetwork::new(tenant(), "10.0.0.0/24".parse().unwrap(), ""),
            Err(VpcError::InvalidBridgeName(_))
        ));
    }

    #[test]
    fn test_add_network_parse_masks_host_bits() {
        let mut row = add_network_bytes();
        row[17..21].copy_from_slice(&[10, 0, 0, 77]);
        let record = AddNetwork::parse(&row, 0).unwrap();
        assert_eq!(record.network().to_string(), "10.0.0.0/24");
    }

    #[test]
    fn test_add_network_parse_at_offset() {
        let mut buffer = vec![0xAA; 5];
        buffer.extend_from_slice(&add_network_bytes());
        let record = AddNetwork::parse(&buffer, 5).unwrap();
        assert_eq!(record.bridge(), "chbr-0000000001");
    }

    #[test]
    fn test_add_network_not_enough_bytes() {
        let row = add_network_bytes();
        let result = AddNetwork::parse(&row[..30], 0);
        assert!(matches!(
            result,
            Err(VpcError::NotEnoughBytes {
                needed: 37,
                available: 30
            })
        ));
        assert!(AddNetwork::parse(&row, 1).is_err());
    }

    #[test]
    fn test_add_network_bad_prefix() {
        let mut row = add_network_bytes();
        row[21] = 33;
        assert!(matches!(
            AddNetwork::parse(&row, 0),
            Err(VpcError::InvalidPrefixLength(33))
        ));
    }

    #[test]
    fn test_delete_network_row_and_parse() {
        let record = DeleteNetwork::new(tenant(), "10.0.0.9/24".parse().unwrap());
        let row = record.row();

        let mut expected = vec![RecordTag::DeleteNetwork as u8];
        expected.extend_from_slice(tenant().as_bytes());
        expected.extend_from_slice(&[10, 0, 0, 0, 24]);
        assert_eq!(row, expected);

        let parsed = DeleteNetwork::parse(&row, 0).unwrap();
        assert_eq!(parsed.tenant().to_string(), TENANT);
        assert_eq!(parsed.network().to_string(), "10.0.0.0/24");
    }

    #[test]
    fn test_delete_tenant_row_and_parse() {
        let record = DeleteTenant::new(tenant());
        let row = record.row();
        assert_eq!(row.len(), 17);
        assert_eq!(row[0], RecordTag::DeleteTenant as u8);
        assert_eq!(&row[1..], tenant().as_bytes());
        assert_eq!(DeleteTenant::parse(&row, 0).unwrap().tenant(), tenant());
    }

    #[test]
    fn test_tag_mismatch() {
        let row = DeleteTenant::new(tenant()).row();
        assert!(matches!(
            DeleteNetwork::parse(&[row.clone(), vec![0; 8]].concat(), 0),
            Err(VpcError::TagMismatch {
                expected: 2,
                found: 3
            })
        ));
    }

    #[test]
    fn test_log_record_dispatch() {
        let mut log = add_network_bytes();
        log.extend(DeleteNetwork::new(tenant(), "10.0.0.0/24".parse().unwrap()).row());
        log.extend(DeleteTenant::new(tenant()).row());

        let mut offset = 0;
        let mut tags = Vec::new();
        while offset < log.len() {
            let record = LogRecord::parse(&log, offset).unwrap();
            assert_eq!(record.tenant(), tenant());
            tags.push(record.tag());
            offset += record.fixed_size();
        }
        assert_eq!(
            tags,
            vec![
                RecordTag::AddNetwork,
                RecordTag::DeleteNetwork,
                RecordTag::DeleteTenant
            ]
        );
        assert_eq!(offset, log.len());
    }

    #[test]
    fn test_log_record_unknown_tag() {
        assert!(matches!(
            LogRecord::parse(&[0u8; 40], 0),
            Err(VpcError::UnknownRecordTag(0))
        ));
        assert!(matches!(
            LogRecord::parse(&[9u8; 40], 0),
            Err(VpcError::UnknownRecordTag(9))
        ));
    }

    #[test]
    fn test_log_record_empty_buffer() {
        assert!(matches!(
            LogRecord::parse(&[], 0),
            Err(VpcError::NotEnoughBytes { .. })
        ));
    }
}
