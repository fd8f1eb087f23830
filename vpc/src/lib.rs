mod chunk;
mod error;
mod record;
mod registry;
mod storage;

pub use chunk::ChunkedLogReader;
pub use error::VpcError;
pub use record::{
    AddNetwork, BRIDGE_NAME_WIDTH, DeleteNetwork, DeleteTenant, LogRecord, LogRow, RecordTag,
};
pub use registry::{DEFAULT_PAGE_SIZE, LoadSummary, TenantNetworks, VpcRegistry};
pub use storage::{
    ChunkRead, FileSystemVpcStorage, LOG_FILE, MemoryVpcStorage, RegistrySnapshot,
    SNAPSHOT_FILE, VpcStorage,
};
