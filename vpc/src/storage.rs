use crate::error::VpcError;
use crate::registry::TenantNetworks;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

pub const SNAPSHOT_FILE: &str = "vpc.snapshot.json";
pub const LOG_FILE: &str = "vpc.wal";

/// Outcome of a positioned read from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRead {
    /// Bytes placed at the front of the buffer.
    pub len: usize,
    /// The read stopped because the log ended.
    pub eof: bool,
}

/// Durable backing for the registry: one snapshot document plus one
/// append-only log.
pub trait VpcStorage: Send + Sync {
    /// Returns `None` when no snapshot has been written yet.
    fn read_snapshot(&self) -> Result<Option<RegistrySnapshot>, VpcError>;

    fn write_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<(), VpcError>;

    /// Append one encoded record. Must be durable when this returns `Ok`.
    fn append_record(&self, row: &[u8]) -> Result<(), VpcError>;

    /// Recreate the log empty.
    fn truncate_log(&self) -> Result<(), VpcError>;

    /// Fill `buffer` from the log starting at `offset`. A missing log reads
    /// as empty.
    fn read_chunk(&self, buffer: &mut [u8], offset: u64) -> Result<ChunkRead, VpcError>;
}

impl<T: VpcStorage + ?Sized> VpcStorage for std::sync::Arc<T> {
    fn read_snapshot(&self) -> Result<Option<RegistrySnapshot>, VpcError> {
        (**self).read_snapshot()
    }

    fn write_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<(), VpcError> {
        (**self).write_snapshot(snapshot)
    }

    fn append_record(&self, row: &[u8]) -> Result<(), VpcError> {
        (**self).append_record(row)
    }

    fn truncate_log(&self) -> Result<(), VpcError> {
        (**self).truncate_log()
    }

    fn read_chunk(&self, buffer: &mut [u8], offset: u64) -> Result<ChunkRead, VpcError> {
        (**self).read_chunk(buffer, offset)
    }
}

/// On-disk form of the registry: tenant id -> network CIDR -> bridge name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub tenants: BTreeMap<String, BTreeMap<String, String>>,
}

impl RegistrySnapshot {
    pub fn from_networks(networks: &TenantNetworks) -> Self {
        let tenants = networks
            .iter()
            .map(|(tenant, nets)| {
                let nets = nets
                    .iter()
                    .map(|(net, bridge)| (net.to_string(), bridge.clone()))
                    .collect();
                (tenant.to_string(), nets)
            })
            .collect();
        Self { tenants }
    }

    /// Parse keys back into typed form, re-masking every network.
    pub fn into_networks(self) -> Result<TenantNetworks, VpcError> {
        let mut networks = TenantNetworks::new();
        for (tenant, nets) in self.tenants {
            let tenant_id = Uuid::parse_str(&tenant)
                .map_err(|_| VpcError::CorruptSnapshot(format!("invalid tenant id {:?}", tenant)))?;
            let entry: &mut BTreeMap<Ipv4Net, String> = networks.entry(tenant_id).or_default();
            for (net, bridge) in nets {
                let network: Ipv4Net = net.parse().map_err(|_| {
                    VpcError::CorruptSnapshot(format!("invalid network {:?} for {}", net, tenant))
                })?;
                if let Some(existing) = entry.insert(network.trunc(), bridge.clone())
                    && existing != bridge
                {
                    return Err(VpcError::CorruptSnapshot(format!(
                        "network {} of {} bound to both {} and {}",
                        network.trunc(),
                        tenant,
                        existing,
                        bridge
                    )));
                }
            }
            if entry.is_empty() {
                networks.remove(&tenant_id);
            }
        }
        Ok(networks)
    }
}

/// Snapshot and log as plain files.
pub struct FileSystemVpcStorage {
    snapshot_path: PathBuf,
    log_path: PathBuf,
}

impl FileSystemVpcStorage {
    pub fn new(snapshot_path: impl AsRef<Path>, log_path: impl AsRef<Path>) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
            log_path: log_path.as_ref().to_path_buf(),
        }
    }

    /// Use the default file names inside `root`.
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join(SNAPSHOT_FILE), root.join(LOG_FILE))
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn ensure_parent(path: &Path) -> Result<(), VpcError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl VpcStorage for FileSystemVpcStorage {
    fn read_snapshot(&self) -> Result<Option<RegistrySnapshot>, VpcError> {
        let content = match fs::read_to_string(&self.snapshot_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn write_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<(), VpcError> {
        Self::ensure_parent(&self.snapshot_path)?;

        let mut name = self
            .snapshot_path
            .file_name()
            .unwrap_or_default()
            .to_os_string();
        name.push(".tmp");
        let temp_path = self.snapshot_path.with_file_name(name);

        let content = serde_json::to_vec_pretty(snapshot)?;
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.snapshot_path)?;
        // the rename must be durable before the log is truncated
        sync_parent_dir(&self.snapshot_path)?;
        Ok(())
    }

    fn append_record(&self, row: &[u8]) -> Result<(), VpcError> {
        Self::ensure_parent(&self.log_path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let len_before = file.metadata()?.len();

        if let Err(e) = file.write_all(row).and_then(|_| file.sync_data()) {
            // Never leave a partial record in front of later appends.
            if let Err(trunc_err) = file.set_len(len_before) {
                tracing::error!(
                    path = %self.log_path.display(),
                    error = %trunc_err,
                    "Failed to roll back partial log append"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn truncate_log(&self) -> Result<(), VpcError> {
        Self::ensure_parent(&self.log_path)?;
        let file = fs::File::create(&self.log_path)?;
        file.sync_all()?;
        Ok(())
    }

    fn read_chunk(&self, buffer: &mut [u8], offset: u64) -> Result<ChunkRead, VpcError> {
        let mut file = match fs::File::open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ChunkRead { len: 0, eof: true });
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buffer.len() {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => return Ok(ChunkRead { len: filled, eof: true }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ChunkRead {
            len: filled,
            eof: false,
        })
    }
}

/// Flush the directory entry of `path` so a preceding rename survives a
/// power loss.
pub(crate) fn sync_parent_dir(path: &Path) -> Result<(), VpcError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::File::open(parent)?.sync_all()?;
    Ok(())
}

/// In-memory storage with write-failure injection.
#[derive(Default)]
pub struct MemoryVpcStorage {
    snapshot: Mutex<Option<RegistrySnapshot>>,
    log: Mutex<Vec<u8>>,
    fail_writes: AtomicBool,
}

impl MemoryVpcStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Option<RegistrySnapshot> {
        self.snapshot.lock().clone()
    }

    pub fn log_bytes(&self) -> Vec<u8> {
        self.log.lock().clone()
    }

    pub fn set_log_bytes(&self, bytes: Vec<u8>) {
        *self.log.lock() = bytes;
    }

    fn check_writable(&self) -> Result<(), VpcError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("injected write failure").into());
        }
        Ok(())
    }
}

impl VpcStorage for MemoryVpcStorage {
    fn read_snapshot(&self) -> Result<Option<RegistrySnapshot>, VpcError> {
        Ok(self.snapshot.lock().clone())
    }

    fn write_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<(), VpcError> {
        self.check_writable()?;
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn append_record(&self, row: &[u8]) -> Result<(), VpcError> {
        self.check_writable()?;
        self.log.lock().extend_from_slice(row);
        Ok(())
    }

    fn truncate_log(&self) -> Result<(), VpcError> {
        self.check_writable()?;
        self.log.lock().clear();
        Ok(())
    }

    fn read_chunk(&self, buffer: &mut [u8], offset: u64) -> Result<ChunkRead, VpcError> {
        let log = self.log.lock();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(log.len());
        let len = buffer.len().min(log.len() - start);
        buffer[..len].copy_from_slice(&log[start..start + len]);
        Ok(ChunkRead {
            len,
            eof: len < buffer.len(),
        })
    }
}
