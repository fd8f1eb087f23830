use crate::chunk::ChunkedLogReader;
use crate::error::VpcError;
use crate::record::{AddNetwork, DeleteNetwork, DeleteTenant, LogRecord, LogRow};
use crate::storage::{RegistrySnapshot, VpcStorage};
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Replay buffer size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 512;

/// tenant -> canonical network -> bridge name
pub type TenantNetworks = BTreeMap<Uuid, BTreeMap<Ipv4Net, String>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub tenants: usize,
    pub networks: usize,
    pub replayed: usize,
    /// A torn record at the end of the log was discarded.
    pub truncated_tail: bool,
}

/// Tenant network registry backed by a snapshot and a write-ahead log.
///
/// Each (tenant, network) is bound to exactly one bridge; once bound the
/// bridge never changes until the binding is deleted. Every mutation is
/// appended to the log before it becomes visible in memory, all under one
/// lock, so readers never observe a change that is not durable.
pub struct VpcRegistry<S: VpcStorage> {
    storage: S,
    page_size: usize,
    networks: Mutex<TenantNetworks>,
}

impl<S: VpcStorage> VpcRegistry<S> {
    /// An empty registry. Call [`load_from_storage`](Self::load_from_storage)
    /// before serving requests.
    pub fn new(storage: S) -> Self {
        Self::with_page_size(storage, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(storage: S, page_size: usize) -> Self {
        Self {
            storage,
            page_size,
            networks: Mutex::new(TenantNetworks::new()),
        }
    }

    /// Construct and load in one step.
    pub fn open(storage: S, page_size: usize) -> Result<Self, VpcError> {
        let registry = Self::with_page_size(storage, page_size);
        registry.load_from_storage()?;
        Ok(registry)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Rebuild state from the snapshot plus the log, then compact.
    ///
    /// Replay applies records without re-appending them. If compaction was
    /// interrupted on a previous run the log may repeat changes already in
    /// the snapshot; replaying it again converges to the same state.
    pub fn load_from_storage(&self) -> Result<LoadSummary, VpcError> {
        let mut networks = self.networks.lock();

        let mut loaded = match self.storage.read_snapshot()? {
            Some(snapshot) => snapshot.into_networks()?,
            None => TenantNetworks::new(),
        };
        let (replayed, truncated_tail) = self.replay_log(&mut loaded)?;

        self.do_snapshot(&loaded)?;

        let summary = LoadSummary {
            tenants: loaded.len(),
            networks: loaded.values().map(BTreeMap::len).sum(),
            replayed,
            truncated_tail,
        };
        *networks = loaded;

        tracing::info!(
            tenants = summary.tenants,
            networks = summary.networks,
            replayed = summary.replayed,
            "Loaded VPC registry"
        );
        Ok(summary)
    }

    /// Bind `network` (re-masked) of `tenant` to `bridge`.
    ///
    /// Returns `true` when a new binding was logged, `false` when the same
    /// binding already existed. A different bridge for an existing binding
    /// is rejected with [`VpcError::BridgeMismatch`].
    pub fn add_network(
        &self,
        tenant: Uuid,
        network: Ipv4Net,
        bridge: &str,
    ) -> Result<bool, VpcError> {
        let network = network.trunc();
        let mut networks = self.networks.lock();

        if let Some(existing) = networks.get(&tenant).and_then(|nets| nets.get(&network)) {
            if existing == bridge {
                return Ok(false);
            }
            return Err(VpcError::BridgeMismatch {
                tenant,
                network,
                existing: existing.clone(),
                requested: bridge.to_string(),
            });
        }

        let record = AddNetwork::new(tenant, network, bridge)?;
        self.storage.append_record(&record.row())?;

        networks
            .entry(tenant)
            .or_default()
            .insert(network, bridge.to_string());

        tracing::info!(%tenant, %network, bridge, "Bound tenant network");
        Ok(true)
    }

    /// Remove one binding. Returns `false`, without logging anything, when
    /// there was nothing to remove.
    pub fn delete_network(&self, tenant: Uuid, network: Ipv4Net) -> Result<bool, VpcError> {
        let network = network.trunc();
        let mut networks = self.networks.lock();

        let bound = networks
            .get(&tenant)
            .is_some_and(|nets| nets.contains_key(&network));
        if !bound {
            return Ok(false);
        }

        self.storage
            .append_record(&DeleteNetwork::new(tenant, network).row())?;
        remove_network(&mut networks, tenant, network);

        tracing::info!(%tenant, %network, "Deleted tenant network");
        Ok(true)
    }

    /// Remove every binding of `tenant` with a single log record. Returns
    /// the number of bindings removed.
    pub fn delete_tenant(&self, tenant: Uuid) -> Result<usize, VpcError> {
        let mut networks = self.networks.lock();

        let Some(count) = networks.get(&tenant).map(BTreeMap::len) else {
            return Ok(0);
        };

        self.storage
            .append_record(&DeleteTenant::new(tenant).row())?;
        networks.remove(&tenant);

        tracing::info!(%tenant, networks = count, "Deleted tenant");
        Ok(count)
    }

    pub fn bridge_for(&self, tenant: Uuid, network: Ipv4Net) -> Option<String> {
        self.networks
            .lock()
            .get(&tenant)
            .and_then(|nets| nets.get(&network.trunc()))
            .cloned()
    }

    pub fn networks_of(&self, tenant: Uuid) -> BTreeMap<Ipv4Net, String> {
        self.networks
            .lock()
            .get(&tenant)
            .cloned()
            .unwrap_or_default()
    }

    pub fn tenants(&self) -> Vec<Uuid> {
        self.networks.lock().keys().copied().collect()
    }

    /// Copy of the whole registry.
    pub fn view(&self) -> TenantNetworks {
        self.networks.lock().clone()
    }

    /// Write a snapshot of the current state and empty the log.
    pub fn compact(&self) -> Result<(), VpcError> {
        let networks = self.networks.lock();
        self.do_snapshot(&networks)
    }

    fn do_snapshot(&self, networks: &TenantNetworks) -> Result<(), VpcError> {
        self.storage
            .write_snapshot(&RegistrySnapshot::from_networks(networks))?;
        self.storage.truncate_log()?;
        tracing::debug!(tenants = networks.len(), "Compacted VPC registry");
        Ok(())
    }

    fn replay_log(&self, networks: &mut TenantNetworks) -> Result<(usize, bool), VpcError> {
        let mut reader = ChunkedLogReader::new(&self.storage, self.page_size);
        let mut index = 0u64;
        let mut replayed = 0;

        loop {
            reader.get_buffered(index)?;
            // A lone trailing byte still goes through the decoder so that it
            // is reported as torn or corrupt instead of being dropped.
            let buffered_end = reader.buffer_start() + reader.buffer().len() as u64;
            if reader.end_of_file_reached() && index >= buffered_end {
                return Ok((replayed, false));
            }

            let local = match index.checked_sub(reader.buffer_start()) {
                Some(local) => local as usize,
                None => {
                    reader.slide_buffer_to_index(index)?;
                    continue;
                }
            };

            match LogRecord::parse(reader.buffer(), local) {
                Ok(record) => {
                    index += record.fixed_size() as u64;
                    apply_record(networks, &record);
                    replayed += 1;
                }
                Err(VpcError::NotEnoughBytes { needed, available }) => {
                    if reader.buffer_start() == index && reader.end_of_file_reached() {
                        tracing::warn!(
                            offset = index,
                            needed,
                            available,
                            "Discarding truncated record at end of log"
                        );
                        return Ok((replayed, true));
                    }
                    reader.slide_buffer_to_index(index)?;
                }
                Err(e) => {
                    tracing::error!(offset = index, error = %e, "Corrupt record in log");
                    return Err(e);
                }
            }
        }
    }
}

// Replay overwrites rather than rejecting a different bridge: the log is
// history, and its last word on a key is the truth.
fn apply_record(networks: &mut TenantNetworks, record: &LogRecord) {
    match record {
        LogRecord::AddNetwork(r) => {
            let previous = networks
                .entry(r.tenant())
                .or_default()
                .insert(r.network(), r.bridge().to_string());
            tracing::debug!(
                tenant = %r.tenant(),
                network = %r.network(),
                bridge = r.bridge(),
                previous = ?previous,
                "Replayed add network"
            );
        }
        LogRecord::DeleteNetwork(r) => {
            remove_network(networks, r.tenant(), r.network());
            tracing::debug!(tenant = %r.tenant(), network = %r.network(), "Replayed delete network");
        }
        LogRecord::DeleteTenant(r) => {
            networks.remove(&r.tenant());
            tracing::debug!(tenant = %r.tenant(), "Replayed delete tenant");
        }
    }
}

fn remove_network(networks: &mut TenantNetworks, tenant: Uuid, network: Ipv4Net) {
    if let Some(nets) = networks.get_mut(&tenant) {
        nets.remove(&network);
        if nets.is_empty() {
            networks.remove(&tenant);
        }
    }
}
