use crate::error::NetworkError;
use ipnet::Ipv4Net;
use uuid::Uuid;
use vmnet_enumerator::{DeviceNameEnumerator, ManifestStore};
use vmnet_vpc::{VpcError, VpcRegistry, VpcStorage};

/// Names handed back to the orchestrator for one VM interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedInterface {
    pub tap: String,
    pub bridge: String,
    /// The bridge was bound by this call and does not exist on the host yet.
    pub new_bridge: bool,
}

/// Hands out tap names and tenant bridges: every VM of a tenant on the
/// same network shares one bridge, every VM interface gets its own tap.
pub struct InterfaceAllocator<V: VpcStorage, M: ManifestStore> {
    registry: VpcRegistry<V>,
    enumerator: DeviceNameEnumerator<M>,
}

impl<V: VpcStorage, M: ManifestStore> InterfaceAllocator<V, M> {
    pub fn new(registry: VpcRegistry<V>, enumerator: DeviceNameEnumerator<M>) -> Self {
        Self {
            registry,
            enumerator,
        }
    }

    pub fn registry(&self) -> &VpcRegistry<V> {
        &self.registry
    }

    pub fn enumerator(&self) -> &DeviceNameEnumerator<M> {
        &self.enumerator
    }

    /// Resolve the tenant's bridge for `network`, binding a freshly minted
    /// one if none exists, and allocate a new tap.
    pub fn provision(
        &self,
        tenant: Uuid,
        network: Ipv4Net,
    ) -> Result<ProvisionedInterface, NetworkError> {
        let network = network.trunc();
        // A looked-up bridge is re-claimed under the registry lock so that a
        // release racing with this call cannot leave it unbound.
        let (bridge, new_bridge) = match self.registry.bridge_for(tenant, network) {
            Some(bridge) => self.claim_bridge(tenant, network, bridge)?,
            None => {
                let candidate = self.enumerator.new_bridge_name()?;
                self.claim_bridge(tenant, network, candidate)?
            }
        };
        let tap = self.enumerator.new_tap_name()?;

        tracing::info!(%tenant, %network, tap = %tap, bridge = %bridge, "Provisioned interface");
        Ok(ProvisionedInterface {
            tap,
            bridge,
            new_bridge,
        })
    }

    /// Forget every network of `tenant`. Returns the number of bindings
    /// removed.
    pub fn release_tenant(&self, tenant: Uuid) -> Result<usize, NetworkError> {
        Ok(self.registry.delete_tenant(tenant)?)
    }

    /// Bind `bridge` unless the network already has one, and return the
    /// bridge that ends up bound.
    fn claim_bridge(
        &self,
        tenant: Uuid,
        network: Ipv4Net,
        bridge: String,
    ) -> Result<(String, bool), NetworkError> {
        match self.registry.add_network(tenant, network, &bridge) {
            Ok(bound) => Ok((bridge, bound)),
            // lost a race with another provision of the same network
            Err(VpcError::BridgeMismatch { existing, .. }) => {
                tracing::debug!(
                    %tenant,
                    %network,
                    unused = %bridge,
                    bridge = %existing,
                    "Bridge already bound"
                );
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vmnet_enumerator::{FileManifestStore, MemoryManifestStore};
    use vmnet_vpc::{DEFAULT_PAGE_SIZE, FileSystemVpcStorage, MemoryVpcStorage};

    type MemoryAllocator = InterfaceAllocator<Arc<MemoryVpcStorage>, Arc<MemoryManifestStore>>;

    fn memory_allocator() -> (MemoryAllocator, Arc<MemoryVpcStorage>, Arc<MemoryManifestStore>) {
        let storage = Arc::new(MemoryVpcStorage::new());
        let store = Arc::new(MemoryManifestStore::new());
        let allocator = InterfaceAllocator::new(
            VpcRegistry::open(storage.clone(), DEFAULT_PAGE_SIZE).unwrap(),
            DeviceNameEnumerator::open(store.clone()).unwrap(),
        );
        (allocator, storage, store)
    }

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_provision_shares_bridge_per_network() {
        let (allocator, _, _) = memory_allocator();
        let tenant = Uuid::new_v4();

        let first = allocator.provision(tenant, net("10.0.0.0/24")).unwrap();
        assert_eq!(
            first,
            ProvisionedInterface {
                tap: "tpvm-1".to_string(),
                bridge: "brvm-1".to_string(),
                new_bridge: true,
            }
        );

        let second = allocator.provision(tenant, net("10.0.0.9/24")).unwrap();
        assert_eq!(second.bridge, "brvm-1");
        assert_eq!(second.tap, "tpvm-2");
        assert!(!second.new_bridge);

        let other_net = allocator.provision(tenant, net("10.0.1.0/24")).unwrap();
        assert_eq!(other_net.bridge, "brvm-2");

        let other_tenant = allocator
            .provision(Uuid::new_v4(), net("10.0.0.0/24"))
            .unwrap();
        assert_eq!(other_tenant.bridge, "brvm-3");
    }

    #[test]
    fn test_release_tenant() {
        let (allocator, _, _) = memory_allocator();
        let tenant = Uuid::new_v4();
        allocator.provision(tenant, net("10.0.0.0/24")).unwrap();
        allocator.provision(tenant, net("10.0.1.0/24")).unwrap();

        assert_eq!(allocator.release_tenant(tenant).unwrap(), 2);
        assert!(allocator.registry().networks_of(tenant).is_empty());
        assert_eq!(allocator.release_tenant(tenant).unwrap(), 0);

        // bridge names are never reused after release
        let again = allocator.provision(tenant, net("10.0.0.0/24")).unwrap();
        assert_eq!(again.bridge, "brvm-3");
    }

    #[test]
    fn test_stale_lookup_rebinds_released_bridge() {
        let (allocator, storage, _) = memory_allocator();
        let tenant = Uuid::new_v4();
        let network = net("10.0.0.0/24");
        assert_eq!(allocator.provision(tenant, network).unwrap().bridge, "brvm-1");

        // a release lands between the lookup and the claim
        allocator.release_tenant(tenant).unwrap();
        let claimed = allocator
            .claim_bridge(tenant, network, "brvm-1".to_string())
            .unwrap();
        assert_eq!(claimed, ("brvm-1".to_string(), true));
        assert_eq!(
            allocator.registry().bridge_for(tenant, network).as_deref(),
            Some("brvm-1")
        );

        let next = allocator.provision(tenant, network).unwrap();
        assert_eq!(next.bridge, "brvm-1");
        assert!(!next.new_bridge);

        let reloaded = VpcRegistry::open(storage, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(reloaded.bridge_for(tenant, network).as_deref(), Some("brvm-1"));
    }

    #[test]
    fn test_provision_racing_release_stays_registered() {
        let (allocator, _, _) = memory_allocator();
        let allocator = Arc::new(allocator);
        let tenant = Uuid::new_v4();
        let network = net("10.0.0.0/24");

        let releaser = {
            let allocator = allocator.clone();
            std::thread::spawn(move || {
                for _ in 0..32 {
                    allocator.release_tenant(tenant).unwrap();
                }
            })
        };
        let last = (0..32)
            .map(|_| allocator.provision(tenant, network).unwrap())
            .last()
            .unwrap();
        releaser.join().unwrap();

        // anything still bound is the bridge the last provision handed out
        if let Some(bridge) = allocator.registry().bridge_for(tenant, network) {
            assert_eq!(bridge, last.bridge);
        }
        allocator.release_tenant(tenant).unwrap();
        assert!(allocator.registry().networks_of(tenant).is_empty());
    }

    #[test]
    fn test_failed_bind_keeps_registry_unchanged() {
        let (allocator, storage, _) = memory_allocator();
        let tenant = Uuid::new_v4();

        storage.set_fail_writes(true);
        let result = allocator.provision(tenant, net("10.0.0.0/24"));
        assert!(matches!(result, Err(NetworkError::Vpc(ref e)) if e.is_persistence()));
        assert!(allocator.registry().tenants().is_empty());

        storage.set_fail_writes(false);
        let provisioned = allocator.provision(tenant, net("10.0.0.0/24")).unwrap();
        assert_eq!(provisioned.bridge, "brvm-2");
        assert_eq!(provisioned.tap, "tpvm-1");
    }

    #[test]
    fn test_failed_tap_allocation_is_reported() {
        let (allocator, _, store) = memory_allocator();
        store.set_fail_writes(true);
        let result = allocator.provision(Uuid::new_v4(), net("10.0.0.0/24"));
        assert!(matches!(result, Err(NetworkError::Enumerator(_))));
    }

    #[test]
    fn test_concurrent_provision_converges() {
        let (allocator, _, _) = memory_allocator();
        let allocator = Arc::new(allocator);
        let tenant = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || {
                    allocator
                        .provision(tenant, net("10.0.0.0/24"))
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<ProvisionedInterface> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let bridges: BTreeSet<&str> = results.iter().map(|r| r.bridge.as_str()).collect();
        let taps: BTreeSet<&str> = results.iter().map(|r| r.tap.as_str()).collect();
        assert_eq!(bridges.len(), 1);
        assert_eq!(taps.len(), 8);
        assert_eq!(results.iter().filter(|r| r.new_bridge).count(), 1);
        assert_eq!(
            allocator.registry().bridge_for(tenant, net("10.0.0.0/24")).as_deref(),
            bridges.into_iter().next()
        );
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        let tenant = Uuid::new_v4();
        let open = || {
            InterfaceAllocator::new(
                VpcRegistry::open(FileSystemVpcStorage::in_dir(dir.path()), DEFAULT_PAGE_SIZE)
                    .unwrap(),
                DeviceNameEnumerator::open(FileManifestStore::new(
                    dir.path().join("enumerator.json"),
                ))
                .unwrap(),
            )
        };

        let first = open().provision(tenant, net("10.0.0.0/24")).unwrap();
        let second = open().provision(tenant, net("10.0.0.0/24")).unwrap();

        assert_eq!(first.bridge, second.bridge);
        assert_ne!(first.tap, second.tap);
        assert!(!second.new_bridge);
    }
}
