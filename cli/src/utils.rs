use ipnet::Ipv4Net;
use std::path::PathBuf;
use vmnet_enumerator::{DeviceNameEnumerator, EnumeratorError, FileManifestStore};
use vmnet_network::InterfaceAllocator;
use vmnet_vpc::{FileSystemVpcStorage, VpcError, VpcRegistry};

pub const ENUMERATOR_FILE: &str = "enumerator.json";

pub type Registry = VpcRegistry<FileSystemVpcStorage>;
pub type Enumerator = DeviceNameEnumerator<FileManifestStore>;
pub type Allocator = InterfaceAllocator<FileSystemVpcStorage, FileManifestStore>;

/// Global options shared by every command.
pub struct Context {
    pub data_dir: PathBuf,
    pub page_size: usize,
    pub sysfs_root: PathBuf,
    pub default_network: Ipv4Net,
}

impl Context {
    /// Load the registry, replaying and compacting the log.
    pub fn open_registry(&self) -> Result<Registry, VpcError> {
        VpcRegistry::open(FileSystemVpcStorage::in_dir(&self.data_dir), self.page_size)
    }

    pub fn open_enumerator(&self) -> Result<Enumerator, EnumeratorError> {
        DeviceNameEnumerator::open(FileManifestStore::new(
            self.data_dir.join(ENUMERATOR_FILE),
        ))
    }

    pub fn open_allocator(&self) -> Result<Allocator, Box<dyn std::error::Error>> {
        Ok(InterfaceAllocator::new(
            self.open_registry()?,
            self.open_enumerator()?,
        ))
    }
}

pub fn print_networks(networks: &vmnet_vpc::TenantNetworks) {
    if networks.is_empty() {
        println!("No networks found");
        return;
    }

    println!("{:<38} {:<20} {:<16}", "TENANT", "NETWORK", "BRIDGE");
    for (tenant, nets) in networks {
        for (network, bridge) in nets {
            println!("{:<38} {:<20} {:<16}", tenant, network, bridge);
        }
    }
}
