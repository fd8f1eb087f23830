mod allocator;
mod driver;
mod error;
mod recovery;
mod sysfs;

pub use allocator::{InterfaceAllocator, ProvisionedInterface};
pub use driver::{LinkDriver, LinkInfo, LinkKind, StaticLinkDriver};
pub use error::NetworkError;
pub use recovery::{ReconcileReport, attached_tap_devices, reconcile, tap_devices_for};
pub use sysfs::{DEFAULT_SYSFS_ROOT, SysfsLinkDriver};
