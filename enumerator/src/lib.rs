mod enumerator;
mod error;
mod storage;
mod types;

pub use enumerator::DeviceNameEnumerator;
pub use error::EnumeratorError;
pub use storage::{FileManifestStore, ManifestStore, MemoryManifestStore};
pub use types::{DEFAULT_BRIDGE_PREFIX, DEFAULT_TAP_PREFIX, DeviceKind, EnumeratorManifest};
