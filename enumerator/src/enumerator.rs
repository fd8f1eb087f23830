use crate::error::EnumeratorError;
use crate::storage::ManifestStore;
use crate::types::{DeviceKind, EnumeratorManifest};
use parking_lot::Mutex;

/// Issues tap and bridge names that are never reused for the lifetime of
/// the on-disk manifest.
///
/// Every allocation persists the advanced counter before the name is handed
/// out; if the write fails the in-memory counter is left untouched, so a
/// crash can never cause the same name to be issued twice after restart.
pub struct DeviceNameEnumerator<S: ManifestStore> {
    store: S,
    manifest: Mutex<EnumeratorManifest>,
}

impl<S: ManifestStore> DeviceNameEnumerator<S> {
    /// Load the persisted manifest, or start from the default prefixes with
    /// both counters at zero when none exists yet.
    pub fn open(store: S) -> Result<Self, EnumeratorError> {
        let manifest = match store.read_manifest()? {
            Some(manifest) => {
                tracing::info!(
                    tap_counter = manifest.tap_counter,
                    bridge_counter = manifest.bridge_counter,
                    "Loaded device name enumerator"
                );
                manifest
            }
            None => {
                tracing::info!("No enumerator snapshot found, starting from defaults");
                EnumeratorManifest::default()
            }
        };

        Ok(Self {
            store,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn new_tap_name(&self) -> Result<String, EnumeratorError> {
        self.allocate(DeviceKind::Tap)
    }

    pub fn new_bridge_name(&self) -> Result<String, EnumeratorError> {
        self.allocate(DeviceKind::Bridge)
    }

    pub fn tap_name(&self, number: u32) -> String {
        self.manifest.lock().name(DeviceKind::Tap, number)
    }

    pub fn bridge_name(&self, number: u32) -> String {
        self.manifest.lock().name(DeviceKind::Bridge, number)
    }

    pub fn counters(&self) -> EnumeratorManifest {
        self.manifest.lock().clone()
    }

    /// Persist the current state without allocating.
    pub fn make_snapshot(&self) -> Result<(), EnumeratorError> {
        let manifest = self.manifest.lock();
        self.store.write_manifest(&manifest)
    }

    fn allocate(&self, kind: DeviceKind) -> Result<String, EnumeratorError> {
        let mut manifest = self.manifest.lock();

        let next = manifest
            .counter(kind)
            .checked_add(1)
            .ok_or(EnumeratorError::Exhausted(kind))?;

        let mut advanced = manifest.clone();
        *advanced.counter_mut(kind) = next;
        self.store.write_manifest(&advanced)?;

        let name = advanced.name(kind, next);
        *manifest = advanced;

        tracing::debug!(kind = %kind, name = %name, "Allocated device name");
        Ok(name)
    }
}
