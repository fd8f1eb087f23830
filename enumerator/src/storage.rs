use crate::error::EnumeratorError;
use crate::types::EnumeratorManifest;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Where the enumerator keeps its manifest.
pub trait ManifestStore: Send + Sync {
    /// Returns `None` when nothing has been persisted yet.
    fn read_manifest(&self) -> Result<Option<EnumeratorManifest>, EnumeratorError>;

    fn write_manifest(&self, manifest: &EnumeratorManifest) -> Result<(), EnumeratorError>;
}

/// JSON manifest on the local filesystem.
pub struct FileManifestStore {
    path: PathBuf,
}

impl FileManifestStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ManifestStore for FileManifestStore {
    fn read_manifest(&self) -> Result<Option<EnumeratorManifest>, EnumeratorError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn write_manifest(&self, manifest: &EnumeratorManifest) -> Result<(), EnumeratorError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_vec_pretty(manifest)?;
        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&content)?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;
        // a counter must never fall back after a crash
        sync_parent_dir(&self.path)?;
        Ok(())
    }
}

/// Flush the directory entry of `path` so a preceding rename survives a
/// power loss.
pub(crate) fn sync_parent_dir(path: &Path) -> Result<(), EnumeratorError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::File::open(parent)?.sync_all()?;
    Ok(())
}

/// In-memory store with write-failure injection.
#[derive(Default)]
pub struct MemoryManifestStore {
    manifest: Mutex<Option<EnumeratorManifest>>,
    fail_writes: AtomicBool,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn manifest(&self) -> Option<EnumeratorManifest> {
        self.manifest.lock().clone()
    }
}

impl ManifestStore for MemoryManifestStore {
    fn read_manifest(&self) -> Result<Option<EnumeratorManifest>, EnumeratorError> {
        Ok(self.manifest.lock().clone())
    }

    fn write_manifest(&self, manifest: &EnumeratorManifest) -> Result<(), EnumeratorError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("injected manifest write failure").into());
        }
        *self.manifest.lock() = Some(manifest.clone());
        Ok(())
    }
}

impl<T: ManifestStore + ?Sized> ManifestStore for std::sync::Arc<T> {
    fn read_manifest(&self) -> Result<Option<EnumeratorManifest>, EnumeratorError> {
        (**self).read_manifest()
    }

    fn write_manifest(&self, manifest: &EnumeratorManifest) -> Result<(), EnumeratorError> {
        (**self).write_manifest(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let store = FileManifestStore::new(dir.path().join("enumerator.json"));
        assert!(store.read_manifest().unwrap().is_none());
    }

    #[test]
    fn test_file_store_write_and_read() {
        let dir = TempDir::new().unwrap();
        let store = FileManifestStore::new(dir.path().join("state").join("enumerator.json"));

        let manifest = EnumeratorManifest {
            tap_prefix: "tap".to_string(),
            bridge_prefix: "br".to_string(),
            tap_counter: 7,
            bridge_counter: 3,
        };
        store.write_manifest(&manifest).unwrap();

        assert_eq!(store.read_manifest().unwrap(), Some(manifest));
        assert!(!dir.path().join("state").join("enumerator.json.tmp").exists());
    }

    #[test]
    fn test_sync_parent_dir() {
        let dir = TempDir::new().unwrap();
        sync_parent_dir(&dir.path().join("enumerator.json")).unwrap();
        sync_parent_dir(Path::new("enumerator.json")).unwrap();

        let missing = dir.path().join("absent").join("enumerator.json");
        assert!(matches!(
            sync_parent_dir(&missing),
            Err(EnumeratorError::Io(_))
        ));
    }

    #[test]
    fn test_file_store_overwrite_leaves_single_file() {
        let dir = TempDir::new().unwrap();
        let store = FileManifestStore::new(dir.path().join("enumerator.json"));

        let mut manifest = EnumeratorManifest {
            tap_prefix: "tap".to_string(),
            bridge_prefix: "br".to_string(),
            tap_counter: 1,
            bridge_counter: 0,
        };
        store.write_manifest(&manifest).unwrap();
        manifest.tap_counter = 2;
        store.write_manifest(&manifest).unwrap();

        assert_eq!(store.read_manifest().unwrap(), Some(manifest));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_file_store_corrupt_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("enumerator.json");
        fs::write(&path, b"{not json").unwrap();

        let result = FileManifestStore::new(&path).read_manifest();
        assert!(matches!(result, Err(EnumeratorError::Serialization(_))));
    }
}
