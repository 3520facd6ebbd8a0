//! File-backed device store.
//!
//! Each key is stored in its own file under the store directory. Keys are
//! URL-encoded into the file name so any key maps to a single path segment.
//! Writes go to a temporary file first and are renamed into place. Each
//! write gets its own temporary name (process id plus a counter), so
//! concurrent writers never share one.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{DeviceStore, DeviceStoreError};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Device store persisting each key as a file in one directory.
#[derive(Debug, Clone)]
pub struct FileDeviceStore {
    dir: PathBuf,
}

impl FileDeviceStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// the first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the key files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }

    fn tmp_path_for(&self, key: &str) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.json.{}.{n}.tmp",
            urlencoding::encode(key),
            std::process::id()
        ))
    }
}

impl DeviceStore for FileDeviceStore {
    fn get(&self, key: &str) -> Result<Option<String>, DeviceStoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DeviceStoreError> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.tmp_path_for(key);
        let written = fs::write(&tmp, value).and_then(|()| fs::rename(&tmp, self.path_for(key)));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written.map_err(DeviceStoreError::from)
    }

    fn remove(&self, key: &str) -> Result<(), DeviceStoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
