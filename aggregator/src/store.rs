use crate::*;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The full persisted content of a store
pub type Mapping = BTreeMap<String, Value>;

/// A crash-safe store of small JSON records keyed by string, persisted as one JSON file.
///
/// Every write serializes the whole mapping to a sibling `.tmp` file, syncs it to disk
/// and renames it over the previous file, so a crash leaves either the old or the new
/// version and never a mix of both.
///
/// A missing, empty or unparsable file is treated as an empty mapping and rewritten,
/// so the content of a corrupted file is lost. A single record that parses as JSON
/// but not as the expected type is dropped the same way by [`FileStore::get_valid`]
/// and [`FileStore::decode`].
///
/// All access goes through one in-process lock. Two processes sharing the same file
/// are NOT coordinated.
///
/// Every call is blocking file I/O, including an `fsync` of the file and of its
/// directory on each write. Async callers run it inline on their worker thread; the
/// stores are small and written once per ballot or checkpoint.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (or create) the store at `path`, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let store = FileStore {
            path,
            lock: Mutex::new(()),
        };

        // Self-heal right away so a damaged file is reported at startup
        {
            let _guard = store.lock.lock();
            store.load()?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole mapping
    pub fn read(&self) -> Result<Mapping, Error> {
        let _guard = self.lock.lock();
        self.load()
    }

    /// Replace the whole mapping
    pub fn write(&self, mapping: &Mapping) -> Result<(), Error> {
        let _guard = self.lock.lock();
        self.persist(mapping)
    }

    /// Get and deserialize a single record
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, Error> {
        let mapping = self.read()?;
        match mapping.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Get a single record, dropping it from the store if it does not deserialize as `V`
    pub fn get_valid<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, Error> {
        let _guard = self.lock.lock();
        let mut mapping = self.load()?;
        let record = match mapping.get(key) {
            Some(value) => self.decode(key, value),
            None => return Ok(None),
        };
        if record.is_none() {
            mapping.remove(key);
            self.persist(&mapping)?;
        }
        Ok(record)
    }

    /// Deserialize a record taken from the mapping, logging it and returning `None` if
    /// it has the wrong shape
    pub fn decode<V: DeserializeOwned>(&self, key: &str, value: &Value) -> Option<V> {
        match serde_json::from_value(value.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    key,
                    error = %e,
                    "dropping unreadable record"
                );
                None
            }
        }
    }

    /// Insert or replace a single record
    pub fn put<V: Serialize>(&self, key: &str, value: &V) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        self.update(|mapping| {
            mapping.insert(key.to_owned(), value);
            Ok(())
        })
    }

    /// Remove a single record, returning whether it existed
    pub fn remove(&self, key: &str) -> Result<bool, Error> {
        let _guard = self.lock.lock();
        let mut mapping = self.load()?;
        if mapping.remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&mapping)?;
        Ok(true)
    }

    /// Run a read-modify-write cycle under the store lock.
    ///
    /// The mapping is persisted only if `f` succeeds.
    pub fn update<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Mapping) -> Result<T, Error>,
    {
        let _guard = self.lock.lock();
        let mut mapping = self.load()?;
        let result = f(&mut mapping)?;
        self.persist(&mapping)?;
        Ok(result)
    }

    // Must be called with the lock held
    fn load(&self) -> Result<Mapping, Error> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.persist(&Mapping::new())?;
                return Ok(Mapping::new());
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            warn!(path = %self.path.display(), "store file is empty, reinitializing");
            self.persist(&Mapping::new())?;
            return Ok(Mapping::new());
        }

        match serde_json::from_slice::<Mapping>(&bytes) {
            Ok(mapping) => Ok(mapping),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "store file is corrupt, reinitializing to an empty mapping"
                );
                self.persist(&Mapping::new())?;
                Ok(Mapping::new())
            }
        }
    }

    // Must be called with the lock held
    fn persist(&self, mapping: &Mapping) -> Result<(), Error> {
        let encoded = serde_json::to_vec(mapping)?;

        let tmp_path = tmp_path(&self.path);
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&encoded)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            sync_directory(parent)?;
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> Result<(), Error> {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> Result<(), Error> {
    Ok(())
}
