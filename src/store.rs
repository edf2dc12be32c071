//! Flat-file persistence for the four bot collections.
//!
//! Each collection is a single JSON document under the data directory. Loads
//! never fail: a missing file yields the default value and a corrupt one is
//! moved aside to `<name>.json.corrupt` first. Saves go through a temporary
//! file and a rename so a crash mid-write leaves the previous snapshot intact.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Settings,
    Reminders,
    UserData,
    Blacklist,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Settings,
        Collection::Reminders,
        Collection::UserData,
        Collection::Blacklist,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Collection::Settings => "settings.json",
            Collection::Reminders => "reminders.json",
            Collection::UserData => "user_data.json",
            Collection::Blacklist => "blacklist.json",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Collection::Settings => 0,
            Collection::Reminders => 1,
            Collection::UserData => 2,
            Collection::Blacklist => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialise {collection:?}: {source}")]
    Serialize {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    pub fn load<T>(&self, collection: Collection) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path(collection);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {} yet, starting empty", path.display());
                return T::default();
            }
            Err(e) => {
                warn!("Could not read {}: {}. Using defaults", path.display(), e);
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("{} is corrupt ({}). Using defaults", path.display(), e);
                self.quarantine(&path);
                T::default()
            }
        }
    }

    pub fn save<T: Serialize>(&self, collection: Collection, value: &T) -> Result<(), StoreError> {
        let path = self.path(collection);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(value)
            .map_err(|source| StoreError::Serialize { collection, source })?;

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        debug!("Saved {}", path.display());
        Ok(())
    }

    fn quarantine(&self, path: &Path) {
        let target = path.with_extension("json.corrupt");
        if let Err(e) = fs::rename(path, &target) {
            warn!("Could not move {} aside: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let loaded: BTreeMap<String, u32> = store.load(Collection::UserData);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("nested"));
        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1u32);

        store.save(Collection::Settings, &value).unwrap();
        assert!(store.path(Collection::Settings).exists());
        assert!(!dir.path().join("nested/settings.json.tmp").exists());

        let loaded: BTreeMap<String, u32> = store.load(Collection::Settings);
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        fs::write(store.path(Collection::Blacklist), "{ not json").unwrap();

        let loaded: Vec<u64> = store.load(Collection::Blacklist);
        assert!(loaded.is_empty());
        assert!(!store.path(Collection::Blacklist).exists());
        assert!(dir.path().join("blacklist.json.corrupt").exists());
    }
}
