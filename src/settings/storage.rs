use crate::Error;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persistent string key-value storage.
pub trait Storage: Send + Sync {
    /// Value of `key`.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Sets `key`, persisting before returning.
    fn set_item(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Removes `key`.
    fn remove_item(&self, key: &str) -> Result<(), Error>;

    /// All keys.
    fn keys(&self) -> Vec<String>;
}

/// Storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), Error> {
        self.items.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.items.read().keys().cloned().collect()
    }
}

/// Serialises read-modify-write cycles of every [`FileStorage`] in the process.
static FILE_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Storage kept in a single JSON file. Every read goes to disk and every
/// change rewrites the file, so handles on the same path see each other's
/// writes and the last write of each key wins.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Opens the storage file. A missing or unreadable file reads as empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let storage = FileStorage {
            path: path.as_ref().to_path_buf(),
        };
        if let Some(dir) = storage.path.parent() {
            fs::create_dir_all(dir)?;
        }
        Ok(storage)
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> BTreeMap<String, String> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read storage file");
                return BTreeMap::new();
            }
        };
        serde_json::from_reader(io::BufReader::new(file)).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "storage file is corrupt, reading as empty");
            BTreeMap::new()
        })
    }

    /// Applies `f` to the current contents and writes the result back
    /// through a temporary file, unless `f` reports no change.
    fn modify(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> Result<(), Error> {
        let _guard = FILE_LOCK.lock();
        let mut items = self.read();
        if !f(&mut items) {
            return Ok(());
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = io::BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut file, &items)?;
            file.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.read().remove(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        self.modify(|items| items.insert(key.to_string(), value.to_string()).as_deref() != Some(value))
    }

    fn remove_item(&self, key: &str) -> Result<(), Error> {
        self.modify(|items| items.remove(key).is_some())
    }

    fn keys(&self) -> Vec<String> {
        self.read().into_keys().collect()
    }
}
