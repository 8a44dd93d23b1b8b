//! Flat-file JSON persistence
//!
//! Each store is one JSON object mapping an e-mail address to a value. Every
//! write replaces the whole file: the new contents go to a temporary file in
//! the same directory, which is then renamed over the old one. Writes within
//! the process are serialized; there is no cross-process locking.

mod accounts;
mod records;

use std::collections::BTreeMap;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use accounts::AccountStore;
pub use records::{LearningRecord, LearningRecordStore};

use crate::{Error, Result};

/// Whole-file JSON map keyed by string
pub struct JsonFileStore<V> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _value: PhantomData<fn() -> V>,
}

impl<V> JsonFileStore<V>
where
    V: Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
            _value: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole map; a missing file is an empty map
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Serialization` if the file exists but cannot be read
    pub fn load(&self) -> Result<BTreeMap<String, V>> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Value stored under `key`
    ///
    /// # Errors
    ///
    /// Same as [`JsonFileStore::load`]
    pub fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.load()?.remove(key))
    }

    /// Read, modify and rewrite the file under the write lock
    ///
    /// Nothing is written if `f` fails.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or `Io`/`Serialization` if the file
    /// cannot be read or replaced
    pub fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut BTreeMap<String, V>) -> Result<R>,
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        let out = f(&mut map)?;
        self.save(&map)?;
        Ok(out)
    }

    fn save(&self, map: &BTreeMap<String, V>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, map)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(path = %self.path.display(), entries = map.len(), "store written");
        Ok(())
    }
}

/// Normalize and check an e-mail key
///
/// # Errors
///
/// Returns `InputValidation` unless the address looks like `local@domain.tld`
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && domain.split('.').count() >= 2
            && domain.split('.').all(|part| !part.is_empty())
            && !email.chars().any(char::is_whitespace)
    });
    if valid {
        Ok(email)
    } else {
        Err(Error::invalid(format!("invalid e-mail address: {email}")))
    }
}
