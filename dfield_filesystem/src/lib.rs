//! A filesystem store for the [`dfield`](https://docs.rs/dfield/latest/dfield/index.html) crate.
//!
//! Keys map directly onto paths below a base directory, which gives the standard N5 filesystem layout:
//! `<base>/<dataset>/attributes.json` and `<base>/<dataset>/<g0>/<g1>/...` for blocks.
//!
//! ## Licence
//! `dfield_filesystem` is licensed under either of
//! - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license or <http://opensource.org/licenses/MIT>, at your option.

use std::{
    collections::HashMap,
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};

use dfield_storage::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StorePrefix, WritableStorageTraits,
};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use walkdir::WalkDir;

type KeyLock = Arc<RwLock<()>>;

/// A synchronous file system store.
///
/// Blocks of one dataset are written concurrently, so each key gets its own lock.
/// Readers and writers of the same key are serialised.
/// A key's lock is dropped from the lock table once no request holds it.
/// Erasing a prefix holds the lock table, which blocks requests to keys that have not been touched yet.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    readonly: bool,
    key_locks: Mutex<HashMap<StoreKey, KeyLock>>,
}

/// Treats a missing file or directory as absent rather than as an error.
fn ignore_not_found<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

impl FilesystemStore {
    /// Open the directory at `base_path` as a store, creating it if it does not exist.
    ///
    /// The store is read only if the directory is.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_path` is not valid unicode, is a file, or cannot be created.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }

        let readonly = match ignore_not_found(fs::metadata(&base_path))? {
            Some(metadata) if metadata.is_dir() => metadata.permissions().readonly(),
            Some(_) => return Err(FilesystemStoreCreateError::InvalidBasePath(base_path)),
            None => {
                fs::create_dir_all(&base_path)?;
                false
            }
        };

        Ok(Self {
            base_path,
            readonly,
            key_locks: Mutex::default(),
        })
    }

    /// Returns the base path of the store.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Returns true if the store is read only.
    #[must_use]
    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// Maps a [`StoreKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        self.base_path.join(key.as_str())
    }

    /// Maps a [`StorePrefix`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn prefix_to_fspath(&self, prefix: &StorePrefix) -> PathBuf {
        self.base_path.join(prefix.as_str())
    }

    fn fspath_to_key(&self, path: &Path) -> Option<StoreKey> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect();
        StoreKey::new(parts.join("/")).ok()
    }

    fn key_lock(&self, key: &StoreKey) -> KeyLock {
        self.key_locks.lock().entry(key.clone()).or_default().clone()
    }

    /// Drop the lock of `key` from the lock table unless another request holds it.
    fn release_key_lock(&self, key: &StoreKey, lock: KeyLock) {
        let mut key_locks = self.key_locks.lock();
        // the table and `lock` are the only owners
        if Arc::strong_count(&lock) == 2 {
            key_locks.remove(key);
        }
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.readonly {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let lock = self.key_lock(key);
        let value = {
            let _guard = lock.read();
            ignore_not_found(fs::read(self.key_to_fspath(key)))
        };
        self.release_key_lock(key, lock);
        Ok(value?.map(Bytes::from))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let metadata = ignore_not_found(fs::metadata(self.key_to_fspath(key)))?;
        Ok(metadata
            .filter(fs::Metadata::is_file)
            .map(|metadata| metadata.len()))
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.check_writable()?;
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.write();
            let path = self.key_to_fspath(key);
            path.parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| fs::write(&path, &value))
        };
        self.release_key_lock(key, lock);
        Ok(result?)
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.check_writable()?;
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.write();
            ignore_not_found(fs::remove_file(self.key_to_fspath(key)))
        };
        self.release_key_lock(key, lock);
        result?;
        Ok(())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.check_writable()?;
        let _locks = self.key_locks.lock();

        let path = self.prefix_to_fspath(prefix);
        if !prefix.as_str().is_empty() {
            ignore_not_found(fs::remove_dir_all(path))?;
            return Ok(());
        }

        // The root prefix empties the base directory but keeps it
        let Some(entries) = ignore_not_found(fs::read_dir(path))? else {
            return Ok(());
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

impl ListableStorageTraits for FilesystemStore {
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        let path = self.prefix_to_fspath(prefix);
        if !path.is_dir() {
            return Ok(vec![]);
        }
        let mut keys = StoreKeys::new();
        for entry in WalkDir::new(path).min_depth(1) {
            let entry = entry.map_err(|err| StorageError::Other(err.to_string()))?;
            if entry.file_type().is_file() {
                keys.extend(self.fspath_to_key(entry.path()));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] io::Error),
    /// The base path is not valid unicode or is not a directory.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
}
