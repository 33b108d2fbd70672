use crate::{KvStore, StoreError, StoreResult, io_error, validate_key};
use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

const KV_DIR: &str = ".kv";
const TMP_SUFFIX: &str = ".tmp";

/// Filesystem-backed store rooted at `<root>/.kv`, one file per key.
///
/// File names are the hex encoding of the key so arbitrary keys map to safe
/// names. Writes go through a temp file and a rename.
#[derive(Clone)]
pub struct FsKvStore {
    dir: PathBuf,
    quota: Option<u64>,
}

impl fmt::Debug for FsKvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsKvStore")
            .field("dir", &self.dir)
            .field("quota", &self.quota)
            .finish()
    }
}

impl FsKvStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = root.as_ref().join(KV_DIR);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir, quota: None })
    }

    /// Cap total bytes stored on disk (values only).
    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(hex::encode(key.as_bytes()))
    }

    fn used_bytes_excluding(&self, skip: &Path) -> StoreResult<u64> {
        let mut total = 0;
        for entry in fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))? {
            let entry = entry.map_err(|e| io_error(&self.dir, e))?;
            let path = entry.path();
            if path == skip || is_tmp(&path) {
                continue;
            }
            let meta = entry.metadata().map_err(|e| io_error(&path, e))?;
            total += meta.len();
        }
        Ok(total)
    }

    fn check_quota(&self, key: &str, path: &Path, len: usize) -> StoreResult<()> {
        let Some(quota) = self.quota else {
            return Ok(());
        };
        let used = self.used_bytes_excluding(path)?;
        let available = quota.saturating_sub(used);
        if len as u64 > available {
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
                needed: len,
                available: available as usize,
            });
        }
        Ok(())
    }
}

fn is_tmp(path: &Path) -> bool {
    path.to_string_lossy().ends_with(TMP_SUFFIX)
}

impl KvStore for FsKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.key_path(key);
        match fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Ok(Some(text)),
                Err(err) => Err(io_error(
                    path,
                    std::io::Error::new(ErrorKind::InvalidData, err),
                )),
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(path, err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        validate_key(key)?;
        let path = self.key_path(key);
        self.check_quota(key, &path, value.len())?;
        let tmp = path.with_extension(&TMP_SUFFIX[1..]);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)
                .map_err(|e| io_error(&tmp, e))?;
            file.write_all(value.as_bytes())
                .map_err(|e| io_error(&tmp, e))?;
            file.sync_all().map_err(|e| io_error(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(path, err)),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))? {
            let entry = entry.map_err(|e| io_error(&self.dir, e))?;
            let path = entry.path();
            if is_tmp(&path) {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(bytes) = hex::decode(name) else { continue };
            if let Ok(key) = String::from_utf8(bytes) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
