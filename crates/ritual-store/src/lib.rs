//! Local key-value persistence plus filesystem and in-memory backends.
//!
//! Values are opaque UTF-8 strings (JSON in practice). Backends may enforce a
//! byte quota, in which case writes fail with [`StoreError::QuotaExceeded`] and
//! callers are expected to retry with smaller payloads via
//! [`write_with_degradation`].

mod degrade;
mod fs_store;
mod mem_store;

pub use degrade::{Fallback, WriteReport, write_with_degradation};
pub use fs_store::FsKvStore;
pub use mem_store::MemKvStore;

use serde::{Serialize, de::DeserializeOwned};
use std::{io, path::PathBuf, sync::Arc};

pub type StoreResult<T> = Result<T, StoreError>;
pub type DynKvStore = Arc<dyn KvStore>;

/// Trait implemented by all local key-value stores.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    fn remove(&self, key: &str) -> StoreResult<()>;
    fn keys(&self) -> StoreResult<Vec<String>>;

    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Serialize `value` as JSON and store it under `key`.
pub fn put_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> StoreResult<()> {
    let text = serde_json::to_string(value)?;
    store.set(key, &text)
}

/// Load and decode a JSON value. Missing keys yield `Ok(None)`; malformed
/// payloads yield [`StoreError::Json`] so the caller decides whether to discard.
pub fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> StoreResult<Option<T>> {
    match store.get(key)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("quota exceeded writing '{key}': {needed} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

impl StoreError {
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source: err,
    }
}

pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.chars().any(char::is_control) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        name: String,
        counter: u64,
    }

    #[test]
    fn json_helpers_round_trip() {
        let store = MemKvStore::new();
        let value = Dummy {
            name: "demo".into(),
            counter: 42,
        };
        put_json(&store, "dummy", &value).unwrap();
        let loaded: Option<Dummy> = get_json(&store, "dummy").unwrap();
        assert_eq!(loaded, Some(value));
        let missing: Option<Dummy> = get_json(&store, "nope").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn malformed_json_is_reported() {
        let store = MemKvStore::new();
        store.set("dummy", "{not json").unwrap();
        let err = get_json::<Dummy>(&store, "dummy").expect_err("should fail");
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[test]
    fn control_characters_rejected_in_keys() {
        let store = MemKvStore::new();
        let err = store.set("bad\nkey", "x").expect_err("should fail");
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
