//! Write a JSON payload, shrinking it step by step when the store refuses.

use serde::Serialize;

use crate::{KvStore, StoreResult, put_json};

type Transform<'a, T> = Box<dyn Fn(&dyn KvStore, &T) -> T + 'a>;

/// One rung of a degrade ladder. The transform receives the store (so a rung
/// may free space by removing other keys) and the previous payload, and
/// returns the next, smaller payload.
pub struct Fallback<'a, T> {
    pub label: &'static str,
    transform: Transform<'a, T>,
}

impl<'a, T> Fallback<'a, T> {
    pub fn new(label: &'static str, transform: impl Fn(&dyn KvStore, &T) -> T + 'a) -> Self {
        Self {
            label,
            transform: Box::new(transform),
        }
    }
}

impl<T> std::fmt::Debug for Fallback<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallback").field("label", &self.label).finish()
    }
}

/// Outcome of a successful ladder write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Number of `set` attempts made, including the successful one.
    pub attempts: usize,
    /// Label of the rung that finally succeeded; `None` for the full payload.
    pub fallback: Option<&'static str>,
}

impl WriteReport {
    pub fn degraded(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Try the full payload, then each fallback in order. Rungs compose: each
/// transform is applied to the payload produced by the previous rung. Returns
/// the last error only when every rung failed.
pub fn write_with_degradation<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    payload: &T,
    fallbacks: &[Fallback<'_, T>],
) -> StoreResult<WriteReport> {
    let mut last_err = match put_json(store, key, payload) {
        Ok(()) => {
            return Ok(WriteReport {
                attempts: 1,
                fallback: None,
            });
        }
        Err(err) => err,
    };

    let mut current: Option<T> = None;
    for (idx, rung) in fallbacks.iter().enumerate() {
        log::warn!(
            "write to '{key}' failed ({last_err}); retrying with fallback '{}'",
            rung.label
        );
        let next = (rung.transform)(store, current.as_ref().unwrap_or(payload));
        match put_json(store, key, &next) {
            Ok(()) => {
                return Ok(WriteReport {
                    attempts: idx + 2,
                    fallback: Some(rung.label),
                });
            }
            Err(err) => {
                last_err = err;
                current = Some(next);
            }
        }
    }
    Err(last_err)
}
