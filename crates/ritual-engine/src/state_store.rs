use std::sync::Arc;

use ritual_core::ProgressState;
use tokio::sync::watch;

/// Observable holder of the canonical progress snapshot.
///
/// Readers get cheap `Arc` snapshots; subscribers are woken on every `set`.
/// Only the engine writes.
#[derive(Debug, Clone)]
pub struct ProgressStateStore {
    tx: Arc<watch::Sender<Arc<ProgressState>>>,
}

impl Default for ProgressStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(ProgressState::default()));
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> Arc<ProgressState> {
        self.tx.borrow().clone()
    }

    pub fn set(&self, state: ProgressState) {
        self.tx.send_replace(Arc::new(state));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ProgressState>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_each_set() {
        let store = ProgressStateStore::new();
        let mut rx = store.subscribe();
        assert_eq!(rx.borrow().total_xp, 0);

        let mut state = ProgressState::new();
        state.total_xp = 70;
        store.set(state);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().total_xp, 70);
        assert_eq!(store.get().total_xp, 70);
    }
}
