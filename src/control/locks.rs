// control/locks.rs
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per device id. Holding the guard keeps a whole vendor
/// exchange (command plus re-poll) exclusive for that device; different
/// devices never wait on each other. Entries are never dropped, so the map
/// grows with the number of ids ever seen.
#[derive(Default)]
pub struct DeviceLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, device_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(device_id.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }
}
