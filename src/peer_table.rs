use crate::subscribers::PositionObserver;
use crate::thread_manager::SteppableTask;
use crate::types::PositionUpdate;

/// Latest known position per callsign, as seen by a subscriber.
#[derive(Debug)]
pub struct PeerTable {
    retention: chrono::TimeDelta,
    callsign_to_update_map: std::collections::HashMap<String, PositionUpdate>,
}

impl PeerTable {
    #[must_use]
    pub fn new(retention: chrono::TimeDelta) -> Self {
        PeerTable {
            retention,
            callsign_to_update_map: std::collections::HashMap::new(),
        }
    }

    /// Records `update` unless it is outside the retention window or older than what is
    /// already held for that callsign. UDP may deliver out of order.
    pub fn update(&mut self, update: PositionUpdate, now: chrono::DateTime<chrono::Utc>) -> bool {
        if update.last_seen_at < now - self.retention {
            return false;
        }
        if let Some(existing) = self.callsign_to_update_map.get(&update.callsign) {
            if existing.last_seen_at > update.last_seen_at {
                return false;
            }
        }
        self.callsign_to_update_map
            .insert(update.callsign.clone(), update);
        true
    }

    /// Drops peers not heard from within the retention window. Returns how many were dropped.
    pub fn prune(&mut self, now: chrono::DateTime<chrono::Utc>) -> usize {
        let cutoff_time = now - self.retention;
        let before = self.callsign_to_update_map.len();
        self.callsign_to_update_map
            .retain(|_, update| update.last_seen_at >= cutoff_time);
        before - self.callsign_to_update_map.len()
    }

    #[must_use]
    pub fn get(&self, callsign: &str) -> Option<&PositionUpdate> {
        self.callsign_to_update_map.get(callsign)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callsign_to_update_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callsign_to_update_map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionUpdate> {
        self.callsign_to_update_map.values()
    }
}

/// Thread-safe handle to a [`PeerTable`] that can be subscribed to the service.
#[derive(Debug, Clone)]
pub struct SharedPeerTable {
    inner: std::sync::Arc<std::sync::RwLock<PeerTable>>,
}

impl SharedPeerTable {
    #[must_use]
    pub fn new(retention: chrono::TimeDelta) -> Self {
        SharedPeerTable {
            inner: std::sync::Arc::new(std::sync::RwLock::new(PeerTable::new(retention))),
        }
    }

    pub fn read(&self) -> std::sync::RwLockReadGuard<'_, PeerTable> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PeerTable> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl PositionObserver for SharedPeerTable {
    fn on_position_update(&self, update: &PositionUpdate) {
        if !self.write().update(update.clone(), chrono::Utc::now()) {
            log::debug!("PeerTable: Ignored stale update from {}", update.callsign);
        }
    }
}

/// Periodic pruning and status logging for a [`SharedPeerTable`].
pub struct PeerTableMaintenance {
    table: SharedPeerTable,
}

impl PeerTableMaintenance {
    #[must_use]
    pub fn new(table: SharedPeerTable) -> Self {
        PeerTableMaintenance { table }
    }
}

impl SteppableTask for PeerTableMaintenance {
    fn step(&mut self) -> bool {
        let mut table = self.table.write();
        let pruned = table.prune(chrono::Utc::now());
        if pruned > 0 {
            log::info!("PeerTable: Pruned {pruned} silent peers");
        }
        log::info!("PeerTable: {} peers known", table.len());
        true
    }
}
