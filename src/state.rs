use crate::error::AppError;
use crate::registry::Occupancy;
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaySnapshot {
    pub index: usize,
    pub occupancy: Occupancy,
    pub angle: i32,
    pub duration_secs: u64,
    pub timer_running: bool,
}

/// Everything the control thread publishes after a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct LotSnapshot {
    pub bays: Vec<BaySnapshot>,
    pub phase: String,
    pub notice: Option<String>,
    pub fault_pending: bool,
    pub status_text: String,
    pub timestamp: SystemTime,
}

impl LotSnapshot {
    pub fn free_count(&self) -> usize {
        self.bays
            .iter()
            .filter(|bay| bay.occupancy == Occupancy::Free)
            .count()
    }

    pub fn unknown_count(&self) -> usize {
        self.bays
            .iter()
            .filter(|bay| bay.occupancy == Occupancy::Unknown)
            .count()
    }
}

#[derive(Debug)]
pub struct AppState {
    snapshot: Option<LotSnapshot>,
    snapshot_tx: watch::Sender<Option<LotSnapshot>>,
    cycles: u64,
}

impl AppState {
    pub fn new() -> Self {
        let (snapshot_tx, _snapshot_rx) = watch::channel(None);
        Self {
            snapshot: None,
            snapshot_tx,
            cycles: 0,
        }
    }

    pub fn snapshot(&self) -> Option<&LotSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Option<LotSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn set_snapshot(&mut self, snapshot: LotSnapshot) -> Result<(), AppError> {
        self.snapshot = Some(snapshot.clone());
        self.cycles = self.cycles.saturating_add(1);
        self.snapshot_tx
            .send(Some(snapshot))
            .map_err(|_| AppError::WatchSend)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
