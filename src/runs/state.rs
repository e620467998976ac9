//! In-memory cancellation-flag registry for server-executed runs.
//!
//! Cancellation is cooperative (§5): `CancelRun` only ever sets a flag here,
//! the executor loop observes it at the next item boundary. One flag exists
//! per in-flight server run; agent-executed runs never touch this registry
//! since their cancellation is resolved synchronously in the coordinator.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct CancelRegistry {
    flags: DashMap<String, Arc<AtomicBool>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self { flags: DashMap::new() }
    }

    /// Returns the flag for `run_id`, creating a fresh (unset) one if this
    /// is the first time the run is observed.
    pub fn flag_for(&self, run_id: &str) -> Arc<AtomicBool> {
        self.flags
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    pub fn request_cancel(&self, run_id: &str) {
        self.flag_for(run_id).store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, run_id: &str) -> bool {
        self.flags
            .get(run_id)
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Drops the entry once a run is terminal; leaving it around would leak
    /// one `DashMap` slot per run for the lifetime of the process.
    pub fn clear(&self, run_id: &str) {
        self.flags.remove(run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_runs_are_not_cancelled() {
        let registry = CancelRegistry::new();
        assert!(!registry.is_cancelled("never-seen"));
    }

    #[test]
    fn request_cancel_is_observed_through_is_cancelled() {
        let registry = CancelRegistry::new();
        registry.request_cancel("run-1");
        assert!(registry.is_cancelled("run-1"));
        assert!(!registry.is_cancelled("run-2"));
    }

    #[test]
    fn flag_for_returns_a_shared_handle() {
        let registry = CancelRegistry::new();
        let flag = registry.flag_for("run-1");
        assert!(!flag.load(Ordering::SeqCst));
        registry.request_cancel("run-1");
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn clear_forgets_a_run() {
        let registry = CancelRegistry::new();
        registry.request_cancel("run-1");
        registry.clear("run-1");
        assert!(!registry.is_cancelled("run-1"));
    }
}
