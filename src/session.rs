//! Active session tracking.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::telemetry::MetricRegistry;

/// Set of active session ids mirrored into the active-sessions gauge.
///
/// Both mutations are idempotent. After each one the gauge is set to the
/// set's current size rather than adjusted, so it cannot drift.
#[derive(Debug, Default)]
pub struct SessionTracker {
    active: Mutex<HashSet<String>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Adding an id that is already active has no effect.
    pub fn mark_start(&self, id: &str) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.insert(id.to_owned());
        MetricRegistry::set_active_sessions(active.len());
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn mark_end(&self, id: &str) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(id);
        MetricRegistry::set_active_sessions(active.len());
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}
