// Orchestrator Health
//
// Flags published by the orchestrator for status readers. Reading
// them never touches the job slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
pub struct OrchestratorHealth {
    in_flight: AtomicBool,
    halted: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub cycle_in_flight: bool,
    pub halted: Option<String>,
}

impl OrchestratorHealth {
    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn halted_reason(&self) -> Option<String> {
        self.halted.lock().clone()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.lock().is_some()
    }

    pub(crate) fn halt(&self, reason: String) {
        *self.halted.lock() = Some(reason);
    }

    pub(crate) fn clear_halt(&self) -> Option<String> {
        self.halted.lock().take()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            cycle_in_flight: self.is_cycle_in_flight(),
            halted: self.halted_reason(),
        }
    }
}

/// Holds the job slot for one cycle. Dropping it, including during
/// a panic unwind, clears the in-flight flag and frees the slot.
pub(crate) struct InFlight {
    health: Arc<OrchestratorHealth>,
    _slot: OwnedMutexGuard<()>,
}

impl InFlight {
    pub(crate) fn enter(slot: OwnedMutexGuard<()>, health: Arc<OrchestratorHealth>) -> Self {
        health.in_flight.store(true, Ordering::SeqCst);
        Self {
            health,
            _slot: slot,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.health.in_flight.store(false, Ordering::SeqCst);
    }
}
