//! Memory budget tracking for grid chunks.
//!
//! [`MemoryBudget`] tracks the approximate heap usage of loaded chunks plus any
//! external allocations the application registers, and acts as the
//! [`MemoryManager`] handed to expensive scans. Relief comes from reclaimers:
//! callbacks that drop spillable allocations and report the bytes they freed.
//!
//! Resident chunk bytes count towards the budget but are never reported as
//! pressure: reclaimers cannot free them, and the grid shrinks them by
//! compaction instead. A grid larger than its budget keeps scanning.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

use gridstore_core::{ChunkId, MemoryManager};
use tracing::{info, warn};

type Reclaimer = Box<dyn FnMut() -> usize>;

/// Tracks memory usage against a byte budget.
pub struct MemoryBudget {
    budget_bytes: usize,
    /// Per-chunk heap usage.
    chunk_usage: HashMap<ChunkId, usize>,
    /// Running total of chunk bytes.
    chunk_bytes: usize,
    /// Bytes held by spillable allocations outside the grid.
    external_bytes: Cell<usize>,
    reclaimers: RefCell<Vec<Reclaimer>>,
}

impl MemoryBudget {
    #[must_use]
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            chunk_usage: HashMap::new(),
            chunk_bytes: 0,
            external_bytes: Cell::new(0),
            reclaimers: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Record the current heap usage of a chunk, replacing any earlier figure.
    pub fn on_chunk_loaded(&mut self, id: ChunkId, bytes: usize) {
        if let Some(old) = self.chunk_usage.insert(id, bytes) {
            self.chunk_bytes -= old;
        }
        self.chunk_bytes += bytes;
    }

    pub fn on_chunk_unloaded(&mut self, id: &ChunkId) {
        if let Some(bytes) = self.chunk_usage.remove(id) {
            self.chunk_bytes -= bytes;
        }
    }

    /// Account for a spillable allocation held outside the grid.
    pub fn track_external(&self, bytes: usize) {
        self.external_bytes.set(self.external_bytes.get() + bytes);
    }

    /// Account for a spillable allocation released outside the grid.
    pub fn release_external(&self, bytes: usize) {
        self.external_bytes
            .set(self.external_bytes.get().saturating_sub(bytes));
    }

    /// Register a callback that frees spillable memory and returns the bytes
    /// freed. Reclaimers are tried in registration order.
    pub fn register_reclaimer(&self, reclaimer: impl FnMut() -> usize + 'static) {
        self.reclaimers.borrow_mut().push(Box::new(reclaimer));
    }

    #[must_use]
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    #[must_use]
    pub fn external_bytes(&self) -> usize {
        self.external_bytes.get()
    }

    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.chunk_bytes + self.external_bytes.get()
    }

    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.used_bytes() > self.budget_bytes
    }

    /// Bytes over budget (0 if under budget).
    #[must_use]
    pub fn overage(&self) -> usize {
        self.used_bytes().saturating_sub(self.budget_bytes)
    }

    #[must_use]
    pub fn loaded_chunk_count(&self) -> usize {
        self.chunk_usage.len()
    }
}

impl MemoryManager for MemoryBudget {
    /// Over budget with spillable bytes left to reclaim.
    fn under_pressure(&self) -> bool {
        self.is_over_budget() && self.external_bytes.get() > 0
    }

    fn on_low_memory(&self) -> bool {
        let Ok(mut reclaimers) = self.reclaimers.try_borrow_mut() else {
            // Re-entered from inside a reclaimer.
            return false;
        };
        for reclaimer in reclaimers.iter_mut() {
            let freed = reclaimer();
            if freed > 0 {
                self.release_external(freed);
                info!("Reclaimed {} bytes, {} bytes over budget", freed, self.overage());
                return true;
            }
        }
        warn!(
            "Memory budget exceeded by {} bytes and no reclaimer freed anything",
            self.overage()
        );
        false
    }
}

impl fmt::Debug for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBudget")
            .field("budget_bytes", &self.budget_bytes)
            .field("chunk_bytes", &self.chunk_bytes)
            .field("external_bytes", &self.external_bytes.get())
            .field("reclaimers", &self.reclaimers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridstore_core::{relieve_pressure, ChunkError};
    use std::rc::Rc;

    #[test]
    fn test_chunk_accounting() {
        let mut budget = MemoryBudget::new(1000);
        budget.on_chunk_loaded(ChunkId::new(0, 0), 600);
        budget.on_chunk_loaded(ChunkId::new(0, 1), 300);
        assert_eq!(budget.used_bytes(), 900);
        assert!(!budget.is_over_budget());

        budget.on_chunk_loaded(ChunkId::new(0, 1), 500);
        assert_eq!(budget.chunk_bytes(), 1100);
        assert_eq!(budget.overage(), 100);
        assert!(budget.is_over_budget());

        budget.on_chunk_unloaded(&ChunkId::new(0, 0));
        assert_eq!(budget.used_bytes(), 500);
        assert_eq!(budget.loaded_chunk_count(), 1);
    }

    #[test]
    fn test_reclaimers_relieve_pressure() {
        let budget = MemoryBudget::new(100);
        budget.track_external(250);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        budget.register_reclaimer(|| 0);
        budget.register_reclaimer(move || {
            counter.set(counter.get() + 1);
            200
        });

        assert!(budget.on_low_memory());
        assert_eq!(calls.get(), 1);
        assert_eq!(budget.external_bytes(), 50);
        assert!(!budget.is_over_budget());
        relieve_pressure(&budget).unwrap();
    }

    #[test]
    fn test_pressure_without_relief_is_an_error() {
        let budget = MemoryBudget::new(10);
        budget.track_external(20);
        assert!(!budget.on_low_memory());
        assert!(matches!(relieve_pressure(&budget), Err(ChunkError::OutOfMemory(_))));

        budget.release_external(15);
        relieve_pressure(&budget).unwrap();
    }

    #[test]
    fn test_resident_chunks_over_budget_are_not_pressure() {
        let mut budget = MemoryBudget::new(100);
        budget.on_chunk_loaded(ChunkId::new(0, 0), 6000);
        assert!(budget.is_over_budget());
        assert!(!budget.under_pressure());
        relieve_pressure(&budget).unwrap();

        budget.track_external(1);
        assert!(budget.under_pressure());
        assert!(relieve_pressure(&budget).is_err());
    }
}
