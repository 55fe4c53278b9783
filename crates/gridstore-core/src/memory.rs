//! Cooperation with an external memory manager.
//!
//! Chunks never evict anything themselves. Expensive materializations and scans
//! ask a [`MemoryManager`] to free memory elsewhere and retry, and only give up
//! with [`ChunkError::OutOfMemory`] when the manager reports it freed nothing.

use std::fmt;

use crate::error::{ChunkError, Result};

/// Capability to release memory held elsewhere in the process.
pub trait MemoryManager {
    /// Whether tracked usage is currently over budget.
    fn under_pressure(&self) -> bool {
        false
    }

    /// Try to free some memory. Returns `true` if anything was released.
    fn on_low_memory(&self) -> bool;
}

/// A manager with nothing to free.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMemoryManager;

impl MemoryManager for NoMemoryManager {
    fn on_low_memory(&self) -> bool {
        false
    }
}

/// Give the manager a chance to free memory before the next scan step.
pub fn relieve_pressure(memory: &dyn MemoryManager) -> Result<()> {
    if memory.under_pressure() && !memory.on_low_memory() {
        return Err(ChunkError::OutOfMemory(
            "memory budget exceeded and nothing could be freed".to_string(),
        ));
    }
    Ok(())
}

/// Times an allocation is retried after the manager reports freeing memory.
pub const MAX_ALLOCATION_RETRIES: usize = 8;

/// Allocate an empty vector able to hold `capacity` elements, retrying after
/// each successful call to [`MemoryManager::on_low_memory`].
pub fn try_with_capacity<T>(capacity: usize, memory: &dyn MemoryManager) -> Result<Vec<T>> {
    retry_allocation(memory, || {
        let mut values = Vec::new();
        values.try_reserve_exact(capacity).map(|()| values)
    })
}

/// Run `allocate` until it succeeds, the manager frees nothing, or
/// [`MAX_ALLOCATION_RETRIES`] retries are spent.
fn retry_allocation<T, E: fmt::Display>(
    memory: &dyn MemoryManager,
    mut allocate: impl FnMut() -> std::result::Result<T, E>,
) -> Result<T> {
    let mut retries = 0;
    loop {
        match allocate() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if retries == MAX_ALLOCATION_RETRIES || !memory.on_low_memory() {
                    return Err(ChunkError::OutOfMemory(err.to_string()));
                }
                retries += 1;
            }
        }
    }
}
