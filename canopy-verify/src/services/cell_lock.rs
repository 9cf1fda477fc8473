//! Per-cell admission locks
//!
//! Serializes the read-neighbors → decide → admit sequence for
//! submissions landing in the same coarse grid cell, closing the window
//! where two concurrent duplicates both read a pre-admission snapshot
//! and both pass dedup.
//!
//! Lock hold time is bounded by the caller's configured wait; a timeout
//! surfaces as a distinct, retryable contention error rather than a
//! silent dedup skip.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use canopy_common::geo::GridCell;

/// Registry entries are swept opportunistically once the map grows past
/// this size; idle cells (no holder, no waiter) are dropped.
const SWEEP_THRESHOLD: usize = 1024;

/// Lock acquisition timed out: another submission holds the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("admission lock for cell {cell:?} not acquired within {wait_ms} ms")]
pub struct CellContention {
    pub cell: GridCell,
    pub wait_ms: u64,
}

/// Exclusive guard over one grid cell. Released on drop.
pub struct CellGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Registry of per-cell async locks.
pub struct CellLockRegistry {
    cells: StdMutex<HashMap<GridCell, Arc<AsyncMutex<()>>>>,
}

impl CellLockRegistry {
    pub fn new() -> Self {
        Self {
            cells: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the exclusive lock for a cell, waiting at most `wait`.
    pub async fn acquire(
        &self,
        cell: GridCell,
        wait: Duration,
    ) -> Result<CellGuard, CellContention> {
        let mutex = {
            let mut cells = self.cells.lock().expect("cell registry poisoned");
            if cells.len() > SWEEP_THRESHOLD {
                cells.retain(|_, m| Arc::strong_count(m) > 1);
            }
            Arc::clone(cells.entry(cell).or_default())
        };

        match tokio::time::timeout(wait, mutex.lock_owned()).await {
            Ok(guard) => Ok(CellGuard { _guard: guard }),
            Err(_) => {
                tracing::warn!(
                    cell_x = cell.x,
                    cell_y = cell.y,
                    wait_ms = wait.as_millis() as u64,
                    "Cell admission lock contention"
                );
                Err(CellContention {
                    cell,
                    wait_ms: wait.as_millis() as u64,
                })
            }
        }
    }
}

impl Default for CellLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
