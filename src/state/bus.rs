//! Latest-value store connecting the source, target, and panel sides.
//!
//! This is intentionally not a queue: producers replace the previous
//! snapshot and consumers only ever observe the most recent complete one.
use std::sync::{Mutex, MutexGuard};

use super::{ControllerOutput, ControllerState};

#[derive(Debug, Default)]
struct OutputSlot {
    value: ControllerOutput,
    dirty: bool,
}

/// Thread-safe store for the most recent input snapshot and the most
/// recent desired output. Both sides are independent; each operation
/// holds its lock only long enough to copy one snapshot.
#[derive(Debug, Default)]
pub struct StateBus {
    input: Mutex<ControllerState>,
    output: Mutex<OutputSlot>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoning is ignored; the stored snapshots are plain old data.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl StateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the input snapshot.
    pub fn update_input(&self, state: &ControllerState) {
        *lock(&self.input) = *state;
    }

    /// Copy out the most recent input snapshot.
    pub fn snapshot_input(&self) -> ControllerState {
        *lock(&self.input)
    }

    /// Replace the output snapshot. The dirty flag is latched only when
    /// the new value differs, so idempotent writes cause no endpoint
    /// traffic downstream.
    pub fn update_output(&self, output: &ControllerOutput) {
        let mut slot = lock(&self.output);
        if slot.value != *output {
            slot.value = *output;
            slot.dirty = true;
        }
    }

    /// Read-modify-write the output snapshot under a single lock hold.
    pub fn modify_output<F>(&self, f: F)
    where
        F: FnOnce(&mut ControllerOutput),
    {
        let mut slot = lock(&self.output);
        let before = slot.value;
        f(&mut slot.value);
        if slot.value != before {
            slot.dirty = true;
        }
    }

    /// Copy out the most recent output snapshot.
    pub fn snapshot_output(&self) -> ControllerOutput {
        lock(&self.output).value
    }

    /// Atomically report and clear the output dirty flag.
    pub fn take_output_dirty(&self) -> bool {
        let mut slot = lock(&self.output);
        std::mem::take(&mut slot.dirty)
    }

    /// Re-latch the dirty flag, used after a failed delivery so the next
    /// tick retries naturally.
    pub fn mark_output_dirty(&self) {
        lock(&self.output).dirty = true;
    }
}
