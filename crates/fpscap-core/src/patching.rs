//! The FPS override loop.
//!
//! Once the variable's remote address is known, enforcement is a small
//! read-compare-write cycle on a fixed cadence. Reads and writes can fail
//! transiently (the game may be mid-teardown or paging); a failed cycle is
//! skipped and the next one retries.

use std::time::Duration;

use tracing::{debug, info};

use crate::memory::ProcessMemory;
use crate::shutdown::StopSignal;

pub const PATCH_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The variable already held the target.
    Unchanged,
    /// The variable was rewritten.
    Updated { previous: i32, target: i32 },
    /// The cycle could not read or write the variable and was skipped.
    Skipped,
}

/// Why the patch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    ProcessExited,
    Stopped,
}

/// One enforcement cycle: read the current value, write `target` only on
/// mismatch.
pub fn patch_cycle<M: ProcessMemory>(mem: &M, address: u64, target: i32) -> PatchOutcome {
    let current = match mem.read_bytes(address, 4) {
        Ok(bytes) if bytes.len() == 4 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
        Ok(_) | Err(_) => return PatchOutcome::Skipped,
    };

    if current == target {
        return PatchOutcome::Unchanged;
    }

    match mem.write_bytes(address, &target.to_le_bytes()) {
        Ok(4) => {
            info!("FPS override: {} -> {}", current, target);
            PatchOutcome::Updated {
                previous: current,
                target,
            }
        }
        Ok(written) => {
            debug!("partial FPS write ({written} of 4 bytes), retrying next cycle");
            PatchOutcome::Skipped
        }
        Err(e) => {
            debug!("FPS write failed, retrying next cycle: {e}");
            PatchOutcome::Skipped
        }
    }
}

/// Run enforcement cycles until the process exits or the signal stops us.
///
/// `target_fn` is consulted every cycle so focus changes take effect on the
/// next tick without restarting the loop.
pub fn run_patch_loop<M, F>(
    mem: &M,
    address: u64,
    mut target_fn: F,
    stop: &StopSignal,
    interval: Duration,
) -> LoopEnd
where
    M: ProcessMemory,
    F: FnMut() -> i32,
{
    loop {
        if stop.is_triggered() {
            return LoopEnd::Stopped;
        }
        if !mem.is_alive() {
            return LoopEnd::ProcessExited;
        }

        patch_cycle(mem, address, target_fn());

        if stop.wait(interval) {
            return LoopEnd::Stopped;
        }
    }
}
