//! Locating the frame-rate limit variable in the game's address space.
//!
//! The variable lives in UnityPlayer.dll's data section and has moved across
//! game builds. Resolution scans a locally mapped copy of the relevant module
//! for a byte signature near code that touches the variable, then follows the
//! RIP-relative displacements of that code to the variable's RVA. Which
//! module is scanned and how the displacements chain depends on the build
//! era, selected by the modules' link timestamps.

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::ProcessMemory;
use crate::shutdown::StopSignal;
use crate::signature::Signature;

/// Builds linked before this timestamp carry the old code shapes.
pub const SIGNATURE_SPLIT_TIMESTAMP: u32 = 0x656F_FAF7;

/// Comparison-and-load over the limit variable in old UnityPlayer builds.
const LEGACY_PATTERN: &str = "7F 0F 8B 05 ?? ?? ?? ??";

/// Call pair in UserAssembly that reaches the engine's limit accessor.
const TRANSITIONAL_PATTERN: &str = "E8 ?? ?? ?? ?? 85 C0 7E 07 E8 ?? ?? ?? ?? EB 05";

/// `mov ecx, 60; call [rip+...]` setup in current UserAssembly builds.
const MODERN_PATTERN: &str = "B9 3C 00 00 00 FF 15";

/// Delay between attempts while waiting for the engine pointer to be
/// populated during game startup.
pub const POINTER_SPIN_INTERVAL: Duration = Duration::from_millis(100);

/// Real accessors are one or two thunks deep; a longer chain means the image
/// is malformed or the signatures are stale.
const THUNK_HOP_LIMIT: usize = 16;

/// Game build era, selected by module link timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era {
    /// The variable is reached directly from a UnityPlayer scan.
    Legacy,
    /// UserAssembly reaches it through a double call chain.
    Transitional,
    /// UserAssembly reaches it through an indirect call table.
    Modern,
}

impl Era {
    pub fn classify(unity_timestamp: u32, user_assembly_timestamp: u32) -> Self {
        if unity_timestamp < SIGNATURE_SPLIT_TIMESTAMP {
            Era::Legacy
        } else if user_assembly_timestamp < SIGNATURE_SPLIT_TIMESTAMP {
            Era::Transitional
        } else {
            Era::Modern
        }
    }
}

/// A locally mapped module image paired with where the same module sits in
/// the game process.
pub struct ModuleView<'a> {
    pub image: &'a [u8],
    pub timestamp: u32,
    pub remote_base: u64,
}

fn read_i32_at(image: &[u8], offset: usize) -> Result<i32> {
    image
        .get(offset..offset + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::InvalidImage(format!("displacement read at {offset:#x} out of range")))
}

/// Follow one RIP-relative displacement: the i32 at `cursor + disp_at`,
/// applied from `cursor` with the instruction-length `advance`.
fn hop(image: &[u8], cursor: usize, disp_at: usize, advance: i64) -> Result<usize> {
    let disp = read_i32_at(image, cursor + disp_at)?;
    let target = cursor as i64 + disp as i64 + advance;
    if target < 0 || target as usize >= image.len() {
        return Err(Error::InvalidImage(format!(
            "displacement from {cursor:#x} lands at {target:#x}, outside the image"
        )));
    }
    Ok(target as usize)
}

fn scan(image: &[u8], pattern: &str, timestamp: u32) -> Result<usize> {
    Signature::parse(pattern)?
        .find(image)
        .ok_or(Error::UnsupportedBinary { timestamp })
}

/// Legacy builds: the scanned `mov eax, [rip+disp]` names the variable
/// directly, so its RVA falls out of one displacement.
pub fn direct_rva(unity_image: &[u8], timestamp: u32) -> Result<u64> {
    let found = scan(unity_image, LEGACY_PATTERN, timestamp)?;
    let rip = found + 2;
    let rva = hop(unity_image, rip, 2, 6)?;
    Ok(rva as u64)
}

/// Transitional builds: follow the first call of the matched pair, then the
/// RIP-relative load inside the called function.
pub fn double_call_cursor(user_image: &[u8], timestamp: u32) -> Result<usize> {
    let cursor = scan(user_image, TRANSITIONAL_PATTERN, timestamp)?;
    let cursor = hop(user_image, cursor, 1, 5)?;
    hop(user_image, cursor, 3, 7)
}

/// Modern builds: skip the `mov ecx` setup and follow the indirect call's
/// RIP-relative table slot.
pub fn indirect_call_cursor(user_image: &[u8], timestamp: u32) -> Result<usize> {
    let cursor = scan(user_image, MODERN_PATTERN, timestamp)?;
    hop(user_image, cursor + 5, 2, 6)
}

/// Walk the engine-side accessor starting at `cursor` in the UnityPlayer
/// image: skip over any jmp/call thunks, then take the final RIP-relative
/// access as the variable's RVA.
pub fn chase_pointer_target(unity_image: &[u8], mut cursor: usize) -> Result<u64> {
    let mut hops = 0;
    while matches!(unity_image.get(cursor), Some(0xE8) | Some(0xE9)) {
        if hops == THUNK_HOP_LIMIT {
            return Err(Error::InvalidImage(format!(
                "thunk chain at {cursor:#x} exceeds {THUNK_HOP_LIMIT} hops"
            )));
        }
        cursor = hop(unity_image, cursor, 1, 5)?;
        hops += 1;
    }
    let rva = hop(unity_image, cursor, 2, 6)?;
    Ok(rva as u64)
}

/// Spin until the remote pointer slot at `address` holds a nonzero value.
///
/// The slot is written by the engine during startup, so early reads see zero
/// (or fail outright while the page is not yet committed). The spin is
/// bounded only by process liveness and the stop signal.
fn wait_for_pointer<M: ProcessMemory>(mem: &M, address: u64, stop: &StopSignal) -> Result<u64> {
    loop {
        if stop.is_triggered() {
            return Err(Error::Cancelled);
        }
        if !mem.is_alive() {
            return Err(Error::ProcessExited);
        }

        match mem.read_u64(address) {
            Ok(0) | Err(_) => {}
            Ok(pointer) => return Ok(pointer),
        }

        if stop.wait(POINTER_SPIN_INTERVAL) {
            return Err(Error::Cancelled);
        }
    }
}

/// Resolve the remote virtual address of the frame-rate limit variable.
///
/// `unity` and `user_assembly` pair locally mapped images with the modules'
/// remote bases; `mem` reads the game process for the pointer spin on newer
/// eras.
pub fn resolve_fps_address<M: ProcessMemory>(
    mem: &M,
    unity: &ModuleView<'_>,
    user_assembly: &ModuleView<'_>,
    stop: &StopSignal,
) -> Result<u64> {
    let era = Era::classify(unity.timestamp, user_assembly.timestamp);
    debug!(
        ?era,
        unity_timestamp = format_args!("{:#010x}", unity.timestamp),
        user_assembly_timestamp = format_args!("{:#010x}", user_assembly.timestamp),
        "resolving FPS variable"
    );

    let cursor = match era {
        Era::Legacy => {
            let rva = direct_rva(unity.image, unity.timestamp)?;
            return Ok(unity.remote_base + rva);
        }
        Era::Transitional => double_call_cursor(user_assembly.image, user_assembly.timestamp)?,
        Era::Modern => indirect_call_cursor(user_assembly.image, user_assembly.timestamp)?,
    };

    // The cursor names a pointer slot in UserAssembly's data section that the
    // engine fills with a UnityPlayer address during startup.
    let slot = user_assembly.remote_base + cursor as u64;
    let pointer = wait_for_pointer(mem, slot, stop)?;

    let offset = pointer
        .checked_sub(unity.remote_base)
        .filter(|offset| (*offset as usize) < unity.image.len())
        .ok_or_else(|| {
            Error::InvalidImage(format!(
                "engine pointer {pointer:#x} falls outside UnityPlayer"
            ))
        })?;

    let rva = chase_pointer_target(unity.image, offset as usize)?;
    Ok(unity.remote_base + rva)
}
