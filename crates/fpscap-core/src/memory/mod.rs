//! Remote process memory access.
//!
//! Everything above this module works against the [`ProcessMemory`] trait so
//! the resolver and patch loop can run against an in-memory mock in tests.

use crate::error::{Error, Result};

#[cfg(target_os = "windows")]
mod process;
#[cfg(target_os = "windows")]
pub use process::ProcessHandle;

#[cfg(test)]
pub mod mock;

/// Read/write access to another process's address space.
pub trait ProcessMemory {
    /// Read up to `len` bytes at `address`.
    ///
    /// A successful read may return fewer bytes than requested when the range
    /// crosses an unmapped page; callers decide whether a short read is fatal.
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>>;

    /// Write `data` at `address`, returning the number of bytes written.
    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<usize>;

    /// Whether the target process is still running.
    fn is_alive(&self) -> bool;

    fn read_i32(&self, address: u64) -> Result<i32> {
        let bytes = self.read_bytes(address, 4)?;
        match <[u8; 4]>::try_from(bytes.as_slice()) {
            Ok(raw) => Ok(i32::from_le_bytes(raw)),
            Err(_) => Err(Error::MemoryReadFailed {
                address,
                message: format!("short read ({} of 4 bytes)", bytes.len()),
            }),
        }
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        match <[u8; 8]>::try_from(bytes.as_slice()) {
            Ok(raw) => Ok(u64::from_le_bytes(raw)),
            Err(_) => Err(Error::MemoryReadFailed {
                address,
                message: format!("short read ({} of 8 bytes)", bytes.len()),
            }),
        }
    }
}
