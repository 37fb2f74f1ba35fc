//! Locally mapped copies of the game's modules for signature scanning.
//!
//! Scanning the remote process page by page would be slow and racy; instead
//! the same DLL is mapped into our own process as an image resource, which
//! lays out sections at their virtual offsets without running any of its
//! code, and the scan walks that local mapping.

use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use windows::Win32::Foundation::{FreeLibrary, HMODULE};
use windows::Win32::System::LibraryLoader::{LOAD_LIBRARY_AS_IMAGE_RESOURCE, LoadLibraryExW};
use windows::core::PCWSTR;

use crate::error::{Error, Result};
use crate::pe::{self, PeHeader};

/// How much of the mapping is handed to the header parser before
/// `SizeOfImage` is known.
const HEADER_PROBE_LEN: usize = 0x1000;

pub struct ModuleImage {
    handle: HMODULE,
    base: *const u8,
    len: usize,
    header: PeHeader,
}

// SAFETY: the mapping is read-only and lives until FreeLibrary in Drop.
unsafe impl Send for ModuleImage {}
unsafe impl Sync for ModuleImage {}

impl ModuleImage {
    pub fn load(path: &Path) -> Result<Self> {
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: `wide` is null-terminated and outlives the call; the
        // image-resource flag maps the file without executing it.
        let handle = unsafe {
            LoadLibraryExW(
                PCWSTR::from_raw(wide.as_ptr()),
                None,
                LOAD_LIBRARY_AS_IMAGE_RESOURCE,
            )
        }
        .map_err(|e| Error::InvalidImage(format!("map {}: {}", path.display(), e.message())))?;

        // Resource mappings tag the handle's low bits; the mapping itself
        // starts at the 64K-aligned base.
        let base = (handle.0 as usize & !0xFFFF) as *const u8;

        // SAFETY: a successfully mapped image is at least one page long.
        let probe = unsafe { std::slice::from_raw_parts(base, HEADER_PROBE_LEN) };
        let header = match pe::parse(probe) {
            Ok(header) => header,
            Err(e) => {
                // SAFETY: `handle` came from LoadLibraryExW.
                unsafe {
                    let _ = FreeLibrary(handle);
                }
                return Err(e);
            }
        };

        Ok(Self {
            handle,
            base,
            len: header.size_of_image as usize,
            header,
        })
    }

    pub fn header(&self) -> &PeHeader {
        &self.header
    }

    /// The mapped image, laid out at its virtual offsets.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: `base..base+len` stays mapped until Drop.
        unsafe { std::slice::from_raw_parts(self.base, self.len) }
    }
}

impl Drop for ModuleImage {
    fn drop(&mut self) {
        // SAFETY: `handle` came from LoadLibraryExW and is released once.
        unsafe {
            let _ = FreeLibrary(self.handle);
        }
    }
}
