use std::ffi::c_void;
use std::path::PathBuf;

use windows::Win32::Foundation::{CloseHandle, HANDLE, HMODULE, STILL_ACTIVE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::ProcessStatus::{
    K32EnumProcessModulesEx, K32GetModuleBaseNameW, K32GetModuleFileNameExW,
    K32GetModuleInformation, LIST_MODULES_ALL, MODULEINFO,
};
use windows::Win32::System::Threading::{
    ABOVE_NORMAL_PRIORITY_CLASS, BELOW_NORMAL_PRIORITY_CLASS, GetExitCodeProcess,
    HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS, NORMAL_PRIORITY_CLASS, OpenProcess,
    PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_INFORMATION,
    PROCESS_SYNCHRONIZE, PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
    QueryFullProcessImageNameW, REALTIME_PRIORITY_CLASS, SetPriorityClass,
};
use windows::core::PWSTR;

use crate::config::PriorityTier;
use crate::error::{Error, Result};
use crate::modules::{ModuleInfo, ModuleList};

use super::ProcessMemory;

/// An open handle to the game process.
///
/// The handle carries query, memory and priority rights; dropping it closes
/// the underlying kernel handle.
pub struct ProcessHandle {
    pid: u32,
    handle: HANDLE,
}

// SAFETY: the HANDLE is an owned kernel handle; the Win32 process APIs used
// here are documented as callable from any thread.
unsafe impl Send for ProcessHandle {}
unsafe impl Sync for ProcessHandle {}

impl ProcessHandle {
    pub fn open(pid: u32) -> Result<Self> {
        let rights = PROCESS_QUERY_LIMITED_INFORMATION
            | PROCESS_VM_READ
            | PROCESS_VM_WRITE
            | PROCESS_VM_OPERATION
            | PROCESS_SET_INFORMATION
            | PROCESS_SYNCHRONIZE;

        // SAFETY: OpenProcess has no pointer arguments; failure is surfaced
        // as an error by the windows crate.
        let handle = unsafe { OpenProcess(rights, false, pid) }.map_err(|e| {
            Error::ProcessOpenFailed {
                pid,
                message: e.message(),
            }
        })?;

        Ok(Self { pid, handle })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Full path of the process executable.
    pub fn exe_path(&self) -> Result<PathBuf> {
        let mut buffer = vec![0u16; 1024];
        let mut len = buffer.len() as u32;

        // SAFETY: the buffer outlives the call and `len` carries its
        // capacity in characters.
        unsafe {
            QueryFullProcessImageNameW(
                self.handle,
                PROCESS_NAME_WIN32,
                PWSTR::from_raw(buffer.as_mut_ptr()),
                &mut len,
            )
        }
        .map_err(|e| Error::ProcessOpenFailed {
            pid: self.pid,
            message: format!("query image name: {}", e.message()),
        })?;

        Ok(PathBuf::from(String::from_utf16_lossy(
            &buffer[..len as usize],
        )))
    }

    pub fn has_exited(&self) -> bool {
        let mut code = 0u32;
        // SAFETY: `code` is a valid out pointer for the duration of the call.
        match unsafe { GetExitCodeProcess(self.handle, &mut code) } {
            Ok(()) => code != STILL_ACTIVE.0 as u32,
            Err(_) => true,
        }
    }

    pub fn set_priority(&self, tier: PriorityTier) -> Result<()> {
        let class = match tier {
            PriorityTier::Realtime => REALTIME_PRIORITY_CLASS,
            PriorityTier::High => HIGH_PRIORITY_CLASS,
            PriorityTier::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
            PriorityTier::Normal => NORMAL_PRIORITY_CLASS,
            PriorityTier::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            PriorityTier::Idle => IDLE_PRIORITY_CLASS,
        };

        // SAFETY: no pointer arguments.
        unsafe { SetPriorityClass(self.handle, class) }.map_err(|e| Error::ProcessOpenFailed {
            pid: self.pid,
            message: format!("set priority: {}", e.message()),
        })
    }
}

impl ProcessMemory for ProcessHandle {
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut read = 0usize;

        // SAFETY: `buffer` has capacity `len` and `read` is a valid out
        // pointer; both outlive the call.
        unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                len,
                Some(&mut read),
            )
        }
        .map_err(|e| Error::MemoryReadFailed {
            address,
            message: e.message(),
        })?;

        buffer.truncate(read);
        Ok(buffer)
    }

    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<usize> {
        let mut written = 0usize;

        // SAFETY: `data` and `written` outlive the call.
        unsafe {
            WriteProcessMemory(
                self.handle,
                address as *const c_void,
                data.as_ptr() as *const c_void,
                data.len(),
                Some(&mut written),
            )
        }
        .map_err(|e| Error::MemoryWriteFailed {
            address,
            message: e.message(),
        })?;

        Ok(written)
    }

    fn is_alive(&self) -> bool {
        !self.has_exited()
    }
}

impl ModuleList for ProcessHandle {
    fn modules(&self) -> Result<Vec<ModuleInfo>> {
        let mut handles = vec![HMODULE::default(); 1024];
        let mut needed = 0u32;
        let capacity = (handles.len() * std::mem::size_of::<HMODULE>()) as u32;

        // SAFETY: `handles` has `capacity` bytes of storage and `needed` is a
        // valid out pointer.
        unsafe {
            K32EnumProcessModulesEx(
                self.handle,
                handles.as_mut_ptr(),
                capacity,
                &mut needed,
                LIST_MODULES_ALL,
            )
        }
        .ok()
        .map_err(|e| Error::ProcessOpenFailed {
            pid: self.pid,
            message: format!("enumerate modules: {}", e.message()),
        })?;

        let count = (needed as usize / std::mem::size_of::<HMODULE>()).min(handles.len());
        let mut modules = Vec::with_capacity(count);

        for &module in &handles[..count] {
            let mut name = vec![0u16; 260];
            let mut path = vec![0u16; 1024];
            let mut info = MODULEINFO::default();

            // SAFETY: the buffers and `info` outlive the calls; lengths are
            // passed from the buffer capacities.
            let (name_len, path_len, info_ok) = unsafe {
                (
                    K32GetModuleBaseNameW(self.handle, module, &mut name),
                    K32GetModuleFileNameExW(self.handle, module, &mut path),
                    K32GetModuleInformation(
                        self.handle,
                        module,
                        &mut info,
                        std::mem::size_of::<MODULEINFO>() as u32,
                    )
                    .as_bool(),
                )
            };

            // A module can unload between enumeration and query; skip it.
            if name_len == 0 || !info_ok {
                continue;
            }

            modules.push(ModuleInfo {
                name: String::from_utf16_lossy(&name[..name_len as usize]),
                path: PathBuf::from(String::from_utf16_lossy(&path[..path_len as usize])),
                base: info.lpBaseOfDll as u64,
            });
        }

        Ok(modules)
    }

    fn is_alive(&self) -> bool {
        !self.has_exited()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // SAFETY: the handle was returned by OpenProcess and is closed once.
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}
