//! Thin wrapper over top-level window handles.

/// A window handle that can cross threads.
///
/// Raw `HWND` values are process-global tokens; storing the value as an
/// integer lets notifications travel over channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRef(pub isize);

impl WindowRef {
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(target_os = "windows")]
mod imp {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{
        GetClassNameW, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
    };

    use super::WindowRef;

    impl WindowRef {
        pub(crate) fn hwnd(&self) -> HWND {
            HWND(self.0 as *mut core::ffi::c_void)
        }

        /// The currently foregrounded window, null if none.
        pub fn foreground() -> Self {
            // SAFETY: no arguments; a null HWND is a valid result.
            let hwnd = unsafe { GetForegroundWindow() };
            WindowRef(hwnd.0 as isize)
        }

        /// Owning process id, 0 for a null or stale handle.
        pub fn process_id(&self) -> u32 {
            if self.is_null() {
                return 0;
            }
            let mut pid = 0u32;
            // SAFETY: `pid` is a valid out pointer for the duration of the
            // call.
            unsafe { GetWindowThreadProcessId(self.hwnd(), Some(&mut pid)) };
            pid
        }

        pub fn class_name(&self) -> String {
            let mut buffer = [0u16; 512];
            // SAFETY: the buffer outlives the call.
            let len = unsafe { GetClassNameW(self.hwnd(), &mut buffer) };
            String::from_utf16_lossy(&buffer[..len.max(0) as usize])
        }

        pub fn title(&self) -> String {
            let mut buffer = [0u16; 512];
            // SAFETY: the buffer outlives the call.
            let len = unsafe { GetWindowTextW(self.hwnd(), &mut buffer) };
            String::from_utf16_lossy(&buffer[..len.max(0) as usize])
        }

        pub fn is_foreground(&self) -> bool {
            !self.is_null() && Self::foreground() == *self
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod imp {
    use super::WindowRef;

    impl WindowRef {
        pub fn foreground() -> Self {
            WindowRef(0)
        }

        pub fn process_id(&self) -> u32 {
            0
        }

        pub fn class_name(&self) -> String {
            String::new()
        }

        pub fn title(&self) -> String {
            String::new()
        }

        pub fn is_foreground(&self) -> bool {
            false
        }
    }
}
