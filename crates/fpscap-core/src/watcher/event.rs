use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;

use tracing::{debug, warn};
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, EVENT_SYSTEM_FOREGROUND, GetMessageW, MSG, PostThreadMessageW,
    TranslateMessage, WINEVENT_OUTOFCONTEXT, WINEVENT_SKIPOWNPROCESS, WM_QUIT,
};

use crate::error::{Error, Result};
use crate::window::WindowRef;

use super::ForegroundWatcher;

/// Where the hook callback forwards notifications. A process gets at most
/// one live hook; the slot is cleared on stop so late callbacks are dropped.
static EVENT_SINK: OnceLock<Mutex<Option<Sender<WindowRef>>>> = OnceLock::new();

fn event_sink() -> &'static Mutex<Option<Sender<WindowRef>>> {
    EVENT_SINK.get_or_init(|| Mutex::new(None))
}

unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    _event: u32,
    hwnd: HWND,
    _id_object: i32,
    _id_child: i32,
    _id_event_thread: u32,
    _event_time: u32,
) {
    if let Ok(sink) = event_sink().lock() {
        if let Some(tx) = sink.as_ref() {
            let _ = tx.send(WindowRef(hwnd.0 as isize));
        }
    }
}

/// Receives foreground changes through an out-of-context WinEvent hook.
///
/// The hook needs a thread that pumps messages, so a dedicated thread owns
/// both the hook and the message loop; `stop` posts `WM_QUIT` to it.
pub struct EventWatcher {
    thread: Option<JoinHandle<()>>,
    thread_id: Option<u32>,
}

impl EventWatcher {
    pub fn new() -> Self {
        Self {
            thread: None,
            thread_id: None,
        }
    }
}

impl Default for EventWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundWatcher for EventWatcher {
    fn start(&mut self, tx: Sender<WindowRef>) -> Result<()> {
        {
            let mut sink = event_sink()
                .lock()
                .map_err(|_| Error::WatcherStart("event sink poisoned".to_string()))?;
            if sink.is_some() {
                return Err(Error::WatcherStart(
                    "an event watcher is already running".to_string(),
                ));
            }
            *sink = Some(tx.clone());
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("foreground-hook".to_string())
            .spawn(move || {
                // SAFETY: the callback is an extern "system" fn with the
                // WINEVENTPROC signature and stays valid for the program's
                // lifetime.
                let hook = unsafe {
                    SetWinEventHook(
                        EVENT_SYSTEM_FOREGROUND,
                        EVENT_SYSTEM_FOREGROUND,
                        None,
                        Some(win_event_proc),
                        0,
                        0,
                        WINEVENT_OUTOFCONTEXT | WINEVENT_SKIPOWNPROCESS,
                    )
                };

                // SAFETY: no arguments.
                let thread_id = unsafe { GetCurrentThreadId() };
                if ready_tx.send((thread_id, hook.is_invalid())).is_err() {
                    if !hook.is_invalid() {
                        // SAFETY: `hook` came from SetWinEventHook.
                        unsafe {
                            let _ = UnhookWinEvent(hook);
                        }
                    }
                    return;
                }
                if hook.is_invalid() {
                    return;
                }

                let mut msg = MSG::default();
                // SAFETY: `msg` is a valid out pointer; GetMessageW returns
                // a negative BOOL on error, which also ends the loop.
                unsafe {
                    while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }

                // SAFETY: `hook` came from SetWinEventHook on this thread.
                unsafe {
                    let _ = UnhookWinEvent(hook);
                }
                debug!("foreground hook thread exited");
            })?;

        let (thread_id, hook_failed) = ready_rx.recv().map_err(|_| {
            Error::WatcherStart("hook thread died before reporting readiness".to_string())
        })?;

        if hook_failed {
            if let Ok(mut sink) = event_sink().lock() {
                *sink = None;
            }
            let _ = thread.join();
            return Err(Error::WatcherStart(
                "SetWinEventHook returned an invalid hook".to_string(),
            ));
        }

        self.thread = Some(thread);
        self.thread_id = Some(thread_id);

        // The hook only fires on changes; report the current state once.
        if tx.send(WindowRef::foreground()).is_err() {
            warn!("notification channel closed during watcher start");
        }

        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut sink) = event_sink().lock() {
            *sink = None;
        }

        if let Some(thread_id) = self.thread_id.take() {
            // SAFETY: posting WM_QUIT to our own hook thread.
            let posted =
                unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
            if let Err(e) = posted {
                warn!("failed to post quit to hook thread: {e}");
            }
        }

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
