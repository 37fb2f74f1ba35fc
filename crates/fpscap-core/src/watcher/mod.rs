//! Foreground window change notifications.
//!
//! Two implementations exist: a WinEvent hook that reacts to focus changes
//! as they happen, and a polling fallback for hosts where out-of-context
//! hooks are unreliable (notably Wine). Both deliver [`WindowRef`]s over a
//! channel, starting with one synthetic notification for the window that is
//! foregrounded when the watcher starts.

use std::sync::mpsc::Sender;
use std::time::Duration;

use tracing::debug;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::core::{s, w};

use crate::error::Result;
use crate::window::WindowRef;

mod event;
mod poll;

pub use event::EventWatcher;
pub use poll::PollWatcher;

pub const FOREGROUND_POLL_INTERVAL: Duration = Duration::from_millis(300);

pub trait ForegroundWatcher {
    /// Start delivering foreground changes to `tx`. The first notification is
    /// synthetic and reports the current foreground window.
    fn start(&mut self, tx: Sender<WindowRef>) -> Result<()>;

    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherKind {
    Event,
    Poll,
}

/// Pick the watcher implementation: the event hook when the configuration
/// asks for it and the host supports it, polling otherwise.
pub fn probe(prefer_event: bool) -> WatcherKind {
    if prefer_event && !is_wine() {
        WatcherKind::Event
    } else {
        WatcherKind::Poll
    }
}

pub fn create(kind: WatcherKind) -> Box<dyn ForegroundWatcher + Send> {
    match kind {
        WatcherKind::Event => Box::new(EventWatcher::new()),
        WatcherKind::Poll => Box::new(PollWatcher::new()),
    }
}

/// Wine exports `wine_get_version` from its ntdll; real Windows does not.
fn is_wine() -> bool {
    // SAFETY: ntdll is always loaded; GetProcAddress only inspects its
    // export table.
    let wine = unsafe { GetModuleHandleW(w!("ntdll.dll")) }
        .ok()
        .and_then(|ntdll| unsafe { GetProcAddress(ntdll, s!("wine_get_version")) });
    if wine.is_some() {
        debug!("Wine host detected, foreground event hook disabled");
    }
    wine.is_some()
}
