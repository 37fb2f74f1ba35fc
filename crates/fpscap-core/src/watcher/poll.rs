use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use tracing::debug;

use crate::error::Result;
use crate::shutdown::StopSignal;
use crate::window::WindowRef;

use super::{FOREGROUND_POLL_INTERVAL, ForegroundWatcher};

/// Samples the foreground window on a fixed cadence and emits on change.
pub struct PollWatcher {
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl PollWatcher {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(StopSignal::new()),
            thread: None,
        }
    }
}

impl Default for PollWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundWatcher for PollWatcher {
    fn start(&mut self, tx: Sender<WindowRef>) -> Result<()> {
        let stop = Arc::clone(&self.stop);

        let thread = std::thread::Builder::new()
            .name("foreground-poll".to_string())
            .spawn(move || {
                let mut current = WindowRef::foreground();
                if tx.send(current).is_err() {
                    return;
                }

                while !stop.wait(FOREGROUND_POLL_INTERVAL) {
                    let foreground = WindowRef::foreground();
                    if foreground == current {
                        continue;
                    }
                    current = foreground;
                    if tx.send(current).is_err() {
                        break;
                    }
                }
                debug!("foreground polling stopped");
            })?;

        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.trigger();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
