//! The FPS override daemon.
//!
//! Foreground-change notifications from the watcher are drained by a single
//! dispatch thread, which either binds to a newly foregrounded game process
//! or updates the focus state of the one already monitored. Binding resolves
//! the FPS variable and hands enforcement to a dedicated patch thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::image::ModuleImage;
use crate::memory::ProcessHandle;
use crate::modules::{MODULE_POLL_INTERVAL, has_engine_marker, wait_for_game_modules};
use crate::patching::{LoopEnd, PATCH_INTERVAL, run_patch_loop};
use crate::policy;
use crate::resolver::{ModuleView, resolve_fps_address};
use crate::shutdown::StopSignal;
use crate::watcher::{self, ForegroundWatcher};
use crate::window::WindowRef;

type ExitCallback = Box<dyn Fn(u32) + Send + 'static>;

/// A game process the daemon is currently enforcing an FPS limit on.
struct MonitoredProcess {
    process: Arc<ProcessHandle>,
    window: WindowRef,
    fps_address: u64,
    is_foreground: AtomicBool,
    stop: StopSignal,
}

struct Shared {
    config: Config,
    own_pid: u32,
    slot: Mutex<Option<Arc<MonitoredProcess>>>,
    patch_thread: Mutex<Option<JoinHandle<()>>>,
    stop: StopSignal,
    on_exit: Mutex<Option<ExitCallback>>,
}

pub struct FpsDaemon {
    shared: Arc<Shared>,
    watcher: Option<Box<dyn ForegroundWatcher + Send>>,
    dispatch: Option<JoinHandle<()>>,
}

impl FpsDaemon {
    pub fn new(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                own_pid: std::process::id(),
                slot: Mutex::new(None),
                patch_thread: Mutex::new(None),
                stop: StopSignal::new(),
                on_exit: Mutex::new(None),
            }),
            watcher: None,
            dispatch: None,
        }
    }

    /// Invoke `callback` with the process id whenever a monitored game
    /// exits. Must be set before [`start`](Self::start).
    pub fn on_process_exit<F: Fn(u32) + Send + 'static>(&mut self, callback: F) {
        if let Ok(mut on_exit) = self.shared.on_exit.lock() {
            *on_exit = Some(Box::new(callback));
        }
    }

    pub fn start(&mut self) -> Result<()> {
        let kind = watcher::probe(self.shared.config.window_query_use_event);
        info!(?kind, "starting foreground watcher");

        let (tx, rx) = mpsc::channel();
        let mut watcher = watcher::create(kind);
        watcher.start(tx)?;
        self.watcher = Some(watcher);

        let shared = Arc::clone(&self.shared);
        let dispatch = std::thread::Builder::new()
            .name("fps-dispatch".to_string())
            .spawn(move || {
                for window in rx {
                    if shared.stop.is_triggered() {
                        break;
                    }
                    shared.handle_notification(window);
                }
                debug!("dispatch thread exited");
            })?;
        self.dispatch = Some(dispatch);

        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.shared.stop.trigger();

        if let Ok(slot) = self.shared.slot.lock() {
            if let Some(monitored) = slot.as_ref() {
                monitored.stop.trigger();
            }
        }
        if let Ok(mut patch) = self.shared.patch_thread.lock() {
            if let Some(thread) = patch.take() {
                let _ = thread.join();
            }
        }
        if let Some(dispatch) = self.dispatch.take() {
            let _ = dispatch.join();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared
            .slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

impl Drop for FpsDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn handle_notification(self: &Arc<Self>, window: WindowRef) {
        let monitored = match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => return,
        };

        match monitored {
            Some(monitored) => self.update_focus(&monitored, window),
            None => self.try_bind(window),
        }
    }

    /// Record whether the monitored game regained or lost focus and adjust
    /// its scheduling priority accordingly.
    fn update_focus(&self, monitored: &MonitoredProcess, window: WindowRef) {
        let is_foreground = window.process_id() == monitored.process.pid();
        monitored.is_foreground.store(is_foreground, Ordering::SeqCst);

        if let Some(tier) = policy::priority_for(is_foreground, &self.config) {
            if let Err(e) = monitored.process.set_priority(tier) {
                warn!("failed to adjust game priority: {e}");
            }
        }
    }

    /// Decide whether the newly foregrounded window belongs to a game we can
    /// bind to, and if so resolve its FPS variable and start enforcement.
    ///
    /// Disqualifications are silent or logged at debug level; windows come
    /// and go constantly and almost none of them are the game.
    fn try_bind(self: &Arc<Self>, window: WindowRef) {
        let pid = window.process_id();
        if pid == 0 || pid == self.own_pid {
            return;
        }

        let process = match ProcessHandle::open(pid) {
            Ok(process) => Arc::new(process),
            Err(e) => {
                debug!("cannot open process {pid}: {e}");
                return;
            }
        };

        let exe_path = match process.exe_path() {
            Ok(path) => path,
            Err(e) => {
                debug!("cannot query executable of {pid}: {e}");
                return;
            }
        };

        if let Some(expected) = &self.config.game_path {
            // Windows paths compare case-insensitively
            let matches = exe_path
                .to_string_lossy()
                .eq_ignore_ascii_case(&expected.to_string_lossy());
            if !matches {
                return;
            }
        }

        let Some(exe_dir) = exe_path.parent() else {
            return;
        };
        if !has_engine_marker(exe_dir) {
            return;
        }

        info!(
            "Found the game window: [{:#x} {}] ({}) {}",
            window.0,
            window.class_name(),
            pid,
            window.title()
        );

        let monitored = match self.bind(process, window) {
            Ok(monitored) => monitored,
            Err(e) => {
                if matches!(e, Error::UnsupportedBinary { .. }) {
                    error!("{e}");
                } else if e.is_binding_failure() {
                    debug!("binding to process {pid} abandoned: {e}");
                } else {
                    warn!("binding to process {pid} failed: {e}");
                }
                return;
            }
        };

        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(Arc::clone(&monitored));
        }
        self.update_focus(&monitored, window);
        self.spawn_patch_loop(monitored);
    }

    fn bind(&self, process: Arc<ProcessHandle>, window: WindowRef) -> Result<Arc<MonitoredProcess>> {
        let modules = wait_for_game_modules(&*process, &self.stop, MODULE_POLL_INTERVAL)?;
        debug!(
            unity_base = format_args!("{:#x}", modules.unity_player.base),
            user_assembly_base = format_args!("{:#x}", modules.user_assembly.base),
            "engine modules loaded"
        );

        let unity_image = ModuleImage::load(&modules.unity_player.path)?;
        let user_image = ModuleImage::load(&modules.user_assembly.path)?;

        let fps_address = resolve_fps_address(
            &*process,
            &ModuleView {
                image: unity_image.bytes(),
                timestamp: unity_image.header().timestamp,
                remote_base: modules.unity_player.base,
            },
            &ModuleView {
                image: user_image.bytes(),
                timestamp: user_image.header().timestamp,
                remote_base: modules.user_assembly.base,
            },
            &self.stop,
        )?;
        info!("FPS variable resolved at {fps_address:#x}");

        Ok(Arc::new(MonitoredProcess {
            process,
            window,
            fps_address,
            is_foreground: AtomicBool::new(true),
            stop: StopSignal::new(),
        }))
    }

    fn spawn_patch_loop(self: &Arc<Self>, monitored: Arc<MonitoredProcess>) {
        let shared = Arc::clone(self);
        let thread = std::thread::Builder::new()
            .name("fps-patch".to_string())
            .spawn(move || {
                let pid = monitored.process.pid();
                let target = || {
                    // Spot-check focus each tick; watcher notifications can
                    // be missed while binding.
                    let is_foreground = monitored.window.is_foreground();
                    monitored
                        .is_foreground
                        .store(is_foreground, Ordering::SeqCst);
                    policy::select_target(is_foreground, &shared.config)
                };

                let end = run_patch_loop(
                    &*monitored.process,
                    monitored.fps_address,
                    target,
                    &monitored.stop,
                    PATCH_INTERVAL,
                );

                if end == LoopEnd::ProcessExited {
                    info!("Game process {pid} exited");
                    if let Ok(on_exit) = shared.on_exit.lock() {
                        if let Some(callback) = on_exit.as_ref() {
                            callback(pid);
                        }
                    }
                }

                if let Ok(mut slot) = shared.slot.lock() {
                    let stale = slot
                        .as_ref()
                        .is_some_and(|current| Arc::ptr_eq(current, &monitored));
                    if stale {
                        *slot = None;
                    }
                }
                info!("Stopped applying FPS override.");
            });

        match thread {
            Ok(thread) => {
                if let Ok(mut patch) = self.patch_thread.lock() {
                    if let Some(previous) = patch.replace(thread) {
                        let _ = previous.join();
                    }
                }
            }
            Err(e) => {
                warn!("failed to spawn patch thread: {e}");
                if let Ok(mut slot) = self.slot.lock() {
                    *slot = None;
                }
            }
        }
    }
}
