//! Waiting for the engine modules of a freshly launched game process.
//!
//! A game process exists before its DLLs are mapped; the daemon polls the
//! module list until both the engine module and the scripting backend module
//! appear, or gives up after a fixed number of attempts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::shutdown::StopSignal;

pub const UNITY_PLAYER_DLL: &str = "UnityPlayer.dll";
pub const USER_ASSEMBLY_DLL: &str = "UserAssembly.dll";

pub const MODULE_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const MODULE_POLL_ATTEMPTS: u32 = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub path: PathBuf,
    pub base: u64,
}

/// The two modules the address resolution needs, once both are mapped.
#[derive(Debug, Clone)]
pub struct GameModules {
    pub unity_player: ModuleInfo,
    pub user_assembly: ModuleInfo,
}

/// A source of loaded-module snapshots for a running process.
pub trait ModuleList {
    fn modules(&self) -> Result<Vec<ModuleInfo>>;
    fn is_alive(&self) -> bool;
}

/// Whether `dir` contains the engine marker file that identifies a game
/// installation directory.
pub fn has_engine_marker(dir: &Path) -> bool {
    dir.join(UNITY_PLAYER_DLL).is_file()
}

/// Poll `list` until both required modules are present.
///
/// Enumeration errors are treated as "not yet loaded" and retried; a dead
/// process or a triggered stop signal aborts immediately. Module names are
/// compared exactly, matching how the loader reports them.
pub fn wait_for_game_modules<L: ModuleList>(
    list: &L,
    stop: &StopSignal,
    poll_interval: Duration,
) -> Result<GameModules> {
    for attempt in 0..MODULE_POLL_ATTEMPTS {
        if stop.is_triggered() {
            return Err(Error::Cancelled);
        }
        if !list.is_alive() {
            return Err(Error::ProcessExited);
        }

        let modules = list.modules().unwrap_or_default();
        let unity_player = modules.iter().find(|m| m.name == UNITY_PLAYER_DLL);
        let user_assembly = modules.iter().find(|m| m.name == USER_ASSEMBLY_DLL);

        if let (Some(unity_player), Some(user_assembly)) = (unity_player, user_assembly) {
            return Ok(GameModules {
                unity_player: unity_player.clone(),
                user_assembly: user_assembly.clone(),
            });
        }

        debug!(
            attempt = attempt + 1,
            "engine modules not yet loaded, retrying"
        );
        if stop.wait(poll_interval) {
            return Err(Error::Cancelled);
        }
    }

    Err(Error::ModuleWaitTimeout {
        attempts: MODULE_POLL_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedList {
        calls: AtomicUsize,
        appear_at: Option<usize>,
        alive: bool,
    }

    impl ScriptedList {
        fn new(appear_at: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                appear_at,
                alive: true,
            }
        }

        fn game_modules() -> Vec<ModuleInfo> {
            vec![
                ModuleInfo {
                    name: UNITY_PLAYER_DLL.to_string(),
                    path: PathBuf::from("C:/game/UnityPlayer.dll"),
                    base: 0x7FF6_0000_0000,
                },
                ModuleInfo {
                    name: USER_ASSEMBLY_DLL.to_string(),
                    path: PathBuf::from("C:/game/UserAssembly.dll"),
                    base: 0x7FF7_0000_0000,
                },
            ]
        }
    }

    impl ModuleList for ScriptedList {
        fn modules(&self) -> Result<Vec<ModuleInfo>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.appear_at {
                Some(n) if call >= n => Ok(Self::game_modules()),
                _ => Ok(vec![]),
            }
        }

        fn is_alive(&self) -> bool {
            self.alive
        }
    }

    #[test]
    fn succeeds_once_both_modules_appear() {
        let list = ScriptedList::new(Some(3));
        let stop = StopSignal::new();
        let modules = wait_for_game_modules(&list, &stop, Duration::ZERO).unwrap();
        assert_eq!(modules.unity_player.name, UNITY_PLAYER_DLL);
        assert_eq!(modules.user_assembly.base, 0x7FF7_0000_0000);
        assert_eq!(list.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn times_out_after_attempt_ceiling() {
        let list = ScriptedList::new(None);
        let stop = StopSignal::new();
        let err = wait_for_game_modules(&list, &stop, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::ModuleWaitTimeout { attempts: 40 }));
        assert_eq!(list.calls.load(Ordering::SeqCst) as u32, MODULE_POLL_ATTEMPTS);
    }

    #[test]
    fn aborts_when_process_is_dead() {
        let mut list = ScriptedList::new(Some(1));
        list.alive = false;
        let stop = StopSignal::new();
        let err = wait_for_game_modules(&list, &stop, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::ProcessExited));
    }

    #[test]
    fn aborts_when_stopped() {
        let list = ScriptedList::new(None);
        let stop = StopSignal::new();
        stop.trigger();
        let err = wait_for_game_modules(&list, &stop, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn partial_module_set_keeps_waiting() {
        struct OnlyUnity;
        impl ModuleList for OnlyUnity {
            fn modules(&self) -> Result<Vec<ModuleInfo>> {
                Ok(vec![ModuleInfo {
                    name: UNITY_PLAYER_DLL.to_string(),
                    path: PathBuf::from("C:/game/UnityPlayer.dll"),
                    base: 0x1000,
                }])
            }
            fn is_alive(&self) -> bool {
                true
            }
        }

        let stop = StopSignal::new();
        let err = wait_for_game_modules(&OnlyUnity, &stop, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::ModuleWaitTimeout { .. }));
    }

    #[test]
    fn engine_marker_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_engine_marker(dir.path()));
        std::fs::write(dir.path().join(UNITY_PLAYER_DLL), b"").unwrap();
        assert!(has_engine_marker(dir.path()));
    }
}
