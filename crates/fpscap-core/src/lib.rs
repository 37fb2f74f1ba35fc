//! Core engine for the FPS cap override daemon.
//!
//! The daemon watches for a Unity game gaining foreground focus, resolves
//! the engine's frame-rate limit variable by signature-scanning locally
//! mapped copies of the game's modules, and then enforces the configured
//! limit with a periodic read-compare-write loop on the game process.
//!
//! Everything except the Win32 plumbing (process handles, module mapping,
//! the foreground watcher and the daemon itself) is platform-neutral and
//! unit-tested against in-memory doubles.

pub mod config;
pub mod error;
pub mod memory;
pub mod modules;
pub mod patching;
pub mod pe;
pub mod policy;
pub mod resolver;
pub mod shutdown;
pub mod signature;
pub mod window;

#[cfg(target_os = "windows")]
pub mod daemon;
#[cfg(target_os = "windows")]
pub mod image;
#[cfg(target_os = "windows")]
pub mod watcher;

pub use config::{Config, PriorityTier};
pub use error::{Error, Result};
pub use memory::ProcessMemory;
pub use modules::{GameModules, ModuleInfo, ModuleList, has_engine_marker, wait_for_game_modules};
pub use patching::{LoopEnd, PATCH_INTERVAL, PatchOutcome, patch_cycle, run_patch_loop};
pub use pe::PeHeader;
pub use policy::{priority_for, select_target};
pub use resolver::{Era, ModuleView, resolve_fps_address};
pub use shutdown::StopSignal;
pub use signature::Signature;
pub use window::WindowRef;

#[cfg(target_os = "windows")]
pub use daemon::FpsDaemon;
#[cfg(target_os = "windows")]
pub use image::ModuleImage;
#[cfg(target_os = "windows")]
pub use memory::ProcessHandle;
