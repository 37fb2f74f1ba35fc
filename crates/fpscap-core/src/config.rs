use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Daemon configuration, owned by the hosting application.
///
/// `fps_target` applies while the game window is foregrounded;
/// `fps_power_save` replaces it in the background when `use_power_save` is
/// set. `process_priority` is an index into the priority tier table (see
/// [`PriorityTier::from_index`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fps_target: i32,
    pub fps_power_save: i32,
    pub use_power_save: bool,
    pub process_priority: usize,
    /// Prefer the WinEvent hook over foreground polling when the host
    /// supports it.
    pub window_query_use_event: bool,
    /// When set, only a process running exactly this executable is accepted.
    pub game_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps_target: 120,
            fps_power_save: 10,
            use_power_save: false,
            process_priority: 3,
            window_query_use_event: true,
            game_path: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Process scheduling priority tiers, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityTier {
    Realtime,
    High,
    AboveNormal,
    Normal,
    BelowNormal,
    Idle,
}

impl PriorityTier {
    /// Map a configured tier index to a priority class; out-of-range indices
    /// clamp to the lowest tier.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => PriorityTier::Realtime,
            1 => PriorityTier::High,
            2 => PriorityTier::AboveNormal,
            3 => PriorityTier::Normal,
            4 => PriorityTier::BelowNormal,
            _ => PriorityTier::Idle,
        }
    }
}
