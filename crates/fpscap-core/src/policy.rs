//! Foreground/background FPS and priority decisions.

use crate::config::{Config, PriorityTier};

/// The FPS limit that should be in force right now.
///
/// Background throttling only happens when power saving is enabled; otherwise
/// the configured target applies regardless of focus.
pub fn select_target(is_foreground: bool, config: &Config) -> i32 {
    if is_foreground || !config.use_power_save {
        config.fps_target
    } else {
        config.fps_power_save
    }
}

/// The process priority to apply for the current focus state, if any.
///
/// Priority management is tied to power saving: with it disabled the game's
/// own priority is left alone entirely.
pub fn priority_for(is_foreground: bool, config: &Config) -> Option<PriorityTier> {
    if !config.use_power_save {
        return None;
    }
    Some(if is_foreground {
        PriorityTier::from_index(config.process_priority)
    } else {
        PriorityTier::Idle
    })
}
