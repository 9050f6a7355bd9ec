use super::theme::Theme;
use crate::constants::{DEFAULT_MESSAGE_DURATION, DEFAULT_TRANSPARENCY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the injected module shows messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Draw into the host's own frame from the presentation hook.
    #[default]
    Hook,
    /// Draw into a click-through companion window kept on top of the host window.
    Window,
}

/// Clamps to [0,1]; NaN maps to fully transparent.
pub fn clamp_transparency(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Display controls exposed to the embedding host.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySettings {
    pub enabled: bool,
    transparency: f32,
    /// Lifetime given to messages that arrive without one.
    pub duration: Duration,
    pub theme: Theme,
    pub display_mode: DisplayMode,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            transparency: DEFAULT_TRANSPARENCY,
            duration: DEFAULT_MESSAGE_DURATION,
            theme: Theme::default(),
            display_mode: DisplayMode::default(),
        }
    }
}

impl OverlaySettings {
    pub fn transparency(&self) -> f32 {
        self.transparency
    }

    pub fn set_transparency(&mut self, value: f32) {
        self.transparency = clamp_transparency(value);
    }

    pub fn with_transparency(mut self, value: f32) -> Self {
        self.set_transparency(value);
        self
    }
}
