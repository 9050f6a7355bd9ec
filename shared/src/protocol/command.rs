use crate::overlay::{DisplayMode, OverlayMessage, OverlaySettings, Theme};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Partial settings update. Absent fields leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_mode: Option<DisplayMode>,
    /// Drops every queued and active message.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub clear: bool,
}

impl ControlCommand {
    /// Full snapshot of `settings`, sent after every (re)connect.
    pub fn from_settings(settings: &OverlaySettings) -> Self {
        Self {
            enabled: Some(settings.enabled),
            transparency: Some(settings.transparency()),
            duration_ms: Some(settings.duration.as_millis() as u64),
            theme: Some(settings.theme),
            display_mode: Some(settings.display_mode),
            clear: false,
        }
    }

    pub fn apply(&self, settings: &mut OverlaySettings) {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(t) = self.transparency {
            settings.set_transparency(t);
        }
        if let Some(ms) = self.duration_ms {
            settings.duration = Duration::from_millis(ms);
        }
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
        if let Some(mode) = self.display_mode {
            settings.display_mode = mode;
        }
    }
}

/// One decoded controller-to-module frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OverlayCommand {
    Overlay(OverlayMessage),
    Control(ControlCommand),
}

impl OverlayCommand {
    /// JSON commands are decoded by their `type`; any line that is not JSON is shown verbatim as
    /// a plain-text message. JSON that is not a command yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => serde_json::from_value(value).ok(),
            Err(_) => Some(OverlayCommand::Overlay(OverlayMessage::text(line))),
        }
    }

    pub fn to_line(&self) -> String {
        // Serializing these types cannot fail: every field is a plain value or string.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::MessageAnchor;

    #[test]
    fn plain_text_becomes_message() {
        assert_eq!(
            OverlayCommand::parse("Watch your ledge options"),
            Some(OverlayCommand::Overlay(OverlayMessage::text("Watch your ledge options")))
        );
    }

    #[test]
    fn overlay_json() {
        let cmd = OverlayCommand::parse(r#"{"type":"overlay","text":"L-cancel!","anchor":"topCenter","durationMs":800}"#);
        let Some(OverlayCommand::Overlay(msg)) = cmd else { panic!("expected overlay") };
        assert_eq!(msg.text, "L-cancel!");
        assert_eq!(msg.anchor, MessageAnchor::TopCenter);
        assert_eq!(msg.duration, Some(Duration::from_millis(800)));
    }

    #[test]
    fn control_json_applies_partially() {
        let cmd = OverlayCommand::parse(r#"{"type":"control","transparency":3.5,"theme":"slippi"}"#);
        let Some(OverlayCommand::Control(ctrl)) = cmd else { panic!("expected control") };
        let mut settings = OverlaySettings::default();
        ctrl.apply(&mut settings);
        assert_eq!(settings.transparency(), 1.0);
        assert_eq!(settings.theme, Theme::Slippi);
        assert!(settings.enabled);
        assert!(!ctrl.clear);
    }

    #[test]
    fn unknown_json_is_ignored() {
        assert_eq!(OverlayCommand::parse(r#"{"type":"gameState","frame":1}"#), None);
        assert_eq!(OverlayCommand::parse(r#"{"type":"control","theme":"neon"}"#), None);
        assert_eq!(OverlayCommand::parse("   "), None);
    }

    #[test]
    fn settings_snapshot_round_trips() {
        let settings = OverlaySettings::default().with_transparency(0.5);
        let line = OverlayCommand::Control(ControlCommand::from_settings(&settings)).to_line();
        let Some(OverlayCommand::Control(ctrl)) = OverlayCommand::parse(&line) else { panic!() };
        let mut applied = OverlaySettings::default();
        applied.enabled = false;
        ctrl.apply(&mut applied);
        assert_eq!(applied, settings);
    }

    #[test]
    fn clear_flag_is_only_written_when_set() {
        let line = OverlayCommand::Control(ControlCommand { clear: true, ..Default::default() }).to_line();
        assert_eq!(line, r#"{"type":"control","clear":true}"#);
        let line = OverlayCommand::Control(ControlCommand::default()).to_line();
        assert_eq!(line, r#"{"type":"control"}"#);
    }
}
