use super::theme::Color;
use crate::constants::{DEFAULT_MESSAGE_DURATION, FADE_START_FRACTION};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Screen region a message is stacked in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageAnchor {
    #[default]
    Auto,
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl MessageAnchor {
    /// `Auto` lands in the top-right corner, away from most HUDs.
    pub fn resolve(self) -> Self {
        match self {
            MessageAnchor::Auto => MessageAnchor::TopRight,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageCategory {
    #[default]
    General,
    Technical,
    Positioning,
    Combo,
    Defensive,
    Offensive,
    Neutral,
}

impl MessageCategory {
    /// Accent used for the bubble border. `General` keeps the theme's own border.
    pub fn accent(&self) -> Option<Color> {
        match self {
            MessageCategory::General => None,
            MessageCategory::Technical => Some(Color::rgb(66, 135, 245)),
            MessageCategory::Positioning => Some(Color::rgb(156, 89, 209)),
            MessageCategory::Combo => Some(Color::rgb(245, 146, 27)),
            MessageCategory::Defensive => Some(Color::rgb(38, 198, 218)),
            MessageCategory::Offensive => Some(Color::rgb(229, 57, 53)),
            MessageCategory::Neutral => Some(Color::rgb(158, 158, 158)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A unit of content to draw over the target's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayMessage {
    pub text: String,
    /// `None` takes the receiver's configured display duration.
    #[serde(rename = "durationMs", with = "duration_ms", default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub anchor: MessageAnchor,
    #[serde(default)]
    pub category: MessageCategory,
    #[serde(default)]
    pub priority: MessagePriority,
}

impl OverlayMessage {
    /// Plain text with the configured duration and default anchor, category and priority.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            duration: None,
            anchor: MessageAnchor::default(),
            category: MessageCategory::default(),
            priority: MessagePriority::default(),
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Fills an unset duration with `default`.
    pub fn or_duration(mut self, default: Duration) -> Self {
        self.duration.get_or_insert(default);
        self
    }

    pub fn with_anchor(mut self, anchor: MessageAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_category(mut self, category: MessageCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Opacity of a message `elapsed` into a lifetime of `duration`.
///
/// Fully opaque up to 80% of the lifetime, then linear down to zero at the end.
pub fn fade_alpha(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() || elapsed >= duration {
        return 0.0;
    }
    let t = elapsed.as_secs_f32() / duration.as_secs_f32();
    if t <= FADE_START_FRACTION {
        1.0
    } else {
        ((1.0 - t) / (1.0 - FADE_START_FRACTION)).clamp(0.0, 1.0)
    }
}

/// An OverlayMessage that has started its on-screen lifetime.
#[derive(Debug, Clone)]
pub struct ActiveMessage {
    pub id: u64,
    pub message: OverlayMessage,
    pub started: Instant,
    pub duration: Duration,
}

impl ActiveMessage {
    pub fn begin(id: u64, message: OverlayMessage, now: Instant) -> Self {
        let duration = message.duration.unwrap_or(DEFAULT_MESSAGE_DURATION);
        Self { id, message, started: now, duration }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Present for elapsed in `[0, duration)`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.duration
    }

    pub fn alpha(&self, now: Instant) -> f32 {
        fade_alpha(self.elapsed(now), self.duration)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_u64(d.as_millis() as u64),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: Duration = Duration::from_millis(5000);

    #[test]
    fn alpha_is_opaque_until_eighty_percent() {
        assert_eq!(fade_alpha(Duration::ZERO, D), 1.0);
        assert_eq!(fade_alpha(Duration::from_millis(2500), D), 1.0);
        assert_eq!(fade_alpha(Duration::from_millis(4000), D), 1.0);
    }

    #[test]
    fn alpha_fades_linearly_to_zero() {
        let mid = fade_alpha(Duration::from_millis(4500), D);
        assert!((mid - 0.5).abs() < 1e-4, "got {mid}");
        let late = fade_alpha(Duration::from_millis(4900), D);
        assert!((late - 0.1).abs() < 1e-4, "got {late}");
        assert_eq!(fade_alpha(D, D), 0.0);
        assert_eq!(fade_alpha(D * 2, D), 0.0);
    }

    #[test]
    fn lifetime_is_half_open() {
        let t0 = Instant::now();
        let active = ActiveMessage::begin(1, OverlayMessage::text("hi").with_duration(D), t0);
        assert!(!active.is_expired(t0));
        assert!(!active.is_expired(t0 + Duration::from_millis(4999)));
        assert!(active.is_expired(t0 + D));
    }

    #[test]
    fn zero_duration_is_never_shown() {
        let t0 = Instant::now();
        let active = ActiveMessage::begin(1, OverlayMessage::text("x").with_duration(Duration::ZERO), t0);
        assert!(active.is_expired(t0));
        assert_eq!(active.alpha(t0), 0.0);
    }

    #[test]
    fn message_json_defaults() {
        let m: OverlayMessage = serde_json::from_str(r#"{"text":"Nice edgeguard"}"#).unwrap();
        assert_eq!(m, OverlayMessage::text("Nice edgeguard"));
        assert_eq!(m.duration, None);

        let m: OverlayMessage = serde_json::from_str(
            r#"{"text":"t","durationMs":1500,"anchor":"bottomLeft","category":"combo","priority":"critical"}"#,
        )
        .unwrap();
        assert_eq!(m.duration, Some(Duration::from_millis(1500)));
        assert_eq!(m.anchor, MessageAnchor::BottomLeft);
        assert_eq!(m.category, MessageCategory::Combo);
        assert_eq!(m.priority, MessagePriority::Critical);
    }

    #[test]
    fn unset_duration_is_left_to_the_receiver() {
        let line = serde_json::to_string(&OverlayMessage::text("x")).unwrap();
        assert!(!line.contains("durationMs"), "{line}");

        let filled = OverlayMessage::text("x").or_duration(Duration::from_millis(300));
        assert_eq!(filled.duration, Some(Duration::from_millis(300)));
        let kept = OverlayMessage::text("x").with_duration(D).or_duration(Duration::from_millis(300));
        assert_eq!(kept.duration, Some(D));
    }

    #[test]
    fn auto_anchor_resolves_top_right() {
        assert_eq!(MessageAnchor::Auto.resolve(), MessageAnchor::TopRight);
        assert_eq!(MessageAnchor::BottomCenter.resolve(), MessageAnchor::BottomCenter);
    }
}
