//! Queued and on-screen messages plus the live display settings.

use log::debug;
use shared::overlay::{
    ActiveMessage, Color, MessageAnchor, MessagePriority, OverlayMessage, OverlaySettings,
};
use shared::protocol::ControlCommand;
use std::collections::VecDeque;
use std::time::Instant;

/// Messages waiting for the next frame. The oldest are dropped beyond this.
pub const MAX_QUEUED: usize = 64;

/// What a frame needs to draw one message.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleMessage {
    pub id: u64,
    pub text: String,
    pub anchor: MessageAnchor,
    pub accent: Option<Color>,
    pub priority: MessagePriority,
    pub alpha: f32,
}

#[derive(Debug, Default)]
pub struct MessageBoard {
    settings: OverlaySettings,
    queue: VecDeque<OverlayMessage>,
    active: Vec<ActiveMessage>,
    next_id: u64,
}

impl MessageBoard {
    pub fn new(settings: OverlaySettings) -> Self {
        Self { settings, ..Self::default() }
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    /// Messages without a duration take the one configured now.
    pub fn enqueue(&mut self, message: OverlayMessage) {
        let message = message.or_duration(self.settings.duration);
        if self.queue.len() >= MAX_QUEUED {
            if let Some(dropped) = self.queue.pop_front() {
                debug!("message queue full; dropping `{}`", dropped.text);
            }
        }
        self.queue.push_back(message);
    }

    pub fn apply(&mut self, command: &ControlCommand) {
        command.apply(&mut self.settings);
        if command.clear {
            self.clear();
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.active.clear();
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Advances to `now`: when enabled, every queued message starts its lifetime (FIFO), expired
    /// ones are discarded, and the rest are returned in start order with their current alpha.
    /// While disabled nothing is drained or drawn.
    pub fn advance(&mut self, now: Instant) -> Vec<VisibleMessage> {
        self.active.retain(|m| !m.is_expired(now));
        if !self.settings.enabled {
            return Vec::new();
        }
        while let Some(message) = self.queue.pop_front() {
            self.next_id += 1;
            let active = ActiveMessage::begin(self.next_id, message, now);
            if !active.is_expired(now) {
                self.active.push(active);
            }
        }
        self.active
            .iter()
            .map(|m| VisibleMessage {
                id: m.id,
                text: m.message.text.clone(),
                anchor: m.message.anchor,
                accent: m.message.category.accent(),
                priority: m.message.priority,
                alpha: m.alpha(now),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::overlay::MessageCategory;
    use std::time::Duration;

    fn msg(text: &str, ms: u64) -> OverlayMessage {
        OverlayMessage::text(text).with_duration(Duration::from_millis(ms))
    }

    #[test]
    fn queued_messages_start_together_and_fade_independently() {
        let mut board = MessageBoard::default();
        let t0 = Instant::now();
        board.enqueue(msg("first", 1000));
        board.enqueue(msg("second", 2000));

        let frame = board.advance(t0);
        assert_eq!(frame.iter().map(|v| v.text.as_str()).collect::<Vec<_>>(), ["first", "second"]);
        assert_eq!(board.queued(), 0);

        let frame = board.advance(t0 + Duration::from_millis(900));
        assert!((frame[0].alpha - 0.5).abs() < 1e-3);
        assert_eq!(frame[1].alpha, 1.0);

        let frame = board.advance(t0 + Duration::from_millis(1000));
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].text, "second");

        assert!(board.advance(t0 + Duration::from_millis(2000)).is_empty());
        assert_eq!(board.active(), 0);
    }

    #[test]
    fn disabled_board_keeps_queue() {
        let mut board = MessageBoard::default();
        board.apply(&ControlCommand { enabled: Some(false), ..Default::default() });
        board.enqueue(msg("later", 1000));
        let t0 = Instant::now();
        assert!(board.advance(t0).is_empty());
        assert_eq!(board.queued(), 1);

        board.apply(&ControlCommand { enabled: Some(true), ..Default::default() });
        assert_eq!(board.advance(t0).len(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let mut board = MessageBoard::default();
        board.enqueue(msg("a", 1000));
        board.advance(Instant::now());
        board.enqueue(msg("b", 1000));
        board.apply(&ControlCommand { clear: true, ..Default::default() });
        assert_eq!((board.queued(), board.active()), (0, 0));
    }

    #[test]
    fn queue_is_bounded() {
        let mut board = MessageBoard::default();
        for i in 0..MAX_QUEUED + 3 {
            board.enqueue(msg(&i.to_string(), 1000));
        }
        assert_eq!(board.queued(), MAX_QUEUED);
        assert_eq!(board.advance(Instant::now())[0].text, "3");
    }

    #[test]
    fn visible_carries_style() {
        let mut board = MessageBoard::default();
        board.enqueue(
            msg("tech chase", 1000)
                .with_category(MessageCategory::Technical)
                .with_priority(MessagePriority::Critical)
                .with_anchor(MessageAnchor::BottomCenter),
        );
        let v = &board.advance(Instant::now())[0];
        assert_eq!(v.accent, MessageCategory::Technical.accent());
        assert_eq!(v.priority, MessagePriority::Critical);
        assert_eq!(v.anchor, MessageAnchor::BottomCenter);
        assert_eq!(v.id, 1);
    }

    #[test]
    fn unset_duration_takes_configured_one() {
        let mut board = MessageBoard::default();
        board.apply(&ControlCommand { duration_ms: Some(250), ..Default::default() });
        board.enqueue(OverlayMessage::text("short"));
        let t0 = Instant::now();
        assert_eq!(board.advance(t0).len(), 1);
        assert!(board.advance(t0 + Duration::from_millis(250)).is_empty());
    }

    #[test]
    fn zero_duration_never_shows() {
        let mut board = MessageBoard::default();
        board.enqueue(msg("blink", 0));
        assert!(board.advance(Instant::now()).is_empty());
    }
}
