//! Companion window: a click-through, layered, always-on-top popup that sits over the host's main
//! window and shows the messages when no presentation hook is drawing them.
//!
//! The host window is chosen and followed by the pure logic here; `win32` owns the actual window.

#[cfg(windows)]
mod win32;

#[cfg(windows)]
pub use win32::{Companion, spawn};

use crate::layout::Size;
use crate::painter::Sprite;
use crate::runtime::OverlayRuntime;
use crate::text::GlyphRasterizer;
use shared::channel::Connection;
use shared::geometry::Rect;
use shared::handles::WindowHandle;
use shared::overlay::DisplayMode;
use std::time::{Duration, Instant};

/// How often a missing host window is searched for again.
pub const REDISCOVER_INTERVAL: Duration = Duration::from_secs(1);

/// A window owned by this process that the companion could cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCandidate {
    pub window: WindowHandle,
    /// Client area in screen coordinates.
    pub client: Rect,
    pub visible: bool,
}

/// The largest visible window; ties go to the first seen.
pub fn pick_host(candidates: &[HostCandidate]) -> Option<WindowHandle> {
    let area = |r: &Rect| r.width() as i64 * r.height() as i64;
    candidates
        .iter()
        .filter(|c| c.visible && !c.client.is_empty())
        .fold(None::<&HostCandidate>, |best, c| match best {
            Some(b) if area(&b.client) >= area(&c.client) => Some(b),
            _ => Some(c),
        })
        .map(|c| c.window)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackAction {
    /// Take the window off screen.
    Hide,
    /// Show the window over this screen rectangle.
    Move(Rect),
    /// Nothing changed.
    Keep,
}

/// Follows the host window between ticks.
#[derive(Debug, Default)]
pub struct Tracker {
    host: Option<WindowHandle>,
    shown_at: Option<Rect>,
    last_search: Option<Instant>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(&self) -> Option<WindowHandle> {
        self.host
    }

    /// True when there is no host and the last search is old enough.
    pub fn should_search(&self, now: Instant) -> bool {
        self.host.is_none()
            && self.last_search.is_none_or(|t| now.saturating_duration_since(t) >= REDISCOVER_INTERVAL)
    }

    pub fn searched(&mut self, found: Option<WindowHandle>, now: Instant) {
        self.last_search = Some(now);
        self.host = found;
    }

    /// Drops the host, e.g. after it was destroyed.
    pub fn lose_host(&mut self) {
        self.host = None;
    }

    /// Decides what the window should do given the host's client area (`None` when minimized,
    /// hidden or gone) and whether the companion is the active surface.
    pub fn observe(&mut self, host_client: Option<Rect>, active: bool) -> TrackAction {
        let target = host_client.filter(|r| active && !r.is_empty());
        match (target, self.shown_at) {
            (None, None) => TrackAction::Keep,
            (None, Some(_)) => {
                self.shown_at = None;
                TrackAction::Hide
            }
            (Some(r), Some(shown)) if r == shown => TrackAction::Keep,
            (Some(r), _) => {
                self.shown_at = Some(r);
                TrackAction::Move(r)
            }
        }
    }

    pub fn is_shown(&self) -> bool {
        self.shown_at.is_some()
    }
}

/// What the companion window shows.
pub trait FrameSource: Send + Sync + 'static {
    /// Whether the companion is the surface that should be visible now.
    fn is_active(&self, now: Instant) -> bool;

    /// Sprites for a `viewport`-sized window; `None` skips this tick.
    fn frame(&self, viewport: Size, now: Instant) -> Option<Vec<Sprite>>;
}

impl<C: Connection, R: GlyphRasterizer + 'static> FrameSource for OverlayRuntime<C, R> {
    fn is_active(&self, now: Instant) -> bool {
        self.effective_mode(now) == DisplayMode::Window && self.settings().enabled
    }

    fn frame(&self, viewport: Size, now: Instant) -> Option<Vec<Sprite>> {
        self.render(DisplayMode::Window, viewport, now)
    }
}
