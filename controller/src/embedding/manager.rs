use super::style::{embedded_ex_style, embedded_style};
use super::{Placement, WindowOps};
use log::{debug, info, warn};
use shared::constants::REPAINT_THROTTLE;
use shared::errors::{EmbedError, WindowRole};
use shared::geometry::Rect;
use shared::handles::WindowHandle;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingState {
    Detached,
    Embedding,
    Embedded,
    Restoring,
}

/// Everything `restore` puts back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub parent: WindowHandle,
    pub style: u32,
    pub ex_style: u32,
    pub rect: Rect,
    pub maximized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingRecord {
    pub target: WindowHandle,
    pub container: WindowHandle,
    pub original: WindowSnapshot,
}

/// An embedding dropped because one of its windows died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostWindow {
    pub target: WindowHandle,
    pub container: WindowHandle,
    /// Which of the two died.
    pub role: WindowRole,
}

/// Rate limit for synchronized repaints.
#[derive(Debug, Clone)]
pub struct RefreshThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl RefreshThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// True at most once per interval; a true answer starts the next interval.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Tracks every live embedding and owns the saved state needed to undo it. Dropping the manager
/// restores whatever is still embedded.
pub struct EmbeddingManager<W: WindowOps> {
    ops: W,
    records: HashMap<WindowHandle, EmbeddingRecord>,
    phases: HashMap<WindowHandle, EmbeddingState>,
    throttle: RefreshThrottle,
}

impl<W: WindowOps> EmbeddingManager<W> {
    pub fn new(ops: W) -> Self {
        Self::with_throttle(ops, REPAINT_THROTTLE)
    }

    pub fn with_throttle(ops: W, repaint_interval: Duration) -> Self {
        Self {
            ops,
            records: HashMap::new(),
            phases: HashMap::new(),
            throttle: RefreshThrottle::new(repaint_interval),
        }
    }

    pub fn ops(&self) -> &W {
        &self.ops
    }

    pub fn set_repaint_interval(&mut self, interval: Duration) {
        self.throttle.set_interval(interval);
    }

    pub fn state(&self, target: WindowHandle) -> EmbeddingState {
        self.phases.get(&target).copied().unwrap_or(EmbeddingState::Detached)
    }

    pub fn is_embedded(&self, target: WindowHandle) -> bool {
        self.records.contains_key(&target)
    }

    pub fn record(&self, target: WindowHandle) -> Option<&EmbeddingRecord> {
        self.records.get(&target)
    }

    /// Some embedded target, if any. At most one embedding is active in practice.
    pub fn active(&self) -> Option<WindowHandle> {
        self.records.keys().next().copied()
    }

    fn enter(&mut self, target: WindowHandle, state: EmbeddingState) {
        debug!("{target:?}: {:?} -> {state:?}", self.state(target));
        if state == EmbeddingState::Detached {
            self.phases.remove(&target);
        } else {
            self.phases.insert(target, state);
        }
    }

    fn check_live(&self, window: WindowHandle, role: WindowRole) -> Result<(), EmbedError> {
        if window.is_null() || !self.ops.is_window(window) {
            return Err(EmbedError::InvalidWindow { role, handle: window });
        }
        Ok(())
    }

    fn snapshot(&self, target: WindowHandle) -> WindowSnapshot {
        WindowSnapshot {
            parent: self.ops.parent(target),
            style: self.ops.style(target),
            ex_style: self.ops.ex_style(target),
            rect: self.ops.window_rect(target).unwrap_or_default(),
            maximized: self.ops.is_maximized(target),
        }
    }

    /// Container client area in its own coordinates.
    fn fill_rect(&self, container: WindowHandle) -> Option<Rect> {
        self.ops
            .client_rect(container)
            .map(|c| Rect::from_xywh(0, 0, c.width(), c.height()))
            .filter(|r| !r.is_empty())
    }

    /// Child first so the container's own chrome draws on top.
    fn sync_repaint(&self, target: WindowHandle, container: WindowHandle) {
        self.ops.repaint(target);
        self.ops.repaint(container);
    }

    /// Reparents `target` under `container`, strips its decorations and stretches it over the
    /// container's client area. Already-embedded targets succeed immediately. Only a rejected
    /// reparent fails; later steps are best-effort and only logged.
    pub fn embed(&mut self, container: WindowHandle, target: WindowHandle) -> Result<(), EmbedError> {
        self.check_live(target, WindowRole::Target)?;
        self.check_live(container, WindowRole::Container)?;
        if self.records.contains_key(&target) {
            debug!("{target:?} already embedded");
            return Ok(());
        }

        self.enter(target, EmbeddingState::Embedding);
        let original = self.snapshot(target);

        if let Err(reason) = self.ops.set_parent(target, container) {
            warn!("reparent of {target:?} under {container:?} rejected: {reason}");
            self.enter(target, EmbeddingState::Detached);
            return Err(EmbedError::Reparent { target, reason });
        }

        if let Err(e) = self.ops.set_style(target, embedded_style(original.style)) {
            warn!("style update of {target:?} failed: {e}");
        }
        if let Err(e) = self.ops.set_ex_style(target, embedded_ex_style(original.ex_style)) {
            warn!("extended style update of {target:?} failed: {e}");
        }
        match self.fill_rect(container) {
            Some(fill) => {
                if let Err(e) = self.ops.set_bounds(target, fill, Placement::Embedded) {
                    warn!("initial sizing of {target:?} failed: {e}");
                }
            }
            None => warn!("container {container:?} has no client area yet"),
        }
        self.sync_repaint(target, container);
        self.throttle.mark(Instant::now());

        self.records.insert(target, EmbeddingRecord { target, container, original });
        self.enter(target, EmbeddingState::Embedded);
        info!("embedded {target:?} into {container:?}");
        Ok(())
    }

    pub fn update_position(&mut self, target: WindowHandle, area: Rect) -> Result<(), EmbedError> {
        self.update_position_at(target, area, Instant::now())
    }

    /// Moves the embedded target over `area` (container client coordinates). Resizing happens on
    /// every call; the synchronized repaint is throttled. An empty area leaves the window alone.
    pub fn update_position_at(&mut self, target: WindowHandle, area: Rect, now: Instant) -> Result<(), EmbedError> {
        self.check_live(target, WindowRole::Target)?;
        let container = self.records.get(&target).ok_or(EmbedError::NotEmbedded(target))?.container;
        self.check_live(container, WindowRole::Container)?;
        if area.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.ops.set_bounds(target, area, Placement::Embedded) {
            warn!("repositioning {target:?} failed: {e}");
        }
        if self.throttle.ready(now) {
            self.sync_repaint(target, container);
        }
        Ok(())
    }

    /// Puts parent, style, extended style, bounds and maximize state back, in that order, and
    /// deletes the record. A dead target only loses its record.
    pub fn restore(&mut self, target: WindowHandle) -> Result<(), EmbedError> {
        let record = *self.records.get(&target).ok_or(EmbedError::NotEmbedded(target))?;
        if let Err(e) = self.check_live(target, WindowRole::Target) {
            self.records.remove(&target);
            self.enter(target, EmbeddingState::Detached);
            return Err(e);
        }

        self.enter(target, EmbeddingState::Restoring);
        let saved = record.original;
        if let Err(e) = self.ops.set_parent(target, saved.parent) {
            warn!("restoring parent of {target:?} failed: {e}");
        }
        if let Err(e) = self.ops.set_style(target, saved.style) {
            warn!("restoring style of {target:?} failed: {e}");
        }
        if let Err(e) = self.ops.set_ex_style(target, saved.ex_style) {
            warn!("restoring extended style of {target:?} failed: {e}");
        }
        if let Err(e) = self.ops.set_bounds(target, saved.rect, Placement::Restored) {
            warn!("restoring bounds of {target:?} failed: {e}");
        }
        if saved.maximized {
            if let Err(e) = self.ops.maximize(target) {
                warn!("re-maximizing {target:?} failed: {e}");
            }
        }

        self.records.remove(&target);
        self.enter(target, EmbeddingState::Detached);
        info!("restored {target:?}");
        Ok(())
    }

    pub fn restore_all(&mut self) {
        let targets: Vec<WindowHandle> = self.records.keys().copied().collect();
        for target in targets {
            if let Err(e) = self.restore(target) {
                warn!("restore of {target:?} skipped: {e}");
            }
        }
    }

    /// Drops every embedding whose target or container died. A dead container gets a best-effort
    /// restore of its target; a dead target has nothing left to restore.
    pub fn check_windows(&mut self) -> Vec<LostWindow> {
        let records: Vec<EmbeddingRecord> = self.records.values().copied().collect();
        let mut lost = Vec::new();
        for record in records {
            let target = record.target;
            if !self.ops.is_window(target) {
                warn!("embedded window {target:?} disappeared");
                self.records.remove(&target);
                self.enter(target, EmbeddingState::Detached);
                lost.push(LostWindow { target, container: record.container, role: WindowRole::Target });
            } else if !self.ops.is_window(record.container) {
                warn!("container {:?} of {target:?} disappeared", record.container);
                if let Err(e) = self.restore(target) {
                    warn!("restoring {target:?} after losing its container failed: {e}");
                }
                lost.push(LostWindow { target, container: record.container, role: WindowRole::Container });
            }
        }
        lost
    }
}

impl<W: WindowOps> Drop for EmbeddingManager<W> {
    fn drop(&mut self) {
        self.restore_all();
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockWindow, MockWindowOps};
    use super::*;
    use crate::embedding::style::{WS_BORDER, WS_CAPTION, WS_CHILD, WS_CLIPSIBLINGS, WS_THICKFRAME};

    const OVERLAPPED: u32 = 0x10CF_0000;
    const CONTAINER: usize = 0x100;
    const GAME: usize = 0x200;

    fn setup() -> (MockWindowOps, EmbeddingManager<MockWindowOps>, WindowHandle, WindowHandle) {
        let ops = MockWindowOps::default();
        let container = ops.add(CONTAINER, MockWindow::top_level(OVERLAPPED, Rect::from_xywh(0, 0, 1600, 900)));
        let game = ops.add(GAME, MockWindow::top_level(OVERLAPPED, Rect::from_xywh(200, 150, 1280, 720)));
        let mgr = EmbeddingManager::with_throttle(ops.clone(), Duration::from_secs(2));
        (ops, mgr, container, game)
    }

    #[test]
    fn embed_reparents_strips_and_fills() {
        let (ops, mut mgr, container, game) = setup();
        mgr.embed(container, game).unwrap();

        let w = ops.get(game);
        assert_eq!(w.parent, container);
        assert_eq!(w.style & (WS_CAPTION | WS_BORDER | WS_THICKFRAME), 0);
        assert_eq!(w.style & (WS_CHILD | WS_CLIPSIBLINGS), WS_CHILD | WS_CLIPSIBLINGS);
        assert_eq!(w.ex_style, 0);
        assert_eq!(w.rect, Rect::from_xywh(0, 0, 1600, 900));
        assert_eq!(mgr.state(game), EmbeddingState::Embedded);
        assert_eq!(ops.desktop().repaints, vec![game, container]);
    }

    #[test]
    fn embed_twice_keeps_first_snapshot() {
        let (ops, mut mgr, container, game) = setup();
        mgr.embed(container, game).unwrap();
        let first = *mgr.record(game).unwrap();
        let calls = ops.desktop().bounds_calls.len();

        mgr.embed(container, game).unwrap();
        assert_eq!(*mgr.record(game).unwrap(), first);
        assert_eq!(ops.desktop().bounds_calls.len(), calls);
    }

    #[test]
    fn restore_reproduces_original_exactly() {
        let (ops, mut mgr, container, game) = setup();
        let before = ops.get(game);
        mgr.embed(container, game).unwrap();
        mgr.update_position(game, Rect::from_xywh(10, 40, 800, 450)).unwrap();

        mgr.restore(game).unwrap();
        let after = ops.get(game);
        assert_eq!(after.parent, before.parent);
        assert_eq!(after.style, before.style);
        assert_eq!(after.ex_style, before.ex_style);
        assert_eq!(after.rect, before.rect);
        assert_eq!(after.maximized, before.maximized);
        assert_eq!(mgr.state(game), EmbeddingState::Detached);
        assert!(mgr.record(game).is_none());
    }

    #[test]
    fn restore_remaximizes_last() {
        let (ops, mut mgr, container, game) = setup();
        ops.desktop().windows.get_mut(&game).unwrap().maximized = true;
        mgr.embed(container, game).unwrap();
        assert!(!ops.get(game).maximized);

        mgr.restore(game).unwrap();
        assert!(ops.get(game).maximized);
        let last = *ops.desktop().bounds_calls.last().unwrap();
        assert_eq!(last, (game, Rect::from_xywh(200, 150, 1280, 720), Placement::Restored));
    }

    #[test]
    fn rejected_reparent_aborts_before_styles() {
        let (ops, mut mgr, container, game) = setup();
        let before = ops.get(game);
        ops.desktop().deny_reparent = true;

        let err = mgr.embed(container, game).unwrap_err();
        assert!(matches!(err, EmbedError::Reparent { .. }));
        assert_eq!(ops.get(game), before);
        assert_eq!(mgr.state(game), EmbeddingState::Detached);
        assert!(!mgr.is_embedded(game));
    }

    #[test]
    fn style_failure_is_tolerated() {
        let (ops, mut mgr, container, game) = setup();
        ops.desktop().fail_style = true;
        mgr.embed(container, game).unwrap();
        assert!(mgr.is_embedded(game));
        assert_eq!(ops.get(game).parent, container);
    }

    #[test]
    fn dead_windows_fail_without_side_effects() {
        let (ops, mut mgr, container, game) = setup();
        let dead = WindowHandle::from_raw(0xdead);

        assert_eq!(
            mgr.embed(container, dead),
            Err(EmbedError::InvalidWindow { role: WindowRole::Target, handle: dead })
        );
        assert_eq!(
            mgr.embed(dead, game),
            Err(EmbedError::InvalidWindow { role: WindowRole::Container, handle: dead })
        );
        assert!(matches!(
            mgr.update_position(dead, Rect::from_xywh(0, 0, 10, 10)),
            Err(EmbedError::InvalidWindow { role: WindowRole::Target, .. })
        ));
        assert_eq!(mgr.restore(dead), Err(EmbedError::NotEmbedded(dead)));
        assert!(ops.desktop().bounds_calls.is_empty());
        assert_eq!(ops.get(game).parent, WindowHandle::NULL);
    }

    #[test]
    fn update_requires_embedding() {
        let (_ops, mut mgr, _container, game) = setup();
        assert_eq!(
            mgr.update_position(game, Rect::from_xywh(0, 0, 10, 10)),
            Err(EmbedError::NotEmbedded(game))
        );
    }

    #[test]
    fn update_resizes_every_call_but_throttles_repaint() {
        let (ops, mut mgr, container, game) = setup();
        mgr.embed(container, game).unwrap();
        ops.desktop().repaints.clear();

        let t0 = Instant::now() + Duration::from_secs(10);
        for (i, offset) in [0u64, 500, 1000, 1500].iter().enumerate() {
            let area = Rect::from_xywh(i as i32, 0, 640, 480);
            mgr.update_position_at(game, area, t0 + Duration::from_millis(*offset)).unwrap();
            assert_eq!(ops.get(game).rect, area);
        }
        assert_eq!(ops.desktop().repaints, vec![game, container]);

        mgr.update_position_at(game, Rect::from_xywh(0, 0, 640, 480), t0 + Duration::from_millis(2100)).unwrap();
        assert_eq!(ops.desktop().repaints.len(), 4);
    }

    #[test]
    fn empty_area_is_ignored() {
        let (ops, mut mgr, container, game) = setup();
        mgr.embed(container, game).unwrap();
        let rect = ops.get(game).rect;
        mgr.update_position(game, Rect::default()).unwrap();
        assert_eq!(ops.get(game).rect, rect);
    }

    #[test]
    fn lost_container_restores_target() {
        let (ops, mut mgr, container, game) = setup();
        let before = ops.get(game);
        mgr.embed(container, game).unwrap();
        ops.destroy(container);

        assert_eq!(mgr.check_windows(), vec![LostWindow { target: game, container, role: WindowRole::Container }]);
        assert_eq!(ops.get(game).style, before.style);
        assert_eq!(ops.get(game).parent, WindowHandle::NULL);
        assert!(!mgr.is_embedded(game));
    }

    #[test]
    fn lost_container_with_rejected_restore_still_drops_record() {
        let (ops, mut mgr, container, game) = setup();
        mgr.embed(container, game).unwrap();
        ops.destroy(container);
        ops.desktop().deny_reparent = true;

        assert_eq!(mgr.check_windows(), vec![LostWindow { target: game, container, role: WindowRole::Container }]);
        assert!(!mgr.is_embedded(game));
        assert_eq!(mgr.state(game), EmbeddingState::Detached);
        assert!(mgr.check_windows().is_empty());
    }

    #[test]
    fn lost_target_drops_record() {
        let (ops, mut mgr, container, game) = setup();
        mgr.embed(container, game).unwrap();
        ops.destroy(game);

        assert_eq!(mgr.check_windows(), vec![LostWindow { target: game, container, role: WindowRole::Target }]);
        assert_eq!(mgr.state(game), EmbeddingState::Detached);
        assert!(mgr.check_windows().is_empty());
    }

    #[test]
    fn drop_restores_everything() {
        let (ops, mut mgr, container, game) = setup();
        let before = ops.get(game);
        mgr.embed(container, game).unwrap();
        drop(mgr);
        assert_eq!(ops.get(game), before);
    }

    #[test]
    fn throttle_spacing() {
        let mut t = RefreshThrottle::new(Duration::from_secs(2));
        let now = Instant::now();
        assert!(t.ready(now));
        assert!(!t.ready(now + Duration::from_millis(1999)));
        assert!(t.ready(now + Duration::from_secs(2)));
    }
}
