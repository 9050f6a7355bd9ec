//! The module's process-wide state: message board, painter, channel listener, telemetry relay and
//! installed presentation hooks.
//!
//! Frame-time entry points ([`OverlayRuntime::render`], [`OverlayRuntime::note_present`]) run on the
//! host's render thread and never wait: the board lock is held only to copy the frame's messages
//! out, and a busy painter skips the frame.

use crate::board::{MessageBoard, VisibleMessage};
use crate::hooks::{Backend, PresentationHook};
use crate::layout::Size;
use crate::painter::{Painter, Sprite};
use crate::relay::TelemetryRelay;
use crate::text::GlyphRasterizer;
use log::{debug, info, warn};
use shared::channel::{Acceptor, ChannelEndpoint, ChannelOptions, Connection, MessageHandler};
use shared::errors::{ChannelError, HookError};
use shared::overlay::{DisplayMode, OverlayMessage, OverlaySettings};
use shared::protocol::OverlayCommand;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

/// Without a presented frame for this long the hook is considered idle and the companion window
/// takes over.
pub const PRESENT_STALE_AFTER: Duration = Duration::from_secs(1);

/// Reader join bound when the module unloads; the loader lock is usually held at that point.
pub const UNLOAD_JOIN_TIMEOUT: Duration = Duration::from_millis(200);

type ShutdownHook = Box<dyn FnOnce() + Send>;

struct InstalledHook {
    backend: Backend,
    hook: Box<dyn PresentationHook>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct OverlayRuntime<C: Connection, R> {
    board: Mutex<MessageBoard>,
    painter: Mutex<Painter<R>>,
    relay: TelemetryRelay,
    channel: Mutex<Option<Arc<ChannelEndpoint<C>>>>,
    hooks: Mutex<Vec<InstalledHook>>,
    on_shutdown: Mutex<Vec<ShutdownHook>>,
    epoch: Instant,
    /// Milliseconds since `epoch` of the last hooked present, plus one; zero for never.
    last_present: AtomicU64,
}

impl<C: Connection, R: GlyphRasterizer> OverlayRuntime<C, R> {
    pub fn new(settings: OverlaySettings, rasterizer: R) -> Self {
        Self {
            board: Mutex::new(MessageBoard::new(settings)),
            painter: Mutex::new(Painter::new(rasterizer)),
            relay: TelemetryRelay::new(),
            channel: Mutex::new(None),
            hooks: Mutex::new(Vec::new()),
            on_shutdown: Mutex::new(Vec::new()),
            epoch: Instant::now(),
            last_present: AtomicU64::new(0),
        }
    }

    /// Starts accepting the controller on `name`. Every received line goes through
    /// [`OverlayRuntime::handle_line`].
    pub fn listen<A>(self: &Arc<Self>, name: &str, acceptor: A) -> Result<(), ChannelError>
    where
        A: Acceptor<Conn = C>,
        R: 'static,
    {
        let weak = Arc::downgrade(self);
        let handler: MessageHandler = Arc::new(move |line: &str| {
            if let Some(rt) = weak.upgrade() {
                rt.handle_line(line);
            }
        });
        let options = ChannelOptions { join_timeout: UNLOAD_JOIN_TIMEOUT, ..ChannelOptions::default() };
        let endpoint = ChannelEndpoint::listen(name, acceptor, options, handler)?;
        info!("listening on channel `{name}`");
        let previous = lock(&self.channel).replace(Arc::new(endpoint));
        if let Some(previous) = previous {
            debug!("replacing listener `{}`", previous.name());
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.channel).as_ref().is_some_and(|ep| ep.is_connected())
    }

    /// Applies one controller line: a control command, a structured message, or plain text. Messages
    /// without a duration are shown for the configured one.
    pub fn handle_line(&self, line: &str) {
        let Some(command) = OverlayCommand::parse(line) else {
            debug!("ignoring line `{}`", line.trim());
            return;
        };
        let mut board = lock(&self.board);
        match command {
            OverlayCommand::Control(control) => {
                board.apply(&control);
                debug!("settings now {:?}", board.settings());
            }
            OverlayCommand::Overlay(message) => board.enqueue(message),
        }
    }

    pub fn display(&self, message: OverlayMessage) {
        lock(&self.board).enqueue(message);
    }

    /// Plain text for `duration`, or for the configured duration when `None`.
    pub fn display_text(&self, text: &str, duration: Option<Duration>) {
        let mut message = OverlayMessage::text(text);
        message.duration = duration;
        lock(&self.board).enqueue(message);
    }

    pub fn clear(&self) {
        lock(&self.board).clear();
    }

    pub fn settings(&self) -> OverlaySettings {
        lock(&self.board).settings().clone()
    }

    /// Listening and enabled.
    pub fn is_ready(&self) -> bool {
        lock(&self.channel).is_some() && lock(&self.board).settings().enabled
    }

    /// Forwards one telemetry line to the controller. False when it is not telemetry, repeats the
    /// last state frame, or nobody is connected.
    pub fn publish_telemetry(&self, raw: &str) -> bool {
        let Some(line) = self.relay.prepare(raw) else {
            return false;
        };
        let endpoint = lock(&self.channel).clone();
        let sent = endpoint.is_some_and(|ep| ep.send(&line));
        if sent {
            self.relay.record_sent();
        } else {
            // Let the next state frame through once a controller is back.
            self.relay.reset();
        }
        sent
    }

    pub fn relay(&self) -> &TelemetryRelay {
        &self.relay
    }

    pub fn attach_hook(&self, backend: Backend, hook: Box<dyn PresentationHook>) {
        info!("{backend} presentation hook attached");
        lock(&self.hooks).push(InstalledHook { backend, hook });
    }

    pub fn hooked_backends(&self) -> Vec<Backend> {
        lock(&self.hooks).iter().map(|h| h.backend).collect()
    }

    /// Uninstalls every hook, newest first. Failures are logged and the hook is dropped anyway.
    pub fn detach_hooks(&self) -> Vec<(Backend, HookError)> {
        let hooks: Vec<InstalledHook> = lock(&self.hooks).drain(..).collect();
        let mut failures = Vec::new();
        for mut installed in hooks.into_iter().rev() {
            match unsafe { installed.hook.uninstall() } {
                Ok(()) => info!("{} presentation hook removed", installed.backend),
                Err(e) => {
                    warn!("removing {} presentation hook failed: {e}", installed.backend);
                    failures.push((installed.backend, e));
                }
            }
        }
        failures
    }

    /// Records a frame seen by a presentation hook.
    pub fn note_present(&self, now: Instant) {
        let ms = now.saturating_duration_since(self.epoch).as_millis() as u64;
        self.last_present.store(ms + 1, Ordering::Relaxed);
    }

    /// Where messages go right now. `Hook` is honored only while a hook is attached and saw a
    /// frame recently; otherwise the companion window draws.
    pub fn effective_mode(&self, now: Instant) -> DisplayMode {
        if lock(&self.board).settings().display_mode == DisplayMode::Window {
            return DisplayMode::Window;
        }
        if lock(&self.hooks).is_empty() {
            return DisplayMode::Window;
        }
        match self.last_present.load(Ordering::Relaxed) {
            0 => DisplayMode::Window,
            stamp => {
                let seen = self.epoch + Duration::from_millis(stamp - 1);
                if now.saturating_duration_since(seen) <= PRESENT_STALE_AFTER {
                    DisplayMode::Hook
                } else {
                    DisplayMode::Window
                }
            }
        }
    }

    /// Advances the board and paints this frame's sprites for a `viewport`-sized surface, if
    /// `surface` is the current display mode. `None` means "draw nothing, not even a clear":
    /// another surface owns the messages, or the painter is busy.
    pub fn render(&self, surface: DisplayMode, viewport: Size, now: Instant) -> Option<Vec<Sprite>> {
        if self.effective_mode(now) != surface {
            return None;
        }
        let (visible, settings): (Vec<VisibleMessage>, OverlaySettings) = {
            let mut board = lock(&self.board);
            (board.advance(now), board.settings().clone())
        };
        let mut painter = match self.painter.try_lock() {
            Ok(p) => p,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(painter.paint(&visible, &settings, viewport))
    }

    /// Runs `f` once during [`OverlayRuntime::shutdown`], after the hooks are gone.
    pub fn on_shutdown(&self, f: impl FnOnce() + Send + 'static) {
        lock(&self.on_shutdown).push(Box::new(f));
    }

    /// Removes hooks, stops helpers and closes the listener. Idempotent.
    pub fn shutdown(&self) {
        self.detach_hooks();
        let callbacks: Vec<ShutdownHook> = lock(&self.on_shutdown).drain(..).collect();
        for f in callbacks {
            f();
        }
        // Dropping the last reference closes the endpoint and joins its reader.
        let endpoint = lock(&self.channel).take();
        drop(endpoint);
    }
}
