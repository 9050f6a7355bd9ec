//! The controller-side bridge: a `monitor` thread that locates the game, loads the overlay module
//! into it, keeps the channel connected and its window embedded, plus the facade the host UI
//! drives once per frame.

mod monitor;
mod notice;
mod platform;

pub use notice::{BridgeNotice, LostResource};
pub use platform::Platform;
#[cfg(windows)]
pub use platform::Win32Platform;

use crate::config::ConfigManager;
use crate::embedding::EmbeddingManager;
use crate::locator::TargetProcess;
use crate::telemetry::{TelemetryHub, TelemetryPoll};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use monitor::Monitor;
use shared::channel::ChannelEndpoint;
use shared::geometry::Rect;
use shared::handles::WindowHandle;
use shared::overlay::{clamp_transparency, DisplayMode, OverlayMessage, OverlaySettings, Theme};
use shared::protocol::{ControlCommand, OverlayCommand};
use shared::telemetry::{GameEvent, GameState};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound on waiting for the monitor to finish its teardown.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Snapshot of what the bridge currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStatus {
    pub target: Option<TargetProcess>,
    pub injected: bool,
    pub connected: bool,
    pub embedded: Option<WindowHandle>,
}

/// Inputs owned by the host UI.
#[derive(Debug, Clone)]
struct HostView {
    /// Overrides the title lookup of the container window.
    container: Option<WindowHandle>,
    /// Last content rectangle, in container client coordinates.
    area: Option<Rect>,
    settings: OverlaySettings,
}

/// State the monitor thread and the host share. One mutex per independent piece.
pub(crate) struct BridgeShared<P: Platform> {
    platform: P,
    config: Arc<ConfigManager>,
    hub: Arc<TelemetryHub>,
    embedding: Mutex<EmbeddingManager<P::Windows>>,
    channel: Mutex<Option<Arc<ChannelEndpoint<P::Conn>>>>,
    view: Mutex<HostView>,
    notices: Mutex<Vec<Sender<BridgeNotice>>>,
    status: Mutex<BridgeStatus>,
}

impl<P: Platform> BridgeShared<P> {
    fn notify(&self, notice: BridgeNotice) {
        info!("{notice}");
        lock(&self.notices).retain(|tx| tx.send(notice.clone()).is_ok());
    }

    /// Sends outside the channel lock. False while disconnected.
    fn send_command(&self, command: &OverlayCommand) -> bool {
        let endpoint = lock(&self.channel).clone();
        match endpoint {
            Some(ep) => ep.send(&command.to_line()),
            None => false,
        }
    }
}

struct Worker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Facade over the whole controller side. Every method takes `&self` and is safe to call from
/// the host's UI thread once per frame.
pub struct Bridge<P: Platform> {
    shared: Arc<BridgeShared<P>>,
    worker: Mutex<Option<Worker>>,
}

impl<P: Platform> Bridge<P> {
    pub fn new(platform: P, config: Arc<ConfigManager>) -> Self {
        let cfg = config.get();
        let embedding = EmbeddingManager::with_throttle(platform.window_ops(), cfg.embedding.repaint_throttle);
        let shared = BridgeShared {
            platform,
            hub: Arc::new(TelemetryHub::new(cfg.telemetry.event_capacity)),
            embedding: Mutex::new(embedding),
            channel: Mutex::new(None),
            view: Mutex::new(HostView { container: None, area: None, settings: cfg.overlay.to_settings() }),
            notices: Mutex::new(Vec::new()),
            status: Mutex::new(BridgeStatus::default()),
            config,
        };
        Self { shared: Arc::new(shared), worker: Mutex::new(None) }
    }

    /// Spawns the monitor thread. `exe_dir` anchors the overlay module lookup. Starting a running
    /// bridge does nothing.
    pub fn start(&self, exe_dir: PathBuf) -> io::Result<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let monitor = Monitor::new(Arc::clone(&self.shared), exe_dir);
        let handle = thread::Builder::new().name("monitor".into()).spawn(move || {
            monitor.run(&stop_rx);
            let _ = done_tx.send(());
        })?;
        *worker = Some(Worker { stop_tx, done_rx, handle });
        Ok(())
    }

    /// Stops the monitor, which restores windows, ejects the module and closes the channel.
    /// Idempotent. Waits at most `STOP_TIMEOUT` before abandoning the thread.
    pub fn stop(&self) {
        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        let _ = worker.stop_tx.send(());
        match worker.done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
                info!("bridge stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("monitor did not stop within {STOP_TIMEOUT:?}; abandoning it");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    pub fn status(&self) -> BridgeStatus {
        *lock(&self.shared.status)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared.channel).as_ref().is_some_and(|ep| ep.is_connected())
    }

    pub fn subscribe_notices(&self) -> Receiver<BridgeNotice> {
        let (tx, rx) = unbounded();
        lock(&self.shared.notices).push(tx);
        rx
    }

    /// Embeds into `container` instead of the window found by title. `None` goes back to the
    /// title lookup. Takes effect on the next monitor tick.
    pub fn set_container(&self, container: Option<WindowHandle>) {
        lock(&self.shared.view).container = container;
    }

    /// Per-frame host call with the recomputed content rectangle. Also remembered for the next
    /// embedding. True if an embedded window was moved.
    ///
    /// Never waits for the monitor: its window calls may need this thread to pump messages. A
    /// frame that finds it busy is skipped and the monitor applies the remembered area itself.
    pub fn update_position(&self, area: Rect) -> bool {
        lock(&self.shared.view).area = Some(area);
        let mut embedding = match self.shared.embedding.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("embedding busy; position update deferred to the monitor");
                return false;
            }
        };
        let Some(target) = embedding.active() else {
            return false;
        };
        match embedding.update_position(target, area) {
            Ok(()) => true,
            Err(e) => {
                debug!("position update skipped: {e}");
                false
            }
        }
    }

    pub fn hub(&self) -> &Arc<TelemetryHub> {
        &self.shared.hub
    }

    /// Per-frame host call: current state plus the events since the previous poll.
    pub fn poll_telemetry(&self) -> TelemetryPoll {
        self.shared.hub.poll()
    }

    pub fn on_state<F>(&self, f: F)
    where
        F: Fn(&GameState) + Send + Sync + 'static,
    {
        self.shared.hub.on_state(f);
    }

    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&GameEvent) + Send + Sync + 'static,
    {
        self.shared.hub.on_event(f);
    }

    pub fn overlay_settings(&self) -> OverlaySettings {
        lock(&self.shared.view).settings.clone()
    }

    /// Settings are kept either way and sent in full after the next connect. The return value
    /// only says whether this change went out now.
    fn update_settings(&self, apply: ControlCommand) -> bool {
        apply.apply(&mut lock(&self.shared.view).settings);
        self.shared.send_command(&OverlayCommand::Control(apply))
    }

    pub fn set_overlay_enabled(&self, enabled: bool) -> bool {
        self.update_settings(ControlCommand { enabled: Some(enabled), ..ControlCommand::default() })
    }

    /// Clamped to [0,1].
    pub fn set_transparency(&self, value: f32) -> bool {
        let value = clamp_transparency(value);
        self.update_settings(ControlCommand { transparency: Some(value), ..ControlCommand::default() })
    }

    pub fn set_display_duration(&self, duration: Duration) -> bool {
        let duration_ms = Some(duration.as_millis() as u64);
        self.update_settings(ControlCommand { duration_ms, ..ControlCommand::default() })
    }

    pub fn set_theme(&self, theme: Theme) -> bool {
        self.update_settings(ControlCommand { theme: Some(theme), ..ControlCommand::default() })
    }

    pub fn set_display_mode(&self, mode: DisplayMode) -> bool {
        self.update_settings(ControlCommand { display_mode: Some(mode), ..ControlCommand::default() })
    }

    pub fn clear_messages(&self) -> bool {
        self.shared.send_command(&OverlayCommand::Control(ControlCommand { clear: true, ..ControlCommand::default() }))
    }

    /// Fire-and-forget; dropped while disconnected. Without a duration it is shown for the one
    /// set through [`Bridge::set_display_duration`].
    pub fn display_message(&self, message: OverlayMessage) -> bool {
        let duration = lock(&self.shared.view).settings.duration;
        self.shared.send_command(&OverlayCommand::Overlay(message.or_duration(duration)))
    }
}

impl<P: Platform> Drop for Bridge<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::style::{WS_CAPTION, WS_CHILD, WS_THICKFRAME};
    use crate::embedding::{MockWindow, MockWindowOps, Placement};
    use crate::injection::MockLoader;
    use crate::locator::{window, ProcessCandidate, StaticEnumerator, WindowCandidate, WindowEnumerator};
    use shared::channel::memory::{wait_for, MemoryConnection, MemoryConnector, MemoryNetwork};
    use shared::channel::Connection;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    const OVERLAPPED: u32 = 0x10CF_0000;
    const GAME: usize = 0x200;
    const CONTAINER: usize = 0x100;
    const PID: u32 = 42;
    const WAIT: Duration = Duration::from_secs(3);

    #[derive(Clone, Default)]
    struct SharedEnumerator(Arc<Mutex<StaticEnumerator>>);

    impl WindowEnumerator for SharedEnumerator {
        fn windows(&self) -> Vec<WindowCandidate> {
            self.0.lock().unwrap().windows.clone()
        }

        fn processes(&self) -> Vec<ProcessCandidate> {
            self.0.lock().unwrap().processes.clone()
        }
    }

    struct TestPlatform {
        enumerator: SharedEnumerator,
        loader: MockLoader,
        windows: MockWindowOps,
        net: MemoryNetwork,
        container: Arc<Mutex<Option<WindowHandle>>>,
    }

    impl Platform for TestPlatform {
        type Enumerator = SharedEnumerator;
        type Loader = MockLoader;
        type Windows = MockWindowOps;
        type Conn = MemoryConnection;
        type Connector = MemoryConnector;

        fn enumerator(&self) -> SharedEnumerator {
            self.enumerator.clone()
        }

        fn loader(&self) -> MockLoader {
            self.loader.clone()
        }

        fn window_ops(&self) -> MockWindowOps {
            self.windows.clone()
        }

        fn connector(&self, _channel_name: &str) -> MemoryConnector {
            self.net.connector()
        }

        fn find_container(&self, _title: &str) -> Option<WindowHandle> {
            *self.container.lock().unwrap()
        }
    }

    struct Fixture {
        bridge: Bridge<TestPlatform>,
        config: Arc<ConfigManager>,
        enumerator: SharedEnumerator,
        loader: MockLoader,
        windows: MockWindowOps,
        net: MemoryNetwork,
        container: Arc<Mutex<Option<WindowHandle>>>,
        notices: Receiver<BridgeNotice>,
        dir: TempDir,
        game: WindowHandle,
        original: MockWindow,
    }

    impl Fixture {
        fn new(cfg: Config) -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("overlay.dll"), b"MZ").unwrap();

            let enumerator = SharedEnumerator::default();
            {
                let mut e = enumerator.0.lock().unwrap();
                e.windows.push(window(GAME, PID, "Dolphin 5.0 | Melee", "wxWindowNR", 1280, 720));
                e.processes.push(ProcessCandidate { pid: PID, image_name: "Slippi Dolphin.exe".into() });
            }
            let windows = MockWindowOps::default();
            let original = MockWindow::top_level(OVERLAPPED, Rect::from_xywh(100, 100, 1280, 720));
            let game = windows.add(GAME, original);
            let container_handle =
                windows.add(CONTAINER, MockWindow::top_level(OVERLAPPED, Rect::from_xywh(0, 0, 1600, 900)));
            let container = Arc::new(Mutex::new(Some(container_handle)));
            let loader = MockLoader::with_processes(&[PID]);
            let net = MemoryNetwork::new();

            let platform = TestPlatform {
                enumerator: enumerator.clone(),
                loader: loader.clone(),
                windows: windows.clone(),
                net: net.clone(),
                container: Arc::clone(&container),
            };
            let config = Arc::new(ConfigManager::fixed(cfg));
            let bridge = Bridge::new(platform, Arc::clone(&config));
            let notices = bridge.subscribe_notices();
            Self { bridge, config, enumerator, loader, windows, net, container, notices, dir, game, original }
        }

        fn monitor(&self) -> Monitor<TestPlatform> {
            Monitor::new(Arc::clone(&self.bridge.shared), self.dir.path().to_path_buf())
        }

        fn notices(&self) -> Vec<BridgeNotice> {
            self.notices.try_iter().collect()
        }

        /// Ticks until the connector attached and returns the listener side, with the settings
        /// snapshot already read off it.
        fn connect(&self, monitor: &mut Monitor<TestPlatform>) -> MemoryConnection {
            monitor.tick(Instant::now());
            let server = self.net.accept_raw(WAIT).expect("connector never dialed");
            assert!(wait_for(WAIT, || self.bridge.is_connected()));
            monitor.tick(Instant::now());
            let hello = read_frame(&server);
            assert!(hello.starts_with(r#"{"type":"control""#), "{hello}");
            server
        }
    }

    fn read_frame(conn: &MemoryConnection) -> String {
        let mut buf = [0u8; 4096];
        let n = conn.read(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).trim_end().to_string()
    }

    #[test]
    fn locate_inject_connect_embed_and_tear_down() {
        let fx = Fixture::new(Config::default());
        let mut monitor = fx.monitor();
        let server = fx.connect(&mut monitor);

        let status = fx.bridge.status();
        assert_eq!(status.target.map(|t| t.pid), Some(PID));
        assert!(status.injected && status.connected);
        assert_eq!(status.embedded, Some(fx.game));
        assert_eq!(fx.loader.state().loads, vec![(PID, fx.dir.path().join("overlay.dll"))]);

        let embedded = fx.windows.get(fx.game);
        assert_eq!(embedded.parent, WindowHandle::from_raw(CONTAINER));
        assert_eq!(embedded.style & (WS_CAPTION | WS_THICKFRAME), 0);
        assert_ne!(embedded.style & WS_CHILD, 0);

        server.write(b"{\"type\":\"gameState\",\"frame\":120}\n").unwrap();
        assert!(wait_for(WAIT, || fx.bridge.hub().state().frame_count == 120));
        server.write(b"{\"type\":\"event\",\"event\":\"kill\",\"player\":2}\n").unwrap();
        assert!(wait_for(WAIT, || fx.bridge.hub().event_count() == 1));
        let poll = fx.bridge.poll_telemetry();
        assert_eq!(poll.events.len(), 1);
        assert_eq!(poll.events[0].player_id, 2);

        monitor.teardown();
        let restored = fx.windows.get(fx.game);
        assert_eq!(restored.style, fx.original.style);
        assert_eq!(restored.parent, WindowHandle::NULL);
        assert_eq!(restored.rect, fx.original.rect);
        assert_eq!(fx.loader.state().unloads.len(), 1);
        assert!(!fx.bridge.is_connected());
        assert_eq!(fx.bridge.status(), BridgeStatus::default());

        let notices = fx.notices();
        assert!(notices.contains(&BridgeNotice::Injected { pid: PID }));
        assert!(notices.contains(&BridgeNotice::Connected));
        assert!(notices.contains(&BridgeNotice::Embedded { container: WindowHandle::from_raw(CONTAINER), target: fx.game }));
        assert_eq!(notices.last(), Some(&BridgeNotice::Disconnected));
    }

    #[test]
    fn failed_injection_waits_for_cooldown() {
        let fx = Fixture::new(Config::default());
        fx.loader.state().fail_load = Some("remote-thread-create");
        let mut monitor = fx.monitor();
        let t0 = Instant::now();

        monitor.tick(t0);
        assert!(fx.notices().iter().any(|n| matches!(
            n,
            BridgeNotice::InjectionFailed { pid: PID, stage: "remote-thread-create", .. }
        )));
        assert!(!fx.bridge.status().injected);
        assert_eq!(fx.net.attempts(), 0);

        monitor.tick(t0 + Duration::from_secs(1));
        assert!(fx.notices().is_empty());

        monitor.tick(t0 + Duration::from_secs(6));
        assert!(fx.bridge.status().injected);
        assert!(fx.notices().contains(&BridgeNotice::Injected { pid: PID }));
    }

    #[test]
    fn missing_module_is_an_injection_failure() {
        let fx = Fixture::new(Config::default());
        fs::remove_file(fx.dir.path().join("overlay.dll")).unwrap();
        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        assert!(fx.notices().iter().any(|n| matches!(n, BridgeNotice::InjectionFailed { stage: "module-path", .. })));
        assert!(fx.loader.state().loads.is_empty());
    }

    #[test]
    fn process_exit_restores_and_returns_to_discovery() {
        let fx = Fixture::new(Config::default());
        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        assert!(fx.bridge.status().embedded.is_some());
        fx.notices();

        {
            let mut e = fx.enumerator.0.lock().unwrap();
            e.windows.clear();
            e.processes.clear();
        }
        fx.loader.kill(PID);
        fx.windows.destroy(fx.game);
        fx.bridge.hub().ingest_line(r#"{"type":"gameState","frame":5}"#);

        monitor.tick(Instant::now());
        let notices = fx.notices();
        assert!(notices.contains(&BridgeNotice::Lost(LostResource::TargetWindow(fx.game))));
        assert!(notices.contains(&BridgeNotice::Lost(LostResource::TargetProcess(PID))));
        assert_eq!(fx.bridge.status().target, None);
        assert!(fx.loader.state().open.is_empty());
        assert_eq!(fx.bridge.hub().state(), GameState::default());
    }

    #[test]
    fn lost_container_restores_then_re_embeds() {
        let fx = Fixture::new(Config::default());
        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        fx.notices();

        fx.windows.destroy(WindowHandle::from_raw(CONTAINER));
        *fx.container.lock().unwrap() = None;
        monitor.tick(Instant::now());
        assert!(fx.notices().contains(&BridgeNotice::Lost(LostResource::ContainerWindow(WindowHandle::from_raw(CONTAINER)))));
        assert_eq!(fx.windows.get(fx.game).style, fx.original.style);
        assert_eq!(fx.bridge.status().embedded, None);

        let replacement = fx.windows.add(0x300, MockWindow::top_level(OVERLAPPED, Rect::from_xywh(0, 0, 800, 600)));
        *fx.container.lock().unwrap() = Some(replacement);
        monitor.tick(Instant::now());
        assert_eq!(fx.windows.get(fx.game).parent, replacement);
    }

    #[test]
    fn host_container_and_area_are_applied() {
        let fx = Fixture::new(Config::default());
        let host = fx.windows.add(0x400, MockWindow::top_level(OVERLAPPED, Rect::from_xywh(0, 0, 1920, 1080)));
        fx.bridge.set_container(Some(host));
        assert!(!fx.bridge.update_position(Rect::from_xywh(10, 20, 640, 480)));

        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        assert_eq!(fx.windows.get(fx.game).parent, host);
        assert_eq!(fx.windows.get(fx.game).rect, Rect::from_xywh(10, 20, 640, 480));

        let area = Rect::from_xywh(0, 40, 1280, 720);
        assert!(fx.bridge.update_position(area));
        let last = fx.windows.desktop().bounds_calls.last().copied();
        assert_eq!(last, Some((fx.game, area, Placement::Embedded)));
    }

    #[test]
    fn position_update_does_not_wait_for_the_monitor() {
        let fx = Fixture::new(Config::default());
        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        assert!(fx.bridge.status().embedded.is_some());

        let area = Rect::from_xywh(0, 60, 960, 540);
        let (held_tx, held_rx) = bounded::<()>(0);
        let (release_tx, release_rx) = bounded::<()>(0);
        thread::scope(|s| {
            s.spawn(|| {
                let _busy = lock(&fx.bridge.shared.embedding);
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            });
            held_rx.recv().unwrap();
            assert!(!fx.bridge.update_position(area));
            release_tx.send(()).unwrap();
        });
        assert_ne!(fx.windows.get(fx.game).rect, area);

        monitor.tick(Instant::now());
        assert_eq!(fx.windows.get(fx.game).rect, area);
    }

    #[test]
    fn switching_container_moves_the_window() {
        let fx = Fixture::new(Config::default());
        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        assert_eq!(fx.windows.get(fx.game).parent, WindowHandle::from_raw(CONTAINER));

        let other = fx.windows.add(0x500, MockWindow::top_level(OVERLAPPED, Rect::from_xywh(0, 0, 1024, 768)));
        fx.bridge.set_container(Some(other));
        monitor.tick(Instant::now());
        assert_eq!(fx.windows.get(fx.game).parent, other);
    }

    #[test]
    fn process_without_window_is_injected_but_not_embedded() {
        let fx = Fixture::new(Config::default());
        fx.enumerator.0.lock().unwrap().windows.clear();
        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        let status = fx.bridge.status();
        assert_eq!(status.target, Some(TargetProcess { pid: PID, window: None }));
        assert!(status.injected);
        assert_eq!(status.embedded, None);
    }

    #[test]
    fn overlay_controls_are_stored_and_forwarded() {
        let fx = Fixture::new(Config::default());
        assert!(!fx.bridge.set_overlay_enabled(false));
        assert!(!fx.bridge.overlay_settings().enabled);

        let mut monitor = fx.monitor();
        let server = fx.connect(&mut monitor);

        assert!(fx.bridge.set_transparency(4.0));
        assert_eq!(read_frame(&server), r#"{"type":"control","transparency":1.0}"#);
        assert_eq!(fx.bridge.overlay_settings().transparency(), 1.0);

        assert!(fx.bridge.set_theme(Theme::Slippi));
        assert_eq!(read_frame(&server), r#"{"type":"control","theme":"slippi"}"#);

        assert!(fx.bridge.clear_messages());
        assert_eq!(read_frame(&server), r#"{"type":"control","clear":true}"#);

        assert!(fx.bridge.display_message(OverlayMessage::text("Nice edgeguard")));
        let line = read_frame(&server);
        assert!(line.starts_with(r#"{"type":"overlay""#) && line.contains("Nice edgeguard"), "{line}");
        assert!(line.contains(r#""durationMs":5000"#), "{line}");

        fx.bridge.set_display_duration(Duration::from_millis(1200));
        read_frame(&server);
        assert!(fx.bridge.display_message(OverlayMessage::text("Ledge dash")));
        assert!(read_frame(&server).contains(r#""durationMs":1200"#));
        assert!(fx.bridge.display_message(OverlayMessage::text("Own").with_duration(Duration::from_millis(90))));
        assert!(read_frame(&server).contains(r#""durationMs":90"#));
    }

    #[test]
    fn settings_snapshot_follows_host_changes() {
        let fx = Fixture::new(Config::default());
        fx.bridge.set_overlay_enabled(false);
        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        let server = fx.net.accept_raw(WAIT).unwrap();
        assert!(wait_for(WAIT, || fx.bridge.is_connected()));
        monitor.tick(Instant::now());
        let hello = read_frame(&server);
        assert!(hello.contains(r#""enabled":false"#), "{hello}");
    }

    #[test]
    fn config_reload_pushes_overlay_changes() {
        let fx = Fixture::new(Config::default());
        let mut monitor = fx.monitor();
        let server = fx.connect(&mut monitor);

        let mut cfg = fx.config.get();
        cfg.overlay.transparency = 0.3;
        fx.config.set(cfg);
        monitor.tick(Instant::now());
        let line = read_frame(&server);
        assert!(line.contains(r#""transparency":0.3"#), "{line}");
        assert_eq!(fx.bridge.overlay_settings().transparency(), 0.3);
    }

    #[test]
    fn disabled_embedding_restores() {
        let fx = Fixture::new(Config::default());
        let mut monitor = fx.monitor();
        monitor.tick(Instant::now());
        assert!(fx.bridge.status().embedded.is_some());

        let mut cfg = fx.config.get();
        cfg.embedding.enabled = false;
        fx.config.set(cfg);
        monitor.tick(Instant::now());
        assert_eq!(fx.bridge.status().embedded, None);
        assert_eq!(fx.windows.get(fx.game).parent, WindowHandle::NULL);
    }

    #[test]
    fn start_and_stop_on_a_thread() {
        let mut cfg = Config::default();
        cfg.embedding.poll_interval = Duration::from_millis(20);
        let fx = Fixture::new(cfg);

        fx.bridge.start(fx.dir.path().to_path_buf()).unwrap();
        fx.bridge.start(fx.dir.path().to_path_buf()).unwrap();
        assert!(fx.bridge.is_running());
        assert!(wait_for(WAIT, || fx.bridge.status().embedded == Some(fx.game)));

        fx.bridge.stop();
        fx.bridge.stop();
        assert!(!fx.bridge.is_running());
        assert_eq!(fx.windows.get(fx.game).parent, WindowHandle::NULL);
        assert_eq!(fx.loader.state().unloads.len(), 1);
    }
}
