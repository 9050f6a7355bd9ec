use super::{lock, BridgeNotice, BridgeShared, BridgeStatus, LostResource, Platform};
use crate::config::Config;
use crate::embedding::LostWindow;
use crate::injection::{resolve_module_path, Injector};
use crate::locator::{ProcessLocator, TargetMatcher, TargetProcess};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use shared::channel::{ChannelEndpoint, ChannelOptions, MessageHandler};
use shared::constants::INJECT_RETRY_INTERVAL;
use shared::errors::{EmbedError, WindowRole};
use shared::protocol::{ControlCommand, OverlayCommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Discovery and embedding lifecycle loop. Owns the locator and the injector outright; everything
/// the host can touch lives in [`BridgeShared`].
pub(super) struct Monitor<P: Platform> {
    shared: Arc<BridgeShared<P>>,
    locator: ProcessLocator<P::Enumerator>,
    injector: Injector<P::Loader>,
    exe_dir: PathBuf,
    config: Config,
    target: Option<TargetProcess>,
    /// Last failed injection, for the retry cooldown.
    last_failure: Option<(u32, Instant)>,
    connected: bool,
}

impl<P: Platform> Monitor<P> {
    pub(super) fn new(shared: Arc<BridgeShared<P>>, exe_dir: PathBuf) -> Self {
        let config = shared.config.get();
        let locator = ProcessLocator::new(
            shared.platform.enumerator(),
            TargetMatcher::from_config(&config.locator),
        );
        let injector = Injector::new(shared.platform.loader(), exe_dir.join(&config.injection.module));
        Self {
            shared,
            locator,
            injector,
            exe_dir,
            config,
            target: None,
            last_failure: None,
            connected: false,
        }
    }

    /// Ticks until `stop_rx` fires or its sender goes away, then tears everything down.
    pub(super) fn run(mut self, stop_rx: &Receiver<()>) {
        info!("monitor started");
        loop {
            self.tick(Instant::now());
            match stop_rx.recv_timeout(self.config.embedding.poll_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.teardown();
        info!("monitor stopped");
    }

    pub(super) fn tick(&mut self, now: Instant) {
        self.reload_config();
        self.check_windows();
        self.track_target();
        if let Some(pid) = self.target.map(|t| t.pid) {
            self.ensure_injected(pid, now);
            if !self.config.injection.enabled || self.injector.is_injected(pid) {
                self.ensure_channel();
            }
        }
        self.sync_connection();
        self.sync_embedding();
        self.publish_status();
    }

    fn reload_config(&mut self) {
        let cfg = self.shared.config.get();
        if cfg == self.config {
            return;
        }
        if cfg.locator != self.config.locator {
            self.locator.set_matcher(TargetMatcher::from_config(&cfg.locator));
            info!("locator heuristics reloaded");
        }
        if cfg.embedding.repaint_throttle != self.config.embedding.repaint_throttle {
            lock(&self.shared.embedding).set_repaint_interval(cfg.embedding.repaint_throttle);
        }
        if cfg.channel != self.config.channel {
            let old = lock(&self.shared.channel).take();
            if old.is_some() {
                info!("channel settings changed; reconnecting to `{}`", cfg.channel.name);
            }
            drop(old);
        }
        if cfg.overlay != self.config.overlay {
            let settings = cfg.overlay.to_settings();
            lock(&self.shared.view).settings = settings.clone();
            self.shared.send_command(&OverlayCommand::Control(ControlCommand::from_settings(&settings)));
        }
        self.config = cfg;
    }

    fn check_windows(&mut self) {
        let lost = lock(&self.shared.embedding).check_windows();
        for LostWindow { target, container, role } in lost {
            let resource = match role {
                WindowRole::Target => {
                    if let Some(t) = self.target.as_mut().filter(|t| t.window == Some(target)) {
                        t.window = None;
                    }
                    LostResource::TargetWindow(target)
                }
                WindowRole::Container => {
                    let mut view = lock(&self.shared.view);
                    if view.container == Some(container) {
                        view.container = None;
                    }
                    LostResource::ContainerWindow(container)
                }
            };
            self.shared.notify(BridgeNotice::Lost(resource));
        }
    }

    /// Keeps following the current process for as long as it runs. An embedded window is a child
    /// and no longer enumerates as top-level, so a sighting of the same pid without a window
    /// keeps the known one.
    fn track_target(&mut self) {
        let found = self.locator.find_target();
        if let Some(current) = self.target {
            match found.filter(|t| t.pid == current.pid) {
                Some(seen) => {
                    if let Some(window) = seen.window.filter(|w| current.window != Some(*w)) {
                        debug!("process {} window is now {window:?}", current.pid);
                        self.target = Some(TargetProcess { pid: current.pid, window: Some(window) });
                    }
                    return;
                }
                None if self.locator.is_running(current.pid) => return,
                None => self.lose_process(current.pid),
            }
        }
        if let Some(t) = found {
            self.target = Some(t);
            self.shared.notify(BridgeNotice::TargetFound(t));
        }
    }

    fn lose_process(&mut self, pid: u32) {
        warn!("target process {pid} exited");
        lock(&self.shared.embedding).restore_all();
        self.injector.purge(pid);
        let endpoint = lock(&self.shared.channel).take();
        drop(endpoint);
        self.shared.hub.reset();
        self.target = None;
        self.last_failure = None;
        self.shared.notify(BridgeNotice::Lost(LostResource::TargetProcess(pid)));
    }

    fn ensure_injected(&mut self, pid: u32, now: Instant) {
        if !self.config.injection.enabled || self.injector.is_injected(pid) {
            return;
        }
        if let Some((failed_pid, at)) = self.last_failure {
            if failed_pid == pid && now.saturating_duration_since(at) < INJECT_RETRY_INTERVAL {
                return;
            }
        }

        let cfg = &self.config.injection;
        let result = resolve_module_path(&self.exe_dir, &cfg.module, &cfg.fallback_dir).and_then(|path| {
            self.injector.set_module_path(path);
            self.injector.inject(pid)
        });
        match result {
            Ok(record) => {
                self.last_failure = None;
                debug!("injection record {record:?}");
                self.shared.notify(BridgeNotice::Injected { pid });
            }
            Err(e) => {
                warn!("injection into {pid} failed at {}: {e}", e.stage());
                self.last_failure = Some((pid, now));
                self.shared.notify(BridgeNotice::InjectionFailed {
                    pid,
                    stage: e.stage(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn ensure_channel(&mut self) {
        let mut slot = lock(&self.shared.channel);
        if slot.is_some() {
            return;
        }
        let cfg = &self.config.channel;
        let hub = Arc::clone(&self.shared.hub);
        let handler: MessageHandler = Arc::new(move |line: &str| {
            hub.ingest_line(line);
        });
        let options = ChannelOptions {
            reconnect_interval: cfg.reconnect_interval,
            connect_timeout: cfg.connect_timeout,
            ..ChannelOptions::default()
        };
        match ChannelEndpoint::connect(&cfg.name, self.shared.platform.connector(&cfg.name), options, handler) {
            Ok(endpoint) => {
                info!("connecting to channel `{}`", cfg.name);
                *slot = Some(Arc::new(endpoint));
            }
            Err(e) => error!("cannot start channel connector: {e}"),
        }
    }

    /// Edge-detects the connector state. Every fresh connection gets the full overlay settings,
    /// since the module starts from its own defaults.
    fn sync_connection(&mut self) {
        let endpoint = lock(&self.shared.channel).clone();
        let connected = endpoint.as_ref().is_some_and(|ep| ep.is_connected());
        if connected && !self.connected {
            self.shared.notify(BridgeNotice::Connected);
            let settings = lock(&self.shared.view).settings.clone();
            if let Some(ep) = &endpoint {
                if !ep.send(&OverlayCommand::Control(ControlCommand::from_settings(&settings)).to_line()) {
                    debug!("settings push after connect was dropped");
                }
            }
        } else if !connected && self.connected {
            self.shared.notify(BridgeNotice::Disconnected);
        }
        self.connected = connected;
    }

    fn sync_embedding(&mut self) {
        if !self.config.embedding.enabled {
            let mut embedding = lock(&self.shared.embedding);
            if embedding.active().is_some() {
                info!("embedding disabled; restoring");
                embedding.restore_all();
            }
            return;
        }
        let Some(target) = self.target.and_then(|t| t.window) else {
            return;
        };
        let (host_container, area) = {
            let view = lock(&self.shared.view);
            (view.container, view.area)
        };
        let Some(container) = host_container
            .or_else(|| self.shared.platform.find_container(&self.config.embedding.container_title))
        else {
            return;
        };

        let mut embedding = lock(&self.shared.embedding);
        if let Some(record) = embedding.record(target).copied() {
            if record.container == container {
                if let Some(area) = area {
                    if let Err(e) = embedding.update_position(target, area) {
                        debug!("position update skipped: {e}");
                    }
                }
                return;
            }
            info!("container changed from {:?} to {container:?}; re-embedding", record.container);
            if let Err(e) = embedding.restore(target) {
                warn!("restore before re-embedding failed: {e}");
            }
        }

        match embedding.embed(container, target) {
            Ok(()) => {
                if let Some(area) = area {
                    let _ = embedding.update_position(target, area);
                }
                drop(embedding);
                self.shared.notify(BridgeNotice::Embedded { container, target });
            }
            Err(e @ EmbedError::InvalidWindow { role: WindowRole::Target, .. }) => {
                debug!("{e}; waiting for a new window");
                if let Some(t) = self.target.as_mut() {
                    t.window = None;
                }
            }
            Err(e) => warn!("embedding failed: {e}"),
        }
    }

    fn publish_status(&self) {
        let embedded = lock(&self.shared.embedding).active();
        let status = BridgeStatus {
            target: self.target,
            injected: self.target.is_some_and(|t| self.injector.is_injected(t.pid)),
            connected: self.connected,
            embedded,
        };
        *lock(&self.shared.status) = status;
    }

    /// Restores windows, ejects modules, then closes the channel.
    pub(super) fn teardown(&mut self) {
        lock(&self.shared.embedding).restore_all();
        self.injector.shutdown();
        let endpoint = lock(&self.shared.channel).take();
        drop(endpoint);
        if self.connected {
            self.shared.notify(BridgeNotice::Disconnected);
        }
        self.connected = false;
        self.target = None;
        self.publish_status();
    }
}
