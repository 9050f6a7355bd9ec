use log::{error, info, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use shared::constants::{
    CHANNEL_NAME, CONNECT_TIMEOUT, DEFAULT_MESSAGE_DURATION, DEFAULT_TRANSPARENCY,
    DISCOVERY_POLL_INTERVAL, EVENT_RING_CAPACITY, OVERLAY_FALLBACK_DIR, OVERLAY_MODULE_NAME,
    RECONNECT_INTERVAL, REPAINT_THROTTLE,
};
use shared::errors::ConfigError;
use shared::overlay::{clamp_transparency, DisplayMode, OverlaySettings, Theme};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, RwLock},
    thread,
    time::Duration,
};

/// Full bridge configuration, loaded from TOML. Every section is optional.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub locator: LocatorConfig,
    pub injection: InjectionConfig,
    pub channel: ChannelConfig,
    pub embedding: EmbeddingConfig,
    pub overlay: OverlayConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

/// Target discovery heuristics `[locator]`. All needles are matched case-insensitively.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LocatorConfig {
    /// Substrings of the target's image name.
    pub process_names: Vec<String>,
    /// A window title must contain one of these...
    pub title_needles: Vec<String>,
    /// ...and one of these.
    pub title_keywords: Vec<String>,
    /// Exact window class names accepted regardless of title.
    pub window_classes: Vec<String>,
    /// Substrings that disqualify a window by title or class.
    pub decoys: Vec<String>,
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            process_names: list(&["dolphin", "slippi"]),
            title_needles: list(&["dolphin", "slippi"]),
            title_keywords: list(&["fps", "melee", "ssbm", "gamecube", "faster melee"]),
            window_classes: list(&[
                "dolphinclass",
                "dolphin-emu",
                "dolphinwx",
                "wxwindownr",
                "wxwindowclassnr",
            ]),
            decoys: list(&[
                "launcher",
                "project slippi",
                "electron",
                "chrome",
                "cefclient",
                "applicationframehost",
                "dwm",
                "desktop",
                "taskbar",
            ]),
            min_width: 320,
            min_height: 240,
            max_width: 3840,
            max_height: 2160,
        }
    }
}

/// Remote module loading `[injection]`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct InjectionConfig {
    pub enabled: bool,
    /// File name of the helper module, looked up next to the controller executable.
    pub module: String,
    /// Secondary directory, relative to the working directory.
    pub fallback_dir: PathBuf,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            module: OVERLAY_MODULE_NAME.into(),
            fallback_dir: PathBuf::from(OVERLAY_FALLBACK_DIR),
        }
    }
}

/// `[channel]`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(with = "duration_str")]
    pub reconnect_interval: Duration,
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: CHANNEL_NAME.into(),
            reconnect_interval: RECONNECT_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// `[embedding]`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    /// Title of the host window that receives the target. Empty means the host supplies the
    /// container itself.
    pub container_title: String,
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    #[serde(with = "duration_str")]
    pub repaint_throttle: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            container_title: "Coach Clippi - Game".into(),
            poll_interval: DISCOVERY_POLL_INTERVAL,
            repaint_throttle: REPAINT_THROTTLE,
        }
    }
}

/// Initial overlay settings `[overlay]`, pushed to the module after every connect.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub transparency: f32,
    #[serde(with = "duration_str")]
    pub duration: Duration,
    pub theme: Theme,
    pub display_mode: DisplayMode,
}

impl Default for OverlayConfig {
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

impl OverlayConfig {
    pub fn to_settings(&self) -> OverlaySettings {
        let mut settings = OverlaySettings::default().with_transparency(self.transparency);
        settings.enabled = self.enabled;
        settings.duration = self.duration;
        settings.theme = self.theme;
        settings.display_mode = self.display_mode;
        settings
    }
}

/// `[telemetry]`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub event_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { event_capacity: EVENT_RING_CAPACITY }
    }
}

/// Log levels accepted by `[logging] level` (lowercase in TOML).
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[derive(strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// `[logging]`
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl LoggingConfig {
    /// flexi_logger spec string covering both bridge crates.
    pub fn spec(&self) -> String {
        format!("controller={0},shared={0}", self.level)
    }
}

/// Durations as humantime strings: "500ms", "2s", "1m 30s".
mod duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
    }
}

impl Config {
    /// Load, parse, and validate a `Config` from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let cfg: Config = toml::from_str(&s).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        Config::load(path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let loc = &self.locator;
        if loc.process_names.is_empty() && loc.title_needles.is_empty() && loc.window_classes.is_empty() {
            return Err(ConfigError::Validation(
                "locator needs at least one process name, title needle or window class".into(),
            ));
        }
        if loc.min_width <= 0 || loc.min_height <= 0 {
            return Err(ConfigError::Validation("locator minimum size must be > 0".into()));
        }
        if loc.min_width > loc.max_width || loc.min_height > loc.max_height {
            return Err(ConfigError::Validation(format!(
                "locator size bounds are inverted: {}x{} .. {}x{}",
                loc.min_width, loc.min_height, loc.max_width, loc.max_height
            )));
        }
        if self.injection.module.trim().is_empty() {
            return Err(ConfigError::Validation("injection.module must not be empty".into()));
        }
        let name = &self.channel.name;
        if name.is_empty() || name.contains(['\\', '/']) {
            return Err(ConfigError::Validation(format!(
                "channel.name `{name}` must be a bare pipe name"
            )));
        }
        if self.channel.reconnect_interval.is_zero() || self.embedding.poll_interval.is_zero() {
            return Err(ConfigError::Validation("intervals must be > 0".into()));
        }
        if self.telemetry.event_capacity == 0 {
            return Err(ConfigError::Validation("telemetry.event_capacity must be > 0".into()));
        }
        if !self.overlay.transparency.is_nan()
            && clamp_transparency(self.overlay.transparency) != self.overlay.transparency
        {
            warn!("overlay.transparency {} clamped to [0,1]", self.overlay.transparency);
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn from_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(toml).map_err(ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Manages a live-updating `Config` via file-watcher.
pub struct ConfigManager {
    inner: Arc<RwLock<Config>>,
    path: Option<PathBuf>,
    _watcher: Option<RecommendedWatcher>,
}

impl ConfigManager {
    /// Loads `path` (or the defaults when it does not exist) and watches it for changes. A reload
    /// that fails to parse or validate keeps the previous config.
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Config::load_or_default(path)?;
        let shared = Arc::new(RwLock::new(cfg));
        if !path.exists() {
            return Ok(ConfigManager { inner: shared, path: None, _watcher: None });
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            tx,
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .map_err(|e| ConfigError::Validation(format!("Watcher error: {}", e)))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::Validation(format!("Watch error: {}", e)))?;

        let cfg_path = path.to_path_buf();
        let shared_clone = Arc::clone(&shared);

        thread::Builder::new()
            .name("config_watcher".to_string())
            .spawn(move || {
                for event in rx.into_iter().flatten() {
                    if !matches!(event.kind, EventKind::Modify(_)) {
                        continue;
                    }
                    match Config::load(&cfg_path) {
                        Ok(new_cfg) => {
                            *shared_clone.write().unwrap_or_else(|p| p.into_inner()) = new_cfg;
                            info!("Config reloaded");
                        }
                        Err(e) => error!("Failed to reload config: {e}"),
                    }
                }
            })
            .map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;

        Ok(ConfigManager {
            inner: shared,
            path: Some(path.to_path_buf()),
            _watcher: Some(watcher),
        })
    }

    /// A manager over a fixed config with no file behind it.
    pub fn fixed(cfg: Config) -> Self {
        ConfigManager { inner: Arc::new(RwLock::new(cfg)), path: None, _watcher: None }
    }

    /// Snapshot-like read of the current config
    pub fn get(&self) -> Config {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Replaces the live config, e.g. from host-side settings changes.
    pub fn set(&self, cfg: Config) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = cfg;
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
