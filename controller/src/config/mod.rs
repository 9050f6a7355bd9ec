#[allow(clippy::module_inception)]
mod config;

pub use config::{
    ChannelConfig, Config, ConfigManager, EmbeddingConfig, InjectionConfig, LocatorConfig,
    LogLevel, LoggingConfig, OverlayConfig, TelemetryConfig,
};
