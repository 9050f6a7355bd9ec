//! Headless host for the bridge: loads `config.toml`, starts the monitor and prints lifecycle
//! notices until Ctrl+C or console close, which restores the game window and ejects the module.

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    host::run()
}

#[cfg(not(windows))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("the controller drives Win32 processes and windows and only runs on Windows")
}

#[cfg(windows)]
mod host {
    use anyhow::Context;
    use controller::bridge::{Bridge, BridgeNotice, Win32Platform};
    use controller::cleanup::ConsoleCleanup;
    use controller::config::ConfigManager;
    use controller::logger;
    use crossbeam::channel::{bounded, select};
    use log::{debug, info, warn};
    use std::env;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    pub fn run() -> anyhow::Result<()> {
        // Keep the handle alive for the duration of the process.
        let logger = logger::init_logger(logger::DEFAULT_SPEC)?;

        let exe_dir = env::current_exe()?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let config_path = find_config_file();
        let cfg_mgr = Arc::new(
            ConfigManager::new(&config_path)
                .with_context(|| format!("loading {}", config_path.display()))?,
        );
        let spec = cfg_mgr.get().logging.spec();
        if let Err(e) = logger.parse_new_spec(&spec) {
            warn!("log spec `{spec}` rejected: {e}");
        }
        info!("configuration loaded from {}", config_path.display());

        let bridge = Arc::new(Bridge::new(Win32Platform, Arc::clone(&cfg_mgr)));
        let notices = bridge.subscribe_notices();
        bridge.on_event(|event| debug!("event {} from player {}", event.kind, event.player_id));

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let cleanup_bridge = Arc::clone(&bridge);
        let _cleanup = ConsoleCleanup::new(move || {
            cleanup_bridge.stop();
            let _ = shutdown_tx.try_send(());
        })
        .context("installing console handler")?;

        bridge.start(exe_dir).context("starting monitor thread")?;
        info!("bridge started");

        loop {
            select! {
                recv(notices) -> notice => match notice {
                    Ok(BridgeNotice::Lost(what)) => println!("lost: {what}"),
                    Ok(notice) => println!("{notice}"),
                    Err(_) => break,
                },
                recv(shutdown_rx) -> _ => break,
            }
        }

        bridge.stop();
        Ok(())
    }

    /// `COACH_BRIDGE_CONFIG` wins; otherwise `config.toml` next to the executable. The file does
    /// not have to exist.
    fn find_config_file() -> PathBuf {
        if let Some(cfg) = env::var_os("COACH_BRIDGE_CONFIG") {
            return PathBuf::from(cfg);
        }

        let mut exe_path = env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
        exe_path.pop();
        exe_path.push("config.toml");
        exe_path
    }
}
