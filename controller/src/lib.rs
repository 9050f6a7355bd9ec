//! Controller side of the coaching bridge: finds the game, loads the overlay module into it,
//! talks to that module over the channel and embeds the game window into the coaching UI.

pub mod bridge;
#[cfg(windows)]
pub mod cleanup;
pub mod config;
pub mod embedding;
pub mod injection;
pub mod locator;
pub mod logger;
pub mod telemetry;
#[cfg(windows)]
pub(crate) mod win32;
