//! In-process half of the bridge: loaded into the host, it listens for the controller, draws coach
//! messages into the host's frames (or a companion window over it) and relays host telemetry.

pub mod board;
pub mod canvas;
pub mod companion;
pub mod hooks;
pub mod layout;
pub mod logger;
pub mod painter;
pub mod relay;
pub mod runtime;
pub mod text;

#[cfg(windows)]
mod call_guard;
#[cfg(windows)]
mod exports;
#[cfg(windows)]
mod module;
