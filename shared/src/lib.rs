//! Types and plumbing shared by the controller and the injected overlay module.

pub mod channel;
pub mod constants;
pub mod errors;
pub mod geometry;
pub mod handles;
pub mod overlay;
pub mod protocol;
pub mod telemetry;
#[cfg(windows)]
pub mod win32;
