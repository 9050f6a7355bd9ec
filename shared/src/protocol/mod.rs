//! Newline-delimited text protocol spoken over the bridge channel.
//!
//! Module to controller: telemetry frames (`TelemetryFrame`). Controller to module: overlay
//! commands (`OverlayCommand`). Both directions are parsed by content inspection and tolerate
//! unknown or missing fields.

mod command;
mod frame;

pub use command::{ControlCommand, OverlayCommand};
pub use frame::TelemetryFrame;
