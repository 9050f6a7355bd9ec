mod hub;

pub use hub::{TelemetryHub, TelemetryPoll};
