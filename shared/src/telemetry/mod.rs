//! Snapshot and discrete-event representation of target-process telemetry.

mod event;
mod ring;
mod state;

pub use event::{GameEvent, GameEventKind};
pub use ring::EventRing;
pub use state::{GameState, PlayerState, StateUpdate};
