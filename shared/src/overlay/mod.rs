//! Overlay message model and display settings shared by both sides of the channel.

mod message;
mod settings;
mod theme;

pub use message::{
    fade_alpha, ActiveMessage, MessageAnchor, MessageCategory, MessagePriority, OverlayMessage,
};
pub use settings::{clamp_transparency, DisplayMode, OverlaySettings};
pub use theme::{Color, Palette, Theme};
