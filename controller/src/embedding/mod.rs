//! Window Embedding Manager: shows the target's window as an undecorated child of a container
//! window owned by the controller, and puts it back exactly as it was.

mod manager;
pub mod style;
#[cfg(windows)]
mod win32;

pub use manager::{
    EmbeddingManager, EmbeddingRecord, EmbeddingState, LostWindow, RefreshThrottle, WindowSnapshot,
};
#[cfg(windows)]
pub use win32::{find_window_by_title, Win32WindowOps};

#[cfg(test)]
pub(crate) use manager::mock::{MockWindow, MockWindowOps};

use shared::geometry::Rect;
use shared::handles::WindowHandle;

/// How `set_bounds` treats z-order and activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Child of the container: bottom of the z-order, never activated, frame recomputed.
    Embedded,
    /// Back to saved bounds: z-order untouched, frame recomputed.
    Restored,
}

/// Window-system operations used by the manager. Errors carry the OS reason as text.
pub trait WindowOps: Send {
    fn is_window(&self, window: WindowHandle) -> bool;
    fn parent(&self, window: WindowHandle) -> WindowHandle;
    fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> Result<(), String>;
    fn style(&self, window: WindowHandle) -> u32;
    fn set_style(&self, window: WindowHandle, style: u32) -> Result<(), String>;
    fn ex_style(&self, window: WindowHandle) -> u32;
    fn set_ex_style(&self, window: WindowHandle, ex_style: u32) -> Result<(), String>;
    /// Outer rectangle, in the coordinates `set_bounds` expects for the current parent.
    fn window_rect(&self, window: WindowHandle) -> Option<Rect>;
    fn client_rect(&self, window: WindowHandle) -> Option<Rect>;
    fn is_maximized(&self, window: WindowHandle) -> bool;
    fn set_bounds(&self, window: WindowHandle, bounds: Rect, placement: Placement) -> Result<(), String>;
    fn maximize(&self, window: WindowHandle) -> Result<(), String>;
    /// Invalidates; repaints synchronously only when the calling thread owns the window.
    fn repaint(&self, window: WindowHandle);
}
