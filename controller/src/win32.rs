//! Small helpers shared by the Win32 back-ends.

use shared::geometry::Rect;
use shared::handles::WindowHandle;
use windows_sys::Win32::Foundation::{HWND, RECT};

pub(crate) use shared::win32::{wide, OwnedHandle};

/// Decodes a UTF-16 buffer up to its first NUL.
pub(crate) fn from_wide(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

pub(crate) fn hwnd(handle: WindowHandle) -> HWND {
    handle.into_raw() as HWND
}

pub(crate) fn window_handle(hwnd: HWND) -> WindowHandle {
    WindowHandle::from_raw(hwnd as usize)
}

pub(crate) fn rect(r: &RECT) -> Rect {
    Rect::new(r.left, r.top, r.right, r.bottom)
}
