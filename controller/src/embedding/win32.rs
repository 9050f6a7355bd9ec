use super::{Placement, WindowOps};
use crate::win32::{hwnd, rect, window_handle};
use shared::geometry::Rect;
use shared::handles::WindowHandle;
use std::io;
use std::mem::zeroed;
use std::ptr;
use windows_sys::Win32::Foundation::{GetLastError, SetLastError, RECT};
use windows_sys::Win32::Graphics::Gdi::{
    RedrawWindow, RDW_ALLCHILDREN, RDW_ERASE, RDW_FRAME, RDW_INVALIDATE, RDW_UPDATENOW,
};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    GetClientRect, GetParent, GetWindowLongW, GetWindowRect, GetWindowThreadProcessId, IsWindow,
    IsZoomed, SetParent, SetWindowLongW, SetWindowPos, ShowWindow, GWL_EXSTYLE, GWL_STYLE, HWND_BOTTOM,
    SWP_ASYNCWINDOWPOS, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOOWNERZORDER, SWP_NOZORDER, SWP_SHOWWINDOW,
    SW_SHOWMAXIMIZED, WINDOW_LONG_PTR_INDEX,
};

/// Calls whose failure is only visible through a zero return *and* a non-zero last error.
fn checked(call: impl FnOnce() -> bool) -> Result<(), String> {
    unsafe { SetLastError(0) };
    if call() {
        return Ok(());
    }
    match unsafe { GetLastError() } {
        0 => Ok(()),
        code => Err(io::Error::from_raw_os_error(code as i32).to_string()),
    }
}

fn last_error() -> String {
    io::Error::last_os_error().to_string()
}

/// Whether the calling thread owns `window` and so can have messages sent to it without waiting
/// on another message loop.
fn owned_here(window: WindowHandle) -> bool {
    unsafe { GetWindowThreadProcessId(hwnd(window), ptr::null_mut()) == GetCurrentThreadId() }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32WindowOps;

impl Win32WindowOps {
    fn set_long(window: WindowHandle, index: WINDOW_LONG_PTR_INDEX, value: u32) -> Result<(), String> {
        checked(|| unsafe { SetWindowLongW(hwnd(window), index, value as i32) } != 0)
    }

    fn get_rect(window: WindowHandle, client: bool) -> Option<Rect> {
        let mut r: RECT = unsafe { zeroed() };
        let ok = unsafe {
            if client { GetClientRect(hwnd(window), &mut r) } else { GetWindowRect(hwnd(window), &mut r) }
        };
        (ok != 0).then(|| rect(&r))
    }
}

impl WindowOps for Win32WindowOps {
    fn is_window(&self, window: WindowHandle) -> bool {
        unsafe { IsWindow(hwnd(window)) != 0 }
    }

    fn parent(&self, window: WindowHandle) -> WindowHandle {
        window_handle(unsafe { GetParent(hwnd(window)) })
    }

    fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> Result<(), String> {
        // A null previous parent is legitimate for top-level windows.
        checked(|| !unsafe { SetParent(hwnd(window), hwnd(parent)) }.is_null())
    }

    fn style(&self, window: WindowHandle) -> u32 {
        unsafe { GetWindowLongW(hwnd(window), GWL_STYLE) as u32 }
    }

    fn set_style(&self, window: WindowHandle, style: u32) -> Result<(), String> {
        Self::set_long(window, GWL_STYLE, style)
    }

    fn ex_style(&self, window: WindowHandle) -> u32 {
        unsafe { GetWindowLongW(hwnd(window), GWL_EXSTYLE) as u32 }
    }

    fn set_ex_style(&self, window: WindowHandle, ex_style: u32) -> Result<(), String> {
        Self::set_long(window, GWL_EXSTYLE, ex_style)
    }

    fn window_rect(&self, window: WindowHandle) -> Option<Rect> {
        Self::get_rect(window, false)
    }

    fn client_rect(&self, window: WindowHandle) -> Option<Rect> {
        Self::get_rect(window, true)
    }

    fn is_maximized(&self, window: WindowHandle) -> bool {
        unsafe { IsZoomed(hwnd(window)) != 0 }
    }

    fn set_bounds(&self, window: WindowHandle, b: Rect, placement: Placement) -> Result<(), String> {
        let (insert_after, flags) = match placement {
            Placement::Embedded => (
                HWND_BOTTOM,
                SWP_NOACTIVATE | SWP_NOOWNERZORDER | SWP_FRAMECHANGED | SWP_SHOWWINDOW,
            ),
            Placement::Restored => (ptr::null_mut(), SWP_NOZORDER | SWP_FRAMECHANGED | SWP_NOACTIVATE),
        };
        // Another thread's window gets the move posted instead of sent.
        let flags = if owned_here(window) { flags } else { flags | SWP_ASYNCWINDOWPOS };
        let ok = unsafe {
            SetWindowPos(hwnd(window), insert_after, b.left, b.top, b.width(), b.height(), flags)
        };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn maximize(&self, window: WindowHandle) -> Result<(), String> {
        // The return value is the previous visibility, not an error indicator.
        unsafe { ShowWindow(hwnd(window), SW_SHOWMAXIMIZED) };
        Ok(())
    }

    fn repaint(&self, window: WindowHandle) {
        let mut flags = RDW_INVALIDATE | RDW_ERASE | RDW_FRAME | RDW_ALLCHILDREN;
        if owned_here(window) {
            flags |= RDW_UPDATENOW;
        }
        unsafe {
            RedrawWindow(hwnd(window), ptr::null(), ptr::null_mut(), flags);
        }
    }
}

/// Top-level window with exactly this title, if any.
pub fn find_window_by_title(title: &str) -> Option<WindowHandle> {
    use windows_sys::Win32::UI::WindowsAndMessaging::FindWindowW;
    let title = crate::win32::wide(std::ffi::OsStr::new(title));
    let found = unsafe { FindWindowW(ptr::null(), title.as_ptr()) };
    (!found.is_null()).then(|| window_handle(found))
}
