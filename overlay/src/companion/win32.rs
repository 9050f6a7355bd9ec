use super::{FrameSource, HostCandidate, TrackAction, Tracker, pick_host};
use crate::canvas::PixelOrder;
use crate::layout::Size;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, info, warn};
use shared::constants::TRACKING_INTERVAL;
use shared::geometry::Rect;
use shared::handles::WindowHandle;
use std::ffi::c_void;
use std::io;
use std::mem::{size_of, zeroed};
use std::ptr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use windows_sys::Win32::Foundation::{
    ERROR_CLASS_ALREADY_EXISTS, GetLastError, HWND, LPARAM, LRESULT, POINT, RECT, SIZE, WPARAM,
};
use windows_sys::Win32::Graphics::Gdi::{
    AC_SRC_ALPHA, AC_SRC_OVER, BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BLENDFUNCTION, ClientToScreen,
    CreateCompatibleDC, CreateDIBSection, DIB_RGB_COLORS, DeleteDC, DeleteObject, GdiFlush, GetDC,
    HBITMAP, HDC, HGDIOBJ, ReleaseDC, SelectObject,
};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Threading::GetCurrentProcessId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, EnumWindows, GetClientRect,
    GetWindowThreadProcessId, HTTRANSPARENT, HWND_TOPMOST, IsIconic, IsWindow, IsWindowVisible, MSG,
    PM_REMOVE, PeekMessageW, RegisterClassExW, SW_HIDE, SWP_NOACTIVATE, SWP_SHOWWINDOW, SetWindowPos,
    ShowWindow, TranslateMessage, ULW_ALPHA, UnregisterClassW, UpdateLayeredWindow, WM_NCHITTEST,
    WNDCLASSEXW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_EX_TRANSPARENT,
    WS_POPUP,
};

const CLASS_NAME: &str = "CoachBridgeOverlayWindow";

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(Some(0)).collect()
}

fn hwnd(window: WindowHandle) -> HWND {
    window.into_raw() as HWND
}

/// Running companion window thread.
pub struct Companion {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    worker: Option<JoinHandle<()>>,
}

impl Companion {
    /// Closes the window and waits at most `timeout` for its thread.
    pub fn stop(mut self, timeout: Duration) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.stop_tx.try_send(());
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                debug!("companion window thread joined");
            }
            Err(RecvTimeoutError::Timeout) => warn!("companion window did not stop within {timeout:?}; abandoning it"),
        }
    }
}

/// Starts the companion window on its own thread. The window stays hidden until `source` reports
/// it active and a host window of this process is found.
pub fn spawn(source: Arc<dyn FrameSource>) -> io::Result<Companion> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let (done_tx, done_rx) = bounded::<()>(1);
    let worker = thread::Builder::new().name("overlay_window".into()).spawn(move || {
        match CompanionWindow::create() {
            Some(window) => window.run(source.as_ref(), &stop_rx),
            None => warn!("companion window unavailable: {}", io::Error::last_os_error()),
        }
        let _ = done_tx.send(());
    })?;
    Ok(Companion { stop_tx, done_rx, worker: Some(worker) })
}

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_NCHITTEST {
        return HTTRANSPARENT as LRESULT;
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> i32 {
    let out = unsafe { &mut *(lparam as *mut Vec<HWND>) };
    out.push(hwnd);
    1
}

/// Client area in screen coordinates, or `None` while minimized, hidden or destroyed.
fn client_on_screen(window: HWND) -> Option<Rect> {
    unsafe {
        if IsWindow(window) == 0 || IsWindowVisible(window) == 0 || IsIconic(window) != 0 {
            return None;
        }
        let mut r: RECT = zeroed();
        if GetClientRect(window, &mut r) == 0 {
            return None;
        }
        let mut origin = POINT { x: 0, y: 0 };
        if ClientToScreen(window, &mut origin) == 0 {
            return None;
        }
        Some(Rect::from_xywh(origin.x, origin.y, r.right - r.left, r.bottom - r.top))
    }
}

fn find_host(own: HWND) -> Option<WindowHandle> {
    let pid = unsafe { GetCurrentProcessId() };
    let mut handles: Vec<HWND> = Vec::new();
    unsafe {
        EnumWindows(Some(collect_window), &mut handles as *mut Vec<HWND> as LPARAM);
    }
    let candidates: Vec<HostCandidate> = handles
        .into_iter()
        .filter(|&h| h != own)
        .filter(|&h| {
            let mut owner = 0u32;
            unsafe { GetWindowThreadProcessId(h, &mut owner) };
            owner == pid
        })
        .filter_map(|h| {
            client_on_screen(h).map(|client| HostCandidate {
                window: WindowHandle::from_raw(h as usize),
                client,
                visible: true,
            })
        })
        .collect();
    pick_host(&candidates)
}

/// Top-down 32-bit DIB selected into a memory DC.
struct Surface {
    dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    bits: *mut u8,
    size: Size,
}

impl Surface {
    fn new(size: Size) -> Option<Self> {
        unsafe {
            let dc = CreateCompatibleDC(ptr::null_mut());
            if dc.is_null() {
                return None;
            }
            let mut info: BITMAPINFO = zeroed();
            info.bmiHeader = BITMAPINFOHEADER {
                biSize: size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: size.width as i32,
                biHeight: -(size.height as i32),
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB,
                ..zeroed()
            };
            let mut bits: *mut c_void = ptr::null_mut();
            let bitmap = CreateDIBSection(dc, &info, DIB_RGB_COLORS, &mut bits, ptr::null_mut(), 0);
            if bitmap.is_null() || bits.is_null() {
                DeleteDC(dc);
                return None;
            }
            let previous = SelectObject(dc, bitmap);
            Some(Self { dc, bitmap, previous, bits: bits.cast(), size })
        }
    }

    fn pitch(&self) -> usize {
        self.size.width as usize * 4
    }

    fn pixels(&mut self) -> &mut [u8] {
        let len = self.pitch() * self.size.height as usize;
        unsafe { std::slice::from_raw_parts_mut(self.bits, len) }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
            DeleteObject(self.bitmap);
            DeleteDC(self.dc);
        }
    }
}

struct CompanionWindow {
    hwnd: HWND,
    class: Vec<u16>,
    instance: *mut c_void,
    surface: Option<Surface>,
    tracker: Tracker,
}

impl CompanionWindow {
    fn create() -> Option<Self> {
        let class = wide(CLASS_NAME);
        unsafe {
            let instance = GetModuleHandleW(ptr::null());
            let mut wc: WNDCLASSEXW = zeroed();
            wc.cbSize = size_of::<WNDCLASSEXW>() as u32;
            wc.lpfnWndProc = Some(wnd_proc);
            wc.hInstance = instance;
            wc.lpszClassName = class.as_ptr();
            if RegisterClassExW(&wc) == 0 && GetLastError() != ERROR_CLASS_ALREADY_EXISTS {
                return None;
            }
            let title = wide("Coach overlay");
            let hwnd = CreateWindowExW(
                WS_EX_LAYERED | WS_EX_TRANSPARENT | WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE,
                class.as_ptr(),
                title.as_ptr(),
                WS_POPUP,
                0,
                0,
                1,
                1,
                ptr::null_mut(),
                ptr::null_mut(),
                instance,
                ptr::null(),
            );
            if hwnd.is_null() {
                UnregisterClassW(class.as_ptr(), instance);
                return None;
            }
            info!("companion window created");
            Some(Self { hwnd, class, instance, surface: None, tracker: Tracker::new() })
        }
    }

    fn run(mut self, source: &dyn FrameSource, stop_rx: &Receiver<()>) {
        while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(TRACKING_INTERVAL) {
            self.pump_messages();
            self.tick(source, Instant::now());
        }
        debug!("companion window stopping");
    }

    fn pump_messages(&self) {
        unsafe {
            let mut msg: MSG = zeroed();
            while PeekMessageW(&mut msg, ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    fn tick(&mut self, source: &dyn FrameSource, now: Instant) {
        if let Some(host) = self.tracker.host() {
            if unsafe { IsWindow(hwnd(host)) } == 0 {
                debug!("host window {host:?} is gone");
                self.tracker.lose_host();
            }
        }
        if self.tracker.should_search(now) {
            let found = find_host(self.hwnd);
            if let Some(host) = found {
                info!("companion window follows {host:?}");
            }
            self.tracker.searched(found, now);
        }

        let client = self.tracker.host().and_then(|h| client_on_screen(hwnd(h)));
        match self.tracker.observe(client, source.is_active(now)) {
            TrackAction::Hide => unsafe {
                ShowWindow(self.hwnd, SW_HIDE);
            },
            TrackAction::Move(r) => unsafe {
                SetWindowPos(self.hwnd, HWND_TOPMOST, r.left, r.top, r.width(), r.height(), SWP_NOACTIVATE | SWP_SHOWWINDOW);
            },
            TrackAction::Keep => {}
        }

        if let (true, Some(r)) = (self.tracker.is_shown(), client) {
            self.paint(source, r, now);
        }
    }

    fn paint(&mut self, source: &dyn FrameSource, at: Rect, now: Instant) {
        let size = Size::new(at.width() as u32, at.height() as u32);
        let Some(sprites) = source.frame(size, now) else {
            return;
        };
        if self.surface.as_ref().is_none_or(|s| s.size != size) {
            self.surface = None;
            self.surface = Surface::new(size);
        }
        let Some(surface) = self.surface.as_mut() else {
            warn!("companion surface {}x{} unavailable", size.width, size.height);
            return;
        };

        let pitch = surface.pitch();
        let pixels = surface.pixels();
        pixels.fill(0);
        for sprite in &sprites {
            sprite.canvas.composite_onto(pixels, pitch, size.width, size.height, sprite.rect.left, sprite.rect.top, PixelOrder::Bgra);
        }

        let blend = BLENDFUNCTION {
            BlendOp: AC_SRC_OVER as u8,
            BlendFlags: 0,
            SourceConstantAlpha: 255,
            AlphaFormat: AC_SRC_ALPHA as u8,
        };
        let dst = POINT { x: at.left, y: at.top };
        let src = POINT { x: 0, y: 0 };
        let extent = SIZE { cx: size.width as i32, cy: size.height as i32 };
        unsafe {
            GdiFlush();
            let screen = GetDC(ptr::null_mut());
            if UpdateLayeredWindow(self.hwnd, screen, &dst, &extent, surface.dc, &src, 0, &blend, ULW_ALPHA) == 0 {
                debug!("UpdateLayeredWindow failed: {}", io::Error::last_os_error());
            }
            ReleaseDC(ptr::null_mut(), screen);
        }
    }
}

impl Drop for CompanionWindow {
    fn drop(&mut self) {
        self.surface = None;
        unsafe {
            DestroyWindow(self.hwnd);
            UnregisterClassW(self.class.as_ptr(), self.instance);
        }
        info!("companion window destroyed");
    }
}
