//! `wglSwapBuffers` interception for legacy OpenGL hosts.
//!
//! Sprites are drawn with `glDrawPixels` in a pushed fixed-function state just before the swap.
//! Core-profile contexts reject these calls; the host's frame is unaffected when they do.

use super::{PresentationHook, TrampolineHook};
use crate::call_guard::CallGuard;
use crate::layout::Size;
use crate::module;
use crate::painter::Sprite;
use log::{info, warn};
use shared::errors::HookError;
use shared::overlay::DisplayMode;
use std::ffi::c_void;
use std::mem::{self, zeroed};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use windows_sys::Win32::Foundation::RECT;
use windows_sys::Win32::Graphics::Gdi::{HDC, WindowFromDC};
use windows_sys::Win32::Graphics::OpenGL::{
    GL_ALL_ATTRIB_BITS, GL_BLEND, GL_CLIENT_ALL_ATTRIB_BITS, GL_CULL_FACE, GL_DEPTH_TEST, GL_LIGHTING,
    GL_MODELVIEW, GL_ONE, GL_ONE_MINUS_SRC_ALPHA, GL_PROJECTION, GL_SCISSOR_TEST, GL_TEXTURE_2D,
    GL_UNPACK_ALIGNMENT, GL_UNPACK_ROW_LENGTH, GL_UNPACK_SKIP_PIXELS, GL_UNPACK_SKIP_ROWS, GL_UNSIGNED_BYTE,
    glBlendFunc, glDisable, glDrawPixels, glEnable, glLoadIdentity, glMatrixMode, glOrtho, glPixelStorei,
    glPixelZoom, glPopAttrib, glPopClientAttrib, glPopMatrix, glPushAttrib, glPushClientAttrib, glPushMatrix,
    glRasterPos2i, glViewport,
};
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleA, GetProcAddress};
use windows_sys::Win32::UI::WindowsAndMessaging::GetClientRect;

/// `GL_EXT_bgra`, core since 1.2 but absent from the 1.1 headers.
const GL_BGRA_EXT: u32 = 0x80E1;

type SwapBuffersFn = unsafe extern "system" fn(HDC) -> i32;

static ORIGINAL_SWAP: AtomicUsize = AtomicUsize::new(0);

/// Puts a trampoline on `opengl32!wglSwapBuffers`.
pub(crate) fn install() -> Result<Box<dyn PresentationHook>, HookError> {
    let module = unsafe { GetModuleHandleA(c"opengl32.dll".as_ptr().cast()) };
    if module.is_null() {
        return Err(HookError::BackendNotFound);
    }
    let target = unsafe { GetProcAddress(module, c"wglSwapBuffers".as_ptr().cast()) }
        .map(|f| f as *const c_void)
        .ok_or_else(|| HookError::Resolve { what: "wglSwapBuffers", reason: std::io::Error::last_os_error().to_string() })?;

    let mut hook = TrampolineHook::new();
    let original = unsafe { hook.install(target, hooked_swap_buffers as *const c_void) }?;
    ORIGINAL_SWAP.store(original as usize, Ordering::SeqCst);
    info!("wglSwapBuffers hooked at {:#x}", target as usize);
    Ok(Box::new(hook))
}

unsafe extern "system" fn hooked_swap_buffers(hdc: HDC) -> i32 {
    if let Some(_guard) = CallGuard::enter() {
        if panic::catch_unwind(AssertUnwindSafe(|| unsafe { on_swap(hdc) })).is_err() {
            warn!("panic while drawing into the OpenGL frame");
        }
    }
    match ORIGINAL_SWAP.load(Ordering::SeqCst) {
        // Trampoline not published yet; the swap of this one frame is lost.
        0 => 1,
        addr => {
            let original = unsafe { mem::transmute::<usize, SwapBuffersFn>(addr) };
            unsafe { original(hdc) }
        }
    }
}

unsafe fn on_swap(hdc: HDC) {
    let Some(rt) = module::runtime() else {
        return;
    };
    let now = Instant::now();
    rt.note_present(now);

    let window = unsafe { WindowFromDC(hdc) };
    if window.is_null() {
        return;
    }
    let mut client: RECT = unsafe { zeroed() };
    if unsafe { GetClientRect(window, &mut client) } == 0 {
        return;
    }
    let size = Size::new((client.right - client.left).max(0) as u32, (client.bottom - client.top).max(0) as u32);
    if size.is_empty() {
        return;
    }
    let Some(sprites) = rt.render(DisplayMode::Hook, size, now) else {
        return;
    };
    if !sprites.is_empty() {
        unsafe { draw_sprites(&sprites, size) };
    }
}

/// Draws in window coordinates (origin top-left) and restores every piece of state it touches.
unsafe fn draw_sprites(sprites: &[Sprite], size: Size) {
    let (w, h) = (size.width as i32, size.height as i32);
    unsafe {
        glPushAttrib(GL_ALL_ATTRIB_BITS);
        glPushClientAttrib(GL_CLIENT_ALL_ATTRIB_BITS);
        glMatrixMode(GL_PROJECTION);
        glPushMatrix();
        glLoadIdentity();
        glOrtho(0.0, w as f64, h as f64, 0.0, -1.0, 1.0);
        glMatrixMode(GL_MODELVIEW);
        glPushMatrix();
        glLoadIdentity();

        glViewport(0, 0, w, h);
        for cap in [GL_DEPTH_TEST, GL_CULL_FACE, GL_SCISSOR_TEST, GL_LIGHTING, GL_TEXTURE_2D] {
            glDisable(cap);
        }
        glEnable(GL_BLEND);
        glBlendFunc(GL_ONE, GL_ONE_MINUS_SRC_ALPHA);
        glPixelStorei(GL_UNPACK_ALIGNMENT, 4);
        glPixelStorei(GL_UNPACK_ROW_LENGTH, 0);
        glPixelStorei(GL_UNPACK_SKIP_PIXELS, 0);
        glPixelStorei(GL_UNPACK_SKIP_ROWS, 0);
        // Canvas rows are top-down.
        glPixelZoom(1.0, -1.0);

        for sprite in sprites {
            // A raster position outside the viewport discards the whole image.
            if sprite.rect.left < 0 || sprite.rect.top < 0 || sprite.rect.left >= w || sprite.rect.top >= h {
                continue;
            }
            glRasterPos2i(sprite.rect.left, sprite.rect.top);
            glDrawPixels(
                sprite.canvas.width() as i32,
                sprite.canvas.height() as i32,
                GL_BGRA_EXT,
                GL_UNSIGNED_BYTE,
                sprite.canvas.as_bytes().as_ptr().cast(),
            );
        }

        glMatrixMode(GL_MODELVIEW);
        glPopMatrix();
        glMatrixMode(GL_PROJECTION);
        glPopMatrix();
        glPopClientAttrib();
        glPopAttrib();
    }
}
