//! `IDXGISwapChain::Present` interception for Direct3D 10/11 hosts.
//!
//! Swap chains of one class share a vtable, so the slot is found on a throwaway swap chain created
//! against a hidden window and patched once. Messages are composited on the CPU through a staging
//! copy of the back buffer regions the sprites cover.

use super::{PresentationHook, VirtualProtectPages, VtableHook};
use crate::call_guard::CallGuard;
use crate::canvas::PixelOrder;
use crate::layout::Size;
use crate::module;
use crate::painter::Sprite;
use log::{debug, info, warn};
use shared::errors::HookError;
use shared::overlay::DisplayMode;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, TryLockError};
use std::time::Instant;
use std::{mem, ptr, slice};
use windows::Win32::Foundation::{E_FAIL, HMODULE, HWND};
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11_BOX, D3D11_CPU_ACCESS_READ, D3D11_CPU_ACCESS_WRITE, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_MAP_READ_WRITE, D3D11_MAPPED_SUBRESOURCE, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_STAGING, D3D11CreateDeviceAndSwapChain, ID3D11Device, ID3D11DeviceContext,
    ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_B8G8R8A8_UNORM_SRGB, DXGI_FORMAT_R8G8B8A8_UNORM,
    DXGI_FORMAT_R8G8B8A8_UNORM_SRGB, DXGI_MODE_DESC, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    DXGI_SWAP_CHAIN_DESC, DXGI_SWAP_EFFECT_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT, IDXGIAdapter,
    IDXGISwapChain,
};
use windows::core::{HRESULT, Interface};
use windows_sys::Win32::UI::WindowsAndMessaging::{CreateWindowExW, DestroyWindow, WS_OVERLAPPED};

/// `Present` in the `IDXGISwapChain` vtable (after the IUnknown, IDXGIObject and
/// IDXGIDeviceSubObject methods).
const PRESENT_SLOT: usize = 8;

/// `DXGI_PRESENT_TEST`: the host only checks occlusion, nothing is shown.
const PRESENT_TEST: u32 = 0x1;

type PresentFn = unsafe extern "system" fn(*mut c_void, u32, u32) -> HRESULT;

static ORIGINAL_PRESENT: AtomicUsize = AtomicUsize::new(0);
static RENDERER: Mutex<Option<DxgiRenderer>> = Mutex::new(None);
static UNSUPPORTED_LOGGED: AtomicBool = AtomicBool::new(false);

/// Hidden window the probe swap chain presents to.
struct ProbeWindow(windows_sys::Win32::Foundation::HWND);

impl ProbeWindow {
    fn create() -> Result<Self, HookError> {
        let class: Vec<u16> = "STATIC".encode_utf16().chain(Some(0)).collect();
        let hwnd = unsafe {
            CreateWindowExW(
                0,
                class.as_ptr(),
                ptr::null(),
                WS_OVERLAPPED,
                0,
                0,
                8,
                8,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            )
        };
        if hwnd.is_null() {
            return Err(HookError::Resolve { what: "probe window", reason: std::io::Error::last_os_error().to_string() });
        }
        Ok(Self(hwnd))
    }
}

impl Drop for ProbeWindow {
    fn drop(&mut self) {
        unsafe {
            DestroyWindow(self.0);
        }
    }
}

fn probe_swap_chain(window: &ProbeWindow) -> Result<IDXGISwapChain, HookError> {
    let desc = DXGI_SWAP_CHAIN_DESC {
        BufferDesc: DXGI_MODE_DESC { Width: 8, Height: 8, Format: DXGI_FORMAT_B8G8R8A8_UNORM, ..Default::default() },
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: 1,
        OutputWindow: HWND(window.0),
        Windowed: true.into(),
        SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
        Flags: 0,
    };
    let mut swap_chain: Option<IDXGISwapChain> = None;
    unsafe {
        D3D11CreateDeviceAndSwapChain(
            None::<&IDXGIAdapter>,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE(ptr::null_mut()),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&desc),
            Some(&mut swap_chain),
            None,
            None,
            None,
        )
    }
    .map_err(|e| HookError::Resolve { what: "probe swap chain", reason: e.to_string() })?;
    swap_chain.ok_or_else(|| HookError::Resolve { what: "probe swap chain", reason: "no swap chain returned".into() })
}

/// Patches the shared `Present` slot. The returned hook restores it.
pub(crate) fn install() -> Result<Box<dyn PresentationHook>, HookError> {
    let window = ProbeWindow::create()?;
    let swap_chain = probe_swap_chain(&window)?;

    let slot = unsafe {
        let vtable = *(swap_chain.as_raw() as *const *const *const c_void);
        vtable.add(PRESENT_SLOT)
    };
    // Published before the patch: a present racing the install must find its way back.
    let current = unsafe { ptr::read_volatile(slot) };
    if current != hooked_present as *const c_void {
        ORIGINAL_PRESENT.store(current as usize, Ordering::SeqCst);
    }

    let mut hook = VtableHook::new(VirtualProtectPages);
    unsafe { hook.install(slot as *const c_void, hooked_present as *const c_void) }?;
    info!("IDXGISwapChain::Present hooked (original at {:#x})", hook.original() as usize);
    Ok(Box::new(hook))
}

/// Drops the cached device objects. The original pointer stays published for presents still in
/// flight.
pub(crate) fn release() {
    let renderer = RENDERER.lock().unwrap_or_else(|p| p.into_inner()).take();
    if renderer.is_some() {
        debug!("DXGI renderer released");
    }
}

unsafe extern "system" fn hooked_present(this: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
    if flags & PRESENT_TEST == 0 {
        if let Some(_guard) = CallGuard::enter() {
            match panic::catch_unwind(AssertUnwindSafe(|| unsafe { on_present(this) })) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("overlay draw skipped: {e}"),
                Err(_) => warn!("panic while drawing into the swap chain"),
            }
        }
    }
    match ORIGINAL_PRESENT.load(Ordering::SeqCst) {
        0 => HRESULT(0),
        addr => {
            let original: PresentFn = unsafe { mem::transmute::<usize, PresentFn>(addr) };
            unsafe { original(this, sync_interval, flags) }
        }
    }
}

fn pixel_order(format: DXGI_FORMAT) -> Option<PixelOrder> {
    match format {
        DXGI_FORMAT_B8G8R8A8_UNORM | DXGI_FORMAT_B8G8R8A8_UNORM_SRGB => Some(PixelOrder::Bgra),
        DXGI_FORMAT_R8G8B8A8_UNORM | DXGI_FORMAT_R8G8B8A8_UNORM_SRGB => Some(PixelOrder::Rgba),
        _ => None,
    }
}

unsafe fn on_present(this: *mut c_void) -> windows::core::Result<()> {
    let Some(rt) = module::runtime() else {
        return Ok(());
    };
    let Some(swap_chain) = (unsafe { IDXGISwapChain::from_raw_borrowed(&this) }) else {
        return Ok(());
    };
    let now = Instant::now();
    rt.note_present(now);

    let back: ID3D11Texture2D = unsafe { swap_chain.GetBuffer(0) }?;
    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { back.GetDesc(&mut desc) };
    let order = match pixel_order(desc.Format) {
        Some(order) if desc.SampleDesc.Count == 1 => order,
        _ => {
            if !UNSUPPORTED_LOGGED.swap(true, Ordering::Relaxed) {
                warn!("back buffer format {:?} x{} samples is not drawable", desc.Format, desc.SampleDesc.Count);
            }
            return Ok(());
        }
    };

    let Some(sprites) = rt.render(DisplayMode::Hook, Size::new(desc.Width, desc.Height), now) else {
        return Ok(());
    };
    if sprites.is_empty() {
        return Ok(());
    }

    let mut guard = match RENDERER.try_lock() {
        Ok(g) => g,
        Err(TryLockError::Poisoned(p)) => p.into_inner(),
        Err(TryLockError::WouldBlock) => return Ok(()),
    };
    let key = swap_chain.as_raw() as usize;
    if guard.as_ref().is_none_or(|r| r.swap_chain != key) {
        *guard = Some(DxgiRenderer::bind(swap_chain)?);
        debug!("DXGI renderer bound to swap chain {key:#x}");
    }
    match guard.as_mut() {
        Some(renderer) => renderer.composite(&back, &desc, order, &sprites),
        None => Ok(()),
    }
}

/// Sprite bounds clipped to the back buffer.
fn clip(sprite: &Sprite, width: u32, height: u32) -> Option<D3D11_BOX> {
    let left = sprite.rect.left.max(0) as u32;
    let top = sprite.rect.top.max(0) as u32;
    let right = (sprite.rect.right.max(0) as u32).min(width);
    let bottom = (sprite.rect.bottom.max(0) as u32).min(height);
    (left < right && top < bottom).then_some(D3D11_BOX { left, top, front: 0, right, bottom, back: 1 })
}

/// Device objects of the swap chain being drawn into, plus a CPU-accessible copy of its back
/// buffer.
struct DxgiRenderer {
    swap_chain: usize,
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    staging: Option<(ID3D11Texture2D, u32, u32, DXGI_FORMAT)>,
}

// Only used from inside `Present`, one call at a time through the mutex.
unsafe impl Send for DxgiRenderer {}

impl DxgiRenderer {
    fn bind(swap_chain: &IDXGISwapChain) -> windows::core::Result<Self> {
        let device: ID3D11Device = unsafe { swap_chain.GetDevice() }?;
        let context = unsafe { device.GetImmediateContext() }?;
        Ok(Self { swap_chain: swap_chain.as_raw() as usize, device, context, staging: None })
    }

    fn staging_for(&mut self, desc: &D3D11_TEXTURE2D_DESC) -> windows::core::Result<ID3D11Texture2D> {
        if let Some((texture, w, h, format)) = &self.staging {
            if (*w, *h, *format) == (desc.Width, desc.Height, desc.Format) {
                return Ok(texture.clone());
            }
        }
        let staging_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.Width,
            Height: desc.Height,
            MipLevels: 1,
            ArraySize: 1,
            Format: desc.Format,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: (D3D11_CPU_ACCESS_READ.0 | D3D11_CPU_ACCESS_WRITE.0) as u32,
            MiscFlags: 0,
        };
        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { self.device.CreateTexture2D(&staging_desc, None, Some(&mut texture)) }?;
        let texture = texture.ok_or_else(|| windows::core::Error::from_hresult(E_FAIL))?;
        debug!("staging texture {}x{}", desc.Width, desc.Height);
        self.staging = Some((texture.clone(), desc.Width, desc.Height, desc.Format));
        Ok(texture)
    }

    fn composite(
        &mut self,
        back: &ID3D11Texture2D,
        desc: &D3D11_TEXTURE2D_DESC,
        order: PixelOrder,
        sprites: &[Sprite],
    ) -> windows::core::Result<()> {
        let staging = self.staging_for(desc)?;
        let boxes: Vec<D3D11_BOX> = sprites.iter().filter_map(|s| clip(s, desc.Width, desc.Height)).collect();
        if boxes.is_empty() {
            return Ok(());
        }
        unsafe {
            for b in &boxes {
                self.context.CopySubresourceRegion(&staging, 0, b.left, b.top, 0, back, 0, Some(b));
            }
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            self.context.Map(&staging, 0, D3D11_MAP_READ_WRITE, 0, Some(&mut mapped))?;
            let pitch = mapped.RowPitch as usize;
            let pixels = slice::from_raw_parts_mut(mapped.pData.cast::<u8>(), pitch * desc.Height as usize);
            for sprite in sprites {
                sprite.canvas.composite_onto(pixels, pitch, desc.Width, desc.Height, sprite.rect.left, sprite.rect.top, order);
            }
            self.context.Unmap(&staging, 0);
            for b in &boxes {
                self.context.CopySubresourceRegion(back, 0, b.left, b.top, 0, &staging, 0, Some(b));
            }
        }
        Ok(())
    }
}
