//! Module entry point and the process-wide runtime.
//!
//! `DllMain` only spawns the bootstrap thread: logging, the channel listener, the hooks and the
//! companion window are all started from there, outside the loader lock.

use crate::companion;
use crate::hooks::{self, Backend, detect_backends};
use crate::logger;
use crate::runtime::{OverlayRuntime, UNLOAD_JOIN_TIMEOUT};
use crate::text::{BlockGlyphs, GdiRasterizer, GlyphRasterizer};
use crossbeam::channel::{Receiver, RecvTimeoutError, bounded};
use log::{info, warn};
use once_cell::sync::OnceCell;
use shared::channel::{PipeConnection, PipeListener};
use shared::constants::CHANNEL_NAME;
use shared::errors::HookError;
use shared::overlay::OverlaySettings;
use std::ffi::{CString, c_void};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use windows::Win32::Foundation::{HINSTANCE, HMODULE};
use windows::Win32::System::LibraryLoader::{DisableThreadLibraryCalls, GetModuleHandleA};
use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};
use windows::core::PCSTR;

pub(crate) type ModuleRuntime = OverlayRuntime<PipeConnection, Box<dyn GlyphRasterizer>>;

/// Graphics modules are often loaded after the host's first window; look for them this long.
const BACKEND_SEARCH_ATTEMPTS: u32 = 60;
const BACKEND_SEARCH_INTERVAL: Duration = Duration::from_millis(500);

static RUNTIME: OnceCell<Arc<ModuleRuntime>> = OnceCell::new();

/// The runtime once bootstrap got far enough to create it.
pub(crate) fn runtime() -> Option<&'static Arc<ModuleRuntime>> {
    RUNTIME.get()
}

#[unsafe(no_mangle)]
pub extern "system" fn DllMain(hinst: HINSTANCE, reason: u32, reserved: *mut c_void) -> bool {
    match reason {
        DLL_PROCESS_ATTACH => {
            unsafe {
                let _ = DisableThreadLibraryCalls(HMODULE::from(hinst));
            }
            // Nothing to log into yet; a failed spawn leaves the module inert.
            let _ = thread::Builder::new().name("overlay_bootstrap".into()).spawn(bootstrap);
        }
        // A non-null `reserved` means the process is exiting and other threads are already gone.
        // The controller normally ran `bridge_shutdown` first; this only catches a plain unload,
        // where the bounded joins under the loader lock may give up on threads.
        DLL_PROCESS_DETACH if reserved.is_null() => {
            if let Some(rt) = runtime() {
                info!("module unloading");
                rt.shutdown();
            }
        }
        _ => {}
    }
    true
}

fn is_loaded(module: &str) -> bool {
    let Ok(name) = CString::new(module) else {
        return false;
    };
    unsafe { GetModuleHandleA(PCSTR(name.as_ptr().cast())) }.is_ok()
}

fn install(backend: Backend) -> Result<Box<dyn hooks::PresentationHook>, HookError> {
    match backend {
        Backend::Dxgi => hooks::dxgi::install(),
        Backend::OpenGl => hooks::opengl::install(),
    }
}

fn bootstrap() {
    let log_handle = match logger::init_logger(logger::DEFAULT_SPEC) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("overlay logging unavailable: {e}");
            None
        }
    };
    info!("overlay module loaded into pid {}", std::process::id());

    let rasterizer: Box<dyn GlyphRasterizer> = match GdiRasterizer::new() {
        Some(gdi) => Box::new(gdi),
        None => {
            warn!("GDI text unavailable, using block glyphs");
            Box::new(BlockGlyphs)
        }
    };
    let rt = RUNTIME.get_or_init(|| Arc::new(OverlayRuntime::new(OverlaySettings::default(), rasterizer)));

    if let Err(e) = rt.listen(CHANNEL_NAME, PipeListener::new(CHANNEL_NAME)) {
        warn!("controller channel unavailable: {e}");
    }
    match companion::spawn(Arc::clone(rt) as Arc<dyn companion::FrameSource>) {
        Ok(window) => rt.on_shutdown(move || window.stop(UNLOAD_JOIN_TIMEOUT)),
        Err(e) => warn!("companion window thread failed to start: {e}"),
    }

    let (stop_tx, stop_rx) = bounded::<()>(1);
    let (done_tx, done_rx) = bounded::<()>(1);
    rt.on_shutdown(move || {
        let _ = stop_tx.try_send(());
        if done_rx.recv_timeout(UNLOAD_JOIN_TIMEOUT).is_err() {
            warn!("hook search did not stop within {UNLOAD_JOIN_TIMEOUT:?}");
        }
        // Hooks attached while the shutdown was under way.
        if let Some(rt) = runtime() {
            rt.detach_hooks();
        }
        hooks::dxgi::release();
    });
    if let Some(handle) = log_handle {
        rt.on_shutdown(move || {
            info!("overlay module shut down");
            handle.flush();
        });
    }

    attach_hooks(rt, &stop_rx);
    let _ = done_tx.send(());
}

/// Hooks every back-end that shows up within the search window. Without any, the companion window
/// keeps drawing.
fn attach_hooks(rt: &ModuleRuntime, stop_rx: &Receiver<()>) {
    for attempt in 0..BACKEND_SEARCH_ATTEMPTS {
        let backends = detect_backends(is_loaded);
        if !backends.is_empty() {
            for backend in backends {
                match install(backend) {
                    Ok(hook) => rt.attach_hook(backend, hook),
                    Err(e) => warn!("{backend} hook not installed: {e}"),
                }
            }
            return;
        }
        if attempt == 0 {
            info!("no graphics back-end loaded yet; waiting");
        }
        if !matches!(stop_rx.recv_timeout(BACKEND_SEARCH_INTERVAL), Err(RecvTimeoutError::Timeout)) {
            return;
        }
    }
    warn!("{}; messages go to the companion window", HookError::BackendNotFound);
}
