//! Interception of the host's frame-presentation entry points.
//!
//! Two mechanisms sit behind [`PresentationHook`]: a vtable slot patch (DXGI swap chains share one
//! vtable per class, so patching the `Present` slot catches every chain) and an inline trampoline
//! for exported functions such as `wglSwapBuffers`. Back-end specific glue lives in `dxgi` and
//! `opengl`; both call [`crate::runtime`] to draw and then always call through to the original.

mod vtable;

#[cfg(windows)]
mod detour;
#[cfg(windows)]
pub(crate) mod dxgi;
#[cfg(windows)]
pub(crate) mod opengl;

pub use vtable::{PageProtect, VtableHook};

#[cfg(windows)]
pub use detour::TrampolineHook;
#[cfg(windows)]
pub use vtable::VirtualProtectPages;

use shared::errors::HookError;
use std::ffi::c_void;
use std::fmt;

/// Redirects one entry point to a replacement and back.
pub trait PresentationHook: Send {
    /// Points `target` at `replacement` and returns the address that still reaches the original
    /// behavior.
    ///
    /// # Safety
    /// `target` must be whatever this hook kind expects (a vtable slot, a function entry) inside
    /// memory that stays mapped while the hook is installed, and `replacement` must have the
    /// exact signature of the original.
    unsafe fn install(&mut self, target: *const c_void, replacement: *const c_void) -> Result<*const c_void, HookError>;

    /// Restores the original entry point.
    ///
    /// # Safety
    /// No thread may be executing inside `replacement` in a way that depends on the hook staying
    /// installed.
    unsafe fn uninstall(&mut self) -> Result<(), HookError>;

    fn is_installed(&self) -> bool;
}

/// Graphics back-end families the module knows how to draw into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Direct3D 10/11 through an `IDXGISwapChain`.
    Dxgi,
    /// Legacy OpenGL through `wglSwapBuffers`.
    OpenGl,
}

impl Backend {
    /// Module whose presence means the host may present through this back-end.
    pub fn probe_module(&self) -> &'static str {
        match self {
            Backend::Dxgi => "dxgi.dll",
            Backend::OpenGl => "opengl32.dll",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Dxgi => f.write_str("dxgi"),
            Backend::OpenGl => f.write_str("opengl"),
        }
    }
}

/// Back-ends whose probe module `is_loaded`, in install order. The host may load both (a
/// Direct3D UI next to an OpenGL renderer), in which case both are hooked and whichever
/// presents draws.
pub fn detect_backends(is_loaded: impl Fn(&str) -> bool) -> Vec<Backend> {
    [Backend::Dxgi, Backend::OpenGl]
        .into_iter()
        .filter(|b| is_loaded(b.probe_module()))
        .collect()
}
