//! Per-thread re-entrancy guard for presentation detours.
//!
//! Drawing may call back into the hooked API (a nested `Present` from another layer, a driver
//! calling `wglSwapBuffers` on our behalf). A raw Win32 TLS slot marks "already inside a detour"
//! on the current thread; the nested call then goes straight to the original.

use core::ffi::c_void;
use once_cell::sync::Lazy;
use std::marker::PhantomData;
use windows::Win32::System::Threading::{TLS_OUT_OF_INDEXES, TlsAlloc, TlsGetValue, TlsSetValue};

static TLS_SLOT: Lazy<u32> = Lazy::new(|| unsafe { TlsAlloc() });

/// Non-null marker; never dereferenced.
const SENTINEL: *const c_void = 1_usize as *const c_void;

/// Held while a detour runs its own code. Not `Send`: it belongs to the entering thread.
pub struct CallGuard {
    _thread_bound: PhantomData<*const ()>,
}

impl CallGuard {
    /// `None` when this thread is already inside a detour, or when no TLS slot could be allocated.
    #[inline]
    pub fn enter() -> Option<Self> {
        let idx = *TLS_SLOT;
        if idx == TLS_OUT_OF_INDEXES {
            return None;
        }
        unsafe {
            if !TlsGetValue(idx).is_null() {
                return None;
            }
            TlsSetValue(idx, Some(SENTINEL)).ok()?;
        }
        Some(Self { _thread_bound: PhantomData })
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = TlsSetValue(*TLS_SLOT, None);
        }
    }
}
