//! Kernel handle ownership and string conversion for the Win32 back-ends on both sides.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};

/// NUL-terminated UTF-16 copy of `s`.
pub fn wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(Some(0)).collect()
}

/// RAII wrapper for a kernel handle, closed exactly once on drop.
#[derive(Debug)]
pub struct OwnedHandle(HANDLE);

// SAFETY: kernel handle values are process-wide.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl OwnedHandle {
    /// Takes ownership of `raw`; `None` for null or `INVALID_HANDLE_VALUE`.
    pub fn new(raw: HANDLE) -> Option<Self> {
        (!raw.is_null() && raw != INVALID_HANDLE_VALUE).then_some(Self(raw))
    }

    pub fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use windows_sys::Win32::System::Threading::CreateEventW;

    #[test]
    fn sentinel_values_are_not_owned() {
        assert!(OwnedHandle::new(ptr::null_mut()).is_none());
        assert!(OwnedHandle::new(INVALID_HANDLE_VALUE).is_none());
    }

    #[test]
    fn owns_a_real_handle() {
        let raw = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
        let handle = OwnedHandle::new(raw).unwrap();
        assert_eq!(handle.raw(), raw);
    }

    #[test]
    fn wide_is_nul_terminated() {
        assert_eq!(wide(OsStr::new("ab")), vec![u16::from(b'a'), u16::from(b'b'), 0]);
    }
}
