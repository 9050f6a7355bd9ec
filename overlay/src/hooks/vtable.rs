use super::PresentationHook;
use log::{debug, warn};
use shared::errors::HookError;
use std::ffi::c_void;
use std::{mem, ptr};

/// Page protection changes around a patch.
pub trait PageProtect: Send {
    /// Makes `len` bytes at `addr` writable and returns the previous protection.
    ///
    /// # Safety
    /// `addr..addr+len` must be mapped.
    unsafe fn unprotect(&self, addr: *mut c_void, len: usize) -> Result<u32, String>;

    /// Puts back a protection returned by [`PageProtect::unprotect`].
    ///
    /// # Safety
    /// Same range as the matching `unprotect`.
    unsafe fn reprotect(&self, addr: *mut c_void, len: usize, previous: u32);
}

/// Swaps one function pointer in a vtable.
pub struct VtableHook<P> {
    pages: P,
    slot: *mut *const c_void,
    original: *const c_void,
    replacement: *const c_void,
}

// Only raw addresses inside loaded modules; the hook owns no memory.
unsafe impl<P: Send> Send for VtableHook<P> {}

impl<P: PageProtect> VtableHook<P> {
    pub fn new(pages: P) -> Self {
        Self { pages, slot: ptr::null_mut(), original: ptr::null(), replacement: ptr::null() }
    }

    /// Address the slot held before the patch.
    pub fn original(&self) -> *const c_void {
        self.original
    }

    unsafe fn write_slot(&self, value: *const c_void) -> Result<(), HookError> {
        unsafe {
            let len = mem::size_of::<*const c_void>();
            let previous = self
                .pages
                .unprotect(self.slot.cast(), len)
                .map_err(|reason| HookError::Patch { target: self.slot as usize, reason })?;
            ptr::write_volatile(self.slot, value);
            self.pages.reprotect(self.slot.cast(), len, previous);
        }
        Ok(())
    }
}

impl<P: PageProtect> PresentationHook for VtableHook<P> {
    /// `target` is the address of the vtable slot, not of the function.
    unsafe fn install(&mut self, target: *const c_void, replacement: *const c_void) -> Result<*const c_void, HookError> {
        if self.is_installed() {
            return Err(HookError::AlreadyInstalled);
        }
        if target.is_null() || replacement.is_null() {
            return Err(HookError::Resolve { what: "vtable slot", reason: "null address".into() });
        }
        let slot = target as *mut *const c_void;
        unsafe {
            let original = ptr::read_volatile(slot);
            if original == replacement {
                return Err(HookError::AlreadyInstalled);
            }
            self.slot = slot;
            self.replacement = replacement;
            if let Err(e) = self.write_slot(replacement) {
                self.slot = ptr::null_mut();
                return Err(e);
            }
            self.original = original;
        }
        debug!("vtable slot {:#x}: {:#x} -> {:#x}", slot as usize, self.original as usize, replacement as usize);
        Ok(self.original)
    }

    unsafe fn uninstall(&mut self) -> Result<(), HookError> {
        if !self.is_installed() {
            return Err(HookError::NotInstalled);
        }
        unsafe {
            let current = ptr::read_volatile(self.slot);
            if current != self.replacement {
                warn!("vtable slot {:#x} was re-patched by someone else; leaving it", self.slot as usize);
                return Err(HookError::Patch { target: self.slot as usize, reason: "slot no longer points at the hook".into() });
            }
            self.write_slot(self.original)?;
        }
        self.slot = ptr::null_mut();
        Ok(())
    }

    fn is_installed(&self) -> bool {
        !self.slot.is_null()
    }
}

/// `VirtualProtect` to read-write-execute and back.
#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualProtectPages;

#[cfg(windows)]
impl PageProtect for VirtualProtectPages {
    unsafe fn unprotect(&self, addr: *mut c_void, len: usize) -> Result<u32, String> {
        use windows::Win32::System::Memory::{PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS, VirtualProtect};

        let mut old = PAGE_PROTECTION_FLAGS::default();
        unsafe { VirtualProtect(addr, len, PAGE_EXECUTE_READWRITE, &mut old) }
            .map_err(|e| format!("VirtualProtect failed: {e}"))?;
        Ok(old.0)
    }

    unsafe fn reprotect(&self, addr: *mut c_void, len: usize, previous: u32) {
        use windows::Win32::System::Memory::{PAGE_PROTECTION_FLAGS, VirtualProtect};

        let mut tmp = PAGE_PROTECTION_FLAGS::default();
        if let Err(e) = unsafe { VirtualProtect(addr, len, PAGE_PROTECTION_FLAGS(previous), &mut tmp) } {
            warn!("restoring page protection at {:#x} failed: {e}", addr as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default, Clone)]
    struct CountingPages {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl PageProtect for CountingPages {
        unsafe fn unprotect(&self, _addr: *mut c_void, _len: usize) -> Result<u32, String> {
            if self.fail {
                return Err("denied".into());
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0x20)
        }

        unsafe fn reprotect(&self, _addr: *mut c_void, _len: usize, previous: u32) {
            assert_eq!(previous, 0x20);
        }
    }

    extern "C" fn one() -> u32 {
        1
    }

    extern "C" fn two() -> u32 {
        2
    }

    fn call(table: &[*const c_void; 3], slot: usize) -> u32 {
        let f: extern "C" fn() -> u32 = unsafe { mem::transmute(table[slot]) };
        f()
    }

    #[test]
    fn patches_and_restores_one_slot() {
        let mut table: [*const c_void; 3] = [one as *const c_void; 3];
        let pages = CountingPages::default();
        let mut hook = VtableHook::new(pages.clone());

        let slot = &mut table[1] as *mut *const c_void as *const c_void;
        let original = unsafe { hook.install(slot, two as *const c_void) }.unwrap();
        assert_eq!(original, one as *const c_void);
        assert_eq!(hook.original(), original);
        assert!(hook.is_installed());
        assert_eq!((call(&table, 0), call(&table, 1), call(&table, 2)), (1, 2, 1));

        unsafe { hook.uninstall() }.unwrap();
        assert!(!hook.is_installed());
        assert_eq!(call(&table, 1), 1);
        assert_eq!(pages.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn double_install_and_uninstall_are_rejected() {
        let mut table: [*const c_void; 3] = [one as *const c_void; 3];
        let mut hook = VtableHook::new(CountingPages::default());
        let slot = &mut table[0] as *mut *const c_void as *const c_void;

        assert!(matches!(unsafe { hook.uninstall() }, Err(HookError::NotInstalled)));
        unsafe { hook.install(slot, two as *const c_void) }.unwrap();
        assert!(matches!(unsafe { hook.install(slot, two as *const c_void) }, Err(HookError::AlreadyInstalled)));
        unsafe { hook.uninstall() }.unwrap();
    }

    #[test]
    fn failed_protection_change_leaves_slot_alone() {
        let mut table: [*const c_void; 3] = [one as *const c_void; 3];
        let mut hook = VtableHook::new(CountingPages { fail: true, ..Default::default() });
        let slot = &mut table[2] as *mut *const c_void as *const c_void;

        let err = unsafe { hook.install(slot, two as *const c_void) }.unwrap_err();
        assert!(matches!(err, HookError::Patch { .. }));
        assert!(!hook.is_installed());
        assert_eq!(call(&table, 2), 1);
    }

    #[test]
    fn re_patched_slot_is_left_in_place() {
        let mut table: [*const c_void; 3] = [one as *const c_void; 3];
        let mut hook = VtableHook::new(CountingPages::default());
        let slot = &mut table[1] as *mut *const c_void;

        unsafe { hook.install(slot as *const c_void, two as *const c_void) }.unwrap();
        table[1] = one as *const c_void;
        assert!(matches!(unsafe { hook.uninstall() }, Err(HookError::Patch { .. })));
        assert!(hook.is_installed());
    }
}
