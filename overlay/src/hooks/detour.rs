use super::PresentationHook;
use log::debug;
use retour::RawDetour;
use shared::errors::HookError;
use std::ffi::c_void;

/// Inline trampoline on a function entry point.
#[derive(Default)]
pub struct TrampolineHook {
    detour: Option<RawDetour>,
}

// The detour only holds addresses into loaded code and its own trampoline allocation.
unsafe impl Send for TrampolineHook {}

impl TrampolineHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresentationHook for TrampolineHook {
    /// `target` is the function entry point.
    unsafe fn install(&mut self, target: *const c_void, replacement: *const c_void) -> Result<*const c_void, HookError> {
        if self.detour.is_some() {
            return Err(HookError::AlreadyInstalled);
        }
        if target.is_null() || replacement.is_null() {
            return Err(HookError::Resolve { what: "entry point", reason: "null address".into() });
        }
        let patch_err = |e: retour::Error| HookError::Patch { target: target as usize, reason: e.to_string() };
        let detour = unsafe { RawDetour::new(target.cast(), replacement.cast()) }.map_err(patch_err)?;
        unsafe { detour.enable() }.map_err(patch_err)?;
        let trampoline = detour.trampoline() as *const () as *const c_void;
        debug!("trampoline hook on {:#x}, original reachable at {:#x}", target as usize, trampoline as usize);
        self.detour = Some(detour);
        Ok(trampoline)
    }

    unsafe fn uninstall(&mut self) -> Result<(), HookError> {
        let detour = self.detour.take().ok_or(HookError::NotInstalled)?;
        if let Err(e) = unsafe { detour.disable() } {
            let reason = e.to_string();
            // Keep it so the trampoline stays allocated while the patch is live.
            self.detour = Some(detour);
            return Err(HookError::Patch { target: 0, reason });
        }
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.detour.as_ref().is_some_and(RawDetour::is_enabled)
    }
}
