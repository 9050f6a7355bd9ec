//! C entry points for code running inside the host (a game-side script bridge, a test harness).
//! All of them are no-ops returning `false` until the module finished bootstrapping.

use crate::module;
use log::{debug, info};
use std::ffi::{CStr, c_char, c_void};
use std::time::Duration;

/// Reads a NUL-terminated UTF-8 argument; invalid bytes are replaced.
unsafe fn text_arg<'a>(ptr: *const c_char) -> Option<std::borrow::Cow<'a, str>> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy())
}

/// Shows `text` for `duration_ms`, or for the configured duration when it is zero.
///
/// # Safety
/// `text` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn bridge_display_message(text: *const c_char, duration_ms: u32) -> bool {
    let (Some(rt), Some(text)) = (module::runtime(), unsafe { text_arg(text) }) else {
        return false;
    };
    let duration = (duration_ms > 0).then(|| Duration::from_millis(duration_ms.into()));
    rt.display_text(&text, duration);
    true
}

#[unsafe(no_mangle)]
pub extern "C" fn bridge_clear_messages() -> bool {
    match module::runtime() {
        Some(rt) => {
            rt.clear();
            true
        }
        None => false,
    }
}

/// Listening for the controller and enabled.
#[unsafe(no_mangle)]
pub extern "C" fn bridge_is_ready() -> bool {
    module::runtime().is_some_and(|rt| rt.is_ready())
}

/// Forwards one telemetry JSON line to the controller. False when it is not telemetry, repeats the
/// previous state frame, or no controller is connected.
///
/// # Safety
/// `json` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn bridge_publish_telemetry(json: *const c_char) -> bool {
    let (Some(rt), Some(json)) = (module::runtime(), unsafe { text_arg(json) }) else {
        return false;
    };
    let sent = rt.publish_telemetry(&json);
    if !sent {
        debug!("telemetry not forwarded");
    }
    sent
}

/// Stops the module: hooks removed, companion window and listener closed. The controller runs this
/// on a remote thread before unloading, so every join happens outside the loader lock. Returns 0
/// when bootstrap has not created the runtime yet.
#[unsafe(no_mangle)]
pub extern "system" fn bridge_shutdown(_param: *mut c_void) -> u32 {
    let Some(rt) = module::runtime() else {
        return 0;
    };
    info!("shutdown requested by the controller");
    rt.shutdown();
    1
}
