//! Console Ctrl+C / close handling for the headless controller.
//!
//! The handler hands the shutdown routine to a fresh thread. On console close the process dies as
//! soon as the handler returns, so that case waits for the routine, bounded by `CLOSE_GRACE`.
//! `TerminateProcess` skips all of this.

use crossbeam::channel::{bounded, Receiver, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use windows_sys::Win32::System::Console::{SetConsoleCtrlHandler, CTRL_CLOSE_EVENT, CTRL_C_EVENT};

/// Windows allows roughly five seconds after CTRL_CLOSE_EVENT.
const CLOSE_GRACE: Duration = Duration::from_millis(4500);

struct CleanupInner {
    fired: AtomicBool,
    cleanup: Arc<dyn Fn() + Send + Sync + 'static>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl CleanupInner {
    /// Runs the routine at most once, off the calling thread.
    fn fire_once(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let f = Arc::clone(&self.cleanup);
        let done_tx = self.done_tx.clone();
        let spawned = thread::Builder::new().name("console_cleanup".into()).spawn(move || {
            log::info!("running bridge shutdown");
            f();
            log::info!("bridge shutdown completed");
            let _ = done_tx.try_send(());
        });
        if let Err(e) = spawned {
            log::error!("cannot spawn shutdown thread: {e}");
        }
    }

    fn wait(&self, timeout: Duration) -> bool {
        self.done_rx.recv_timeout(timeout).is_ok()
    }
}

static CLEANUP_STATE: OnceLock<Arc<CleanupInner>> = OnceLock::new();

unsafe extern "system" fn console_handler(ctrl_type: u32) -> i32 {
    match ctrl_type {
        CTRL_C_EVENT => {
            if let Some(state) = CLEANUP_STATE.get() {
                state.fire_once();
            }
            1
        }
        CTRL_CLOSE_EVENT => {
            if let Some(state) = CLEANUP_STATE.get() {
                state.fire_once();
                if !state.wait(CLOSE_GRACE) {
                    log::warn!("bridge shutdown still running at console close");
                }
            }
            1
        }
        _ => 0,
    }
}

/// Runs `cleanup` once on Ctrl+C, on console close, on `trigger()` or on drop, whichever comes
/// first.
pub struct ConsoleCleanup {
    state: Arc<CleanupInner>,
}

impl ConsoleCleanup {
    /// Installs the console handler. Only the first instance per process is wired to it.
    pub fn new<F>(cleanup: F) -> io::Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (done_tx, done_rx) = bounded(1);
        let inner = Arc::new(CleanupInner {
            fired: AtomicBool::new(false),
            cleanup: Arc::new(cleanup),
            done_tx,
            done_rx,
        });
        let state = Arc::clone(CLEANUP_STATE.get_or_init(|| Arc::clone(&inner)));

        // SAFETY: `console_handler` is a plain `extern "system"` function valid for the whole process.
        if unsafe { SetConsoleCtrlHandler(Some(console_handler), 1) } == 0 {
            return Err(io::Error::last_os_error());
        }
        log::debug!("console handler installed");
        Ok(Self { state })
    }

    pub fn trigger(&self) {
        self.state.fire_once();
    }

    pub fn was_triggered(&self) -> bool {
        self.state.fired.load(Ordering::SeqCst)
    }
}

impl Drop for ConsoleCleanup {
    fn drop(&mut self) {
        self.state.fire_once();
    }
}
