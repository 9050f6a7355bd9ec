use log::{debug, trace};
use shared::protocol::TelemetryFrame;
use shared::telemetry::StateUpdate;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Module-side half of the telemetry flow: checks what in-process instrumentation publishes and
/// rewrites it into canonical frames for the controller.
#[derive(Debug, Default)]
pub struct TelemetryRelay {
    forwarded: AtomicU64,
    rejected: AtomicU64,
    last_frame: Mutex<Option<u64>>,
}

impl TelemetryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical line for `raw`, or `None` when it is not telemetry or repeats the state frame
    /// already forwarded.
    pub fn prepare(&self, raw: &str) -> Option<String> {
        let Some(frame) = TelemetryFrame::parse(raw) else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!("not a telemetry frame: `{}`", raw.trim());
            return None;
        };
        if let TelemetryFrame::State(StateUpdate { frame: n, .. }) = &frame {
            let mut last = self.last_frame.lock().unwrap_or_else(|p| p.into_inner());
            if *last == Some(*n) {
                trace!("state frame {n} already forwarded");
                return None;
            }
            *last = Some(*n);
        }
        Some(frame.to_line())
    }

    /// Counts one frame the channel accepted.
    pub fn record_sent(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Forgets the last state frame, so a new connection gets the next one even if it repeats.
    pub fn reset(&self) {
        *self.last_frame.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
