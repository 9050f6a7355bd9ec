use std::time::Duration;

/// Well-known name of the bridge channel. Both endpoints derive the pipe path from it.
pub const CHANNEL_NAME: &str = "CoachBridgeOverlay";

/// Read/write buffer size used by both channel endpoints.
pub const CHANNEL_BUFFER_SIZE: usize = 4096;

/// Frames are newline-delimited UTF-8 text.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Upper bound for a single frame still waiting for its delimiter.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Fixed backoff between connector attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Bounded wait for the listener to become available on each connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before the listener retries a failed accept.
pub const ACCEPT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// How long `close()` waits for a reader thread before abandoning it.
pub const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the controller-side GameEvent ring.
pub const EVENT_RING_CAPACITY: usize = 100;

/// Default number of events returned by `recent_events`.
pub const DEFAULT_RECENT_EVENTS: usize = 10;

pub const MAX_PLAYERS: usize = 4;

/// Default on-screen lifetime of an overlay message.
pub const DEFAULT_MESSAGE_DURATION: Duration = Duration::from_millis(5000);

/// Fraction of a message's lifetime after which it starts fading out.
pub const FADE_START_FRACTION: f32 = 0.8;

pub const DEFAULT_TRANSPARENCY: f32 = 0.8;

/// File name of the injected helper module.
pub const OVERLAY_MODULE_NAME: &str = "overlay.dll";

/// Export of the helper module that stops its threads ahead of an unload.
pub const MODULE_SHUTDOWN_EXPORT: &str = "bridge_shutdown";

/// How long the controller waits for that export to return.
pub const MODULE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Secondary lookup directory for the helper module, relative to the working directory.
pub const OVERLAY_FALLBACK_DIR: &str = "build";

/// Discovery and embedding lifecycle poll period.
pub const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause before retrying a failed injection into the same process.
pub const INJECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum spacing between synchronized repaints of an embedded window.
pub const REPAINT_THROTTLE: Duration = Duration::from_millis(2000);

/// Companion overlay window tracking period (~20 Hz).
pub const TRACKING_INTERVAL: Duration = Duration::from_millis(50);

/// Returns the full named-pipe path for a channel name.
pub fn pipe_path(name: &str) -> String {
    format!(r"\\.\pipe\{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_path_uses_local_namespace() {
        assert_eq!(pipe_path(CHANNEL_NAME), r"\\.\pipe\CoachBridgeOverlay");
    }
}
