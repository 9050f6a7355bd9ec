//! Named, duplex, message-oriented channel between the controller and the injected module.
//!
//! The endpoint logic is transport-agnostic: it drives a [`Connector`] (controller side) or an
//! [`Acceptor`] (module side) and owns one reader thread per endpoint. The Windows named-pipe
//! transport lives in `pipe`; `memory` provides an in-process transport for tests.

mod endpoint;
mod framing;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
#[cfg(windows)]
mod pipe;

pub use endpoint::{ChannelEndpoint, ChannelOptions};
pub use framing::LineDecoder;
#[cfg(windows)]
pub use pipe::{PipeConnection, PipeConnector, PipeListener};

use std::io;
use std::sync::Arc;
use std::time::Duration;

/// One live connection. All methods take `&self`: the reader thread blocks in `read` while other
/// threads `write`, and `shutdown` must unblock a pending `read`.
pub trait Connection: Send + Sync + 'static {
    /// Blocks until bytes arrive. `Ok(0)` means the peer closed the connection.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&self, data: &[u8]) -> io::Result<usize>;

    /// Cancels pending I/O. Idempotent; later calls to `read`/`write` fail.
    fn shutdown(&self);
}

/// Opens connections to a listener by name.
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    /// Waits at most `timeout` for the listener to become available.
    fn connect(&self, timeout: Duration) -> io::Result<Self::Conn>;
}

/// Accepts connections on a named channel.
pub trait Acceptor: Send + Sync + 'static {
    type Conn: Connection;

    /// Blocks until a connector attaches.
    fn accept(&self) -> io::Result<Self::Conn>;

    /// Unblocks a pending `accept`.
    fn interrupt(&self);
}

/// Receives every complete message, on the endpoint's reader thread.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Disconnected = 0,
    Listening = 1,
    Connected = 2,
    Closing = 3,
}

impl ChannelState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ChannelState::Listening,
            2 => ChannelState::Connected,
            3 => ChannelState::Closing,
            _ => ChannelState::Disconnected,
        }
    }
}
