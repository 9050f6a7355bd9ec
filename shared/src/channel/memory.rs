//! In-process transport with the same blocking semantics as the named pipe.
//!
//! A `MemoryNetwork` plays the role of the pipe namespace: connectors dial it, acceptors take
//! the server halves, and tests can flip it offline to simulate a missing listener.

use super::{Acceptor, Connection, Connector};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(5);

/// One end of an in-memory duplex connection.
pub struct MemoryConnection {
    inbound: Receiver<Vec<u8>>,
    outbound: Mutex<Option<Sender<Vec<u8>>>>,
    leftover: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

/// Two connected ends.
pub fn pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, a_rx) = unbounded();
    let (b_tx, b_rx) = unbounded();
    (MemoryConnection::new(a_rx, b_tx), MemoryConnection::new(b_rx, a_tx))
}

impl MemoryConnection {
    fn new(inbound: Receiver<Vec<u8>>, outbound: Sender<Vec<u8>>) -> Self {
        Self {
            inbound,
            outbound: Mutex::new(Some(outbound)),
            leftover: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn take_leftover(&self, buf: &mut [u8]) -> usize {
        let mut leftover = self.leftover.lock().unwrap_or_else(|p| p.into_inner());
        let n = leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&leftover[..n]);
        leftover.drain(..n);
        n
    }
}

impl Connection for MemoryConnection {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(io::ErrorKind::ConnectionAborted.into());
            }
            let n = self.take_leftover(buf);
            if n > 0 {
                return Ok(n);
            }
            match self.inbound.recv_timeout(POLL) {
                Ok(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.leftover
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .extend_from_slice(&chunk[n..]);
                    }
                    return Ok(n);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let outbound = self.outbound.lock().unwrap_or_else(|p| p.into_inner());
        match outbound.as_ref() {
            Some(tx) => tx
                .send(data.to_vec())
                .map(|_| data.len())
                .map_err(|_| io::ErrorKind::BrokenPipe.into()),
            None => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.outbound.lock().unwrap_or_else(|p| p.into_inner()).take();
    }
}

struct NetworkInner {
    online: AtomicBool,
    attempts: AtomicUsize,
    incoming_tx: Sender<MemoryConnection>,
    incoming_rx: Receiver<MemoryConnection>,
}

/// Stand-in for the named-pipe namespace.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = unbounded();
        Self {
            inner: Arc::new(NetworkInner {
                online: AtomicBool::new(true),
                attempts: AtomicUsize::new(0),
                incoming_tx,
                incoming_rx,
            }),
        }
    }

    /// While offline every dial fails as if no listener existed.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Number of dial attempts so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Client side: returns the client half and queues the server half for an acceptor.
    pub fn dial(&self) -> io::Result<MemoryConnection> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.inner.online.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::NotFound.into());
        }
        let (client, server) = pair();
        self.inner
            .incoming_tx
            .send(server)
            .map_err(|_| io::Error::from(io::ErrorKind::NotConnected))?;
        Ok(client)
    }

    /// Server side without an endpoint: takes the next dialed server half.
    pub fn accept_raw(&self, timeout: Duration) -> Option<MemoryConnection> {
        self.inner.incoming_rx.recv_timeout(timeout).ok()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { net: self.clone() }
    }

    pub fn acceptor(&self) -> MemoryAcceptor {
        MemoryAcceptor { net: self.clone(), interrupted: AtomicBool::new(false) }
    }
}

pub struct MemoryConnector {
    net: MemoryNetwork,
}

impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    fn connect(&self, _timeout: Duration) -> io::Result<MemoryConnection> {
        self.net.dial()
    }
}

pub struct MemoryAcceptor {
    net: MemoryNetwork,
    interrupted: AtomicBool,
}

impl Acceptor for MemoryAcceptor {
    type Conn = MemoryConnection;

    fn accept(&self) -> io::Result<MemoryConnection> {
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                return Err(io::ErrorKind::Interrupted.into());
            }
            match self.net.inner.incoming_rx.recv_timeout(POLL) {
                Ok(conn) => return Ok(conn),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(io::ErrorKind::NotConnected.into()),
            }
        }
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

/// Polls `pred` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_duplex_and_splits_large_chunks() {
        let (a, b) = pair();
        a.write(b"hello world").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(b.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        let mut rest = [0u8; 16];
        assert_eq!(b.read(&mut rest).unwrap(), 6);
        assert_eq!(&rest[..6], b" world");

        b.write(b"back").unwrap();
        assert_eq!(a.read(&mut rest).unwrap(), 4);
    }

    #[test]
    fn shutdown_unblocks_reader_and_signals_peer() {
        let (a, b) = pair();
        let a = Arc::new(a);
        let reader = {
            let a = Arc::clone(&a);
            std::thread::spawn(move || a.read(&mut [0u8; 8]))
        };
        std::thread::sleep(Duration::from_millis(20));
        a.shutdown();
        assert!(reader.join().unwrap().is_err());
        assert_eq!(b.read(&mut [0u8; 8]).unwrap(), 0);
        assert!(a.write(b"x").is_err());
    }
}
