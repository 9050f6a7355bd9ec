use super::{Acceptor, ChannelState, Connection, Connector, LineDecoder, MessageHandler};
use crate::constants::{
    ACCEPT_RETRY_INTERVAL, CHANNEL_BUFFER_SIZE, CONNECT_TIMEOUT, READER_JOIN_TIMEOUT,
    RECONNECT_INTERVAL,
};
use crate::errors::ChannelError;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Timing knobs for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: RECONNECT_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
            join_timeout: READER_JOIN_TIMEOUT,
        }
    }
}

/// State shared between the owning endpoint and its reader thread.
struct Shared<C> {
    state: AtomicU8,
    running: AtomicBool,
    current: Mutex<Option<Arc<C>>>,
}

impl<C: Connection> Shared<C> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ChannelState::Disconnected as u8),
            running: AtomicBool::new(true),
            current: Mutex::new(None),
        }
    }

    fn set_state(&self, state: ChannelState) {
        // Closing is terminal; the reader thread must not overwrite it on its way out.
        let _ = self.state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
            (cur != ChannelState::Closing as u8).then_some(state as u8)
        });
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<C>>> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn connection(&self) -> Option<Arc<C>> {
        self.slot().clone()
    }

    /// Publishes a fresh connection. Returns false if the endpoint is closing, in which case the
    /// connection has already been shut down.
    fn install(&self, conn: Arc<C>) -> bool {
        *self.slot() = Some(Arc::clone(&conn));
        if !self.running() {
            self.slot().take();
            conn.shutdown();
            return false;
        }
        self.set_state(ChannelState::Connected);
        true
    }

    fn retire(&self) {
        if let Some(conn) = self.slot().take() {
            conn.shutdown();
        }
    }
}

/// One side of the bridge channel.
///
/// Created either as a connector (controller) that reconnects forever, or as a listener
/// (injected module) that accepts forever. Dropping the endpoint closes it.
pub struct ChannelEndpoint<C: Connection> {
    name: String,
    shared: Arc<Shared<C>>,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    worker: Option<JoinHandle<()>>,
    interrupt: Option<Box<dyn Fn() + Send + Sync>>,
    join_timeout: Duration,
}

impl<C: Connection> ChannelEndpoint<C> {
    /// Starts a connector endpoint. The reader thread keeps trying to connect, backing off
    /// `reconnect_interval` between attempts, and restarts from scratch after a broken channel.
    pub fn connect<K>(
        name: &str,
        connector: K,
        options: ChannelOptions,
        handler: MessageHandler,
    ) -> Result<Self, ChannelError>
    where
        K: Connector<Conn = C>,
    {
        let shared = Arc::new(Shared::new());
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker_shared = Arc::clone(&shared);
        let worker_name = name.to_string();
        let worker = thread::Builder::new()
            .name("channel_connector".into())
            .spawn(move || {
                connector_loop(&worker_name, &connector, &worker_shared, options, &stop_rx, &handler);
                let _ = done_tx.send(());
            })
            .map_err(|source| ChannelError::Spawn { name: "channel_connector".into(), source })?;

        Ok(Self {
            name: name.to_string(),
            shared,
            stop_tx,
            done_rx,
            worker: Some(worker),
            interrupt: None,
            join_timeout: options.join_timeout,
        })
    }

    /// Starts a listener endpoint. The reader thread accepts one connector at a time and goes back
    /// to accepting when it disconnects.
    pub fn listen<A>(
        name: &str,
        acceptor: A,
        options: ChannelOptions,
        handler: MessageHandler,
    ) -> Result<Self, ChannelError>
    where
        A: Acceptor<Conn = C>,
    {
        let shared = Arc::new(Shared::new());
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let acceptor = Arc::new(acceptor);

        let worker_shared = Arc::clone(&shared);
        let worker_acceptor = Arc::clone(&acceptor);
        let worker_name = name.to_string();
        let worker = thread::Builder::new()
            .name("channel_listener".into())
            .spawn(move || {
                listener_loop(&worker_name, worker_acceptor.as_ref(), &worker_shared, &stop_rx, &handler);
                let _ = done_tx.send(());
            })
            .map_err(|source| ChannelError::Spawn { name: "channel_listener".into(), source })?;

        Ok(Self {
            name: name.to_string(),
            shared,
            stop_tx,
            done_rx,
            worker: Some(worker),
            interrupt: Some(Box::new(move || acceptor.interrupt())),
            join_timeout: options.join_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Fire-and-forget write of one message plus delimiter. True iff the transport accepted the
    /// whole frame. While disconnected the message is dropped, never queued.
    pub fn send(&self, message: &str) -> bool {
        let Some(conn) = self.shared.connection() else {
            return false;
        };
        let frame = encode_frame(message);
        match conn.write(&frame) {
            Ok(n) if n == frame.len() => true,
            Ok(n) => {
                debug!("short write on `{}`: {n} of {} bytes", self.name, frame.len());
                false
            }
            Err(e) => {
                debug!("write on `{}` failed: {e}", self.name);
                false
            }
        }
    }

    /// Stops the reader thread and closes the underlying connection exactly once. The thread is
    /// joined for at most `join_timeout`; after that it is abandoned.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.state.store(ChannelState::Closing as u8, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(interrupt) = &self.interrupt {
            interrupt();
        }
        self.shared.retire();
        let _ = self.stop_tx.try_send(());

        match self.done_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                debug!("channel `{}` reader joined", self.name);
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("channel `{}` reader did not stop within {:?}; abandoning it", self.name, self.join_timeout);
            }
        }
        self.shared.state.store(ChannelState::Disconnected as u8, Ordering::SeqCst);
        info!("channel `{}` closed", self.name);
    }
}

impl<C: Connection> Drop for ChannelEndpoint<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Embedded newlines would split the frame on the other side; they are flattened to spaces.
fn encode_frame(message: &str) -> Vec<u8> {
    let body = message.trim_end_matches(['\r', '\n']);
    let mut frame = Vec::with_capacity(body.len() + 1);
    frame.extend(body.bytes().map(|b| if b == b'\n' || b == b'\r' { b' ' } else { b }));
    frame.push(b'\n');
    frame
}

/// Waits for `interval` or a stop signal. Returns false when the endpoint should stop.
fn backoff(stop_rx: &Receiver<()>, interval: Duration) -> bool {
    matches!(stop_rx.recv_timeout(interval), Err(RecvTimeoutError::Timeout))
}

/// Reads until the connection breaks, dispatching each complete message.
fn pump<C: Connection>(conn: &C, running: &AtomicBool, handler: &MessageHandler) -> io::Result<()> {
    let mut decoder = LineDecoder::new();
    let mut buf = vec![0u8; CHANNEL_BUFFER_SIZE];
    while running.load(Ordering::SeqCst) {
        let n = conn.read(&mut buf)?;
        if n == 0 {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        for line in decoder.push(&buf[..n]) {
            handler(&line);
        }
    }
    Ok(())
}

fn connector_loop<K: Connector>(
    name: &str,
    connector: &K,
    shared: &Shared<K::Conn>,
    options: ChannelOptions,
    stop_rx: &Receiver<()>,
    handler: &MessageHandler,
) {
    while shared.running() {
        shared.set_state(ChannelState::Disconnected);
        match connector.connect(options.connect_timeout) {
            Ok(conn) => {
                let conn = Arc::new(conn);
                if !shared.install(Arc::clone(&conn)) {
                    break;
                }
                info!("connected to channel `{name}`");
                match pump(conn.as_ref(), &shared.running, handler) {
                    Ok(()) => {}
                    Err(e) if shared.running() => warn!("channel `{name}` broken: {e}; reconnecting"),
                    Err(_) => {}
                }
                shared.retire();
                shared.set_state(ChannelState::Disconnected);
            }
            Err(e) => debug!("connect to `{name}` failed: {e}"),
        }
        if !backoff(stop_rx, options.reconnect_interval) {
            break;
        }
    }
    shared.set_state(ChannelState::Disconnected);
}

fn listener_loop<A: Acceptor>(
    name: &str,
    acceptor: &A,
    shared: &Shared<A::Conn>,
    stop_rx: &Receiver<()>,
    handler: &MessageHandler,
) {
    while shared.running() {
        shared.set_state(ChannelState::Listening);
        match acceptor.accept() {
            Ok(conn) => {
                let conn = Arc::new(conn);
                if !shared.install(Arc::clone(&conn)) {
                    break;
                }
                info!("connector attached to `{name}`");
                match pump(conn.as_ref(), &shared.running, handler) {
                    Ok(()) => {}
                    Err(e) if shared.running() => info!("connector left `{name}`: {e}"),
                    Err(_) => {}
                }
                shared.retire();
            }
            Err(e) if shared.running() => {
                warn!("accept on `{name}` failed: {e}");
                if !backoff(stop_rx, ACCEPT_RETRY_INTERVAL) {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    shared.set_state(ChannelState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory::{MemoryConnection, MemoryNetwork};
    use crossbeam::channel::unbounded;
    use std::time::Instant;

    fn fast() -> ChannelOptions {
        ChannelOptions {
            reconnect_interval: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(20),
            join_timeout: Duration::from_secs(2),
        }
    }

    fn collector() -> (MessageHandler, Receiver<String>) {
        let (tx, rx) = unbounded();
        (Arc::new(move |line: &str| { let _ = tx.send(line.to_string()); }), rx)
    }

    fn wait_until(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn read_line(conn: &MemoryConnection) -> String {
        let mut decoder = LineDecoder::new();
        let mut buf = [0u8; 256];
        loop {
            let n = conn.read(&mut buf).expect("peer read");
            if let Some(line) = decoder.push(&buf[..n]).into_iter().next() {
                return line;
            }
        }
    }

    #[test]
    fn send_while_disconnected_is_dropped() {
        let net = MemoryNetwork::new();
        let (handler, _rx) = collector();
        let ep = ChannelEndpoint::connect("t", net.connector(), fast(), handler).unwrap();
        assert!(!ep.send("lost"));
        assert_eq!(ep.state(), ChannelState::Disconnected);
    }

    #[test]
    fn connector_retries_until_listener_appears() {
        let net = MemoryNetwork::new();
        net.set_online(false);
        let (handler, rx) = collector();
        let ep = ChannelEndpoint::connect("t", net.connector(), fast(), handler).unwrap();

        assert!(wait_until(|| net.attempts() >= 3));
        assert!(!ep.is_connected());

        net.set_online(true);
        let server = net.accept_raw(Duration::from_secs(3)).expect("connector attached");
        assert!(wait_until(|| ep.is_connected()));

        server.write(b"{\"type\":\"gameState\",\"frame\":120}\n").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), r#"{"type":"gameState","frame":120}"#);

        assert!(ep.send("hello"));
        assert_eq!(read_line(&server), "hello");
    }

    #[test]
    fn reconnects_without_replaying_dropped_messages() {
        let net = MemoryNetwork::new();
        let (handler, _rx) = collector();
        let ep = ChannelEndpoint::connect("t", net.connector(), fast(), handler).unwrap();

        let first = net.accept_raw(Duration::from_secs(3)).expect("first session");
        assert!(wait_until(|| ep.is_connected()));

        net.set_online(false);
        first.shutdown();
        drop(first);
        assert!(wait_until(|| !ep.is_connected()));
        assert!(!ep.send("during outage"));

        let before = net.attempts();
        assert!(wait_until(|| net.attempts() >= before + 2));

        net.set_online(true);
        let second = net.accept_raw(Duration::from_secs(3)).expect("second session");
        assert!(wait_until(|| ep.is_connected()));
        assert!(ep.send("after"));
        assert_eq!(read_line(&second), "after");
    }

    #[test]
    fn listener_accepts_again_after_disconnect() {
        let net = MemoryNetwork::new();
        let (handler, rx) = collector();
        let listener = ChannelEndpoint::listen("t", net.acceptor(), fast(), handler).unwrap();
        assert!(wait_until(|| listener.state() == ChannelState::Listening));

        let client = net.dial().expect("dial");
        client.write(b"one\n").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "one");
        client.shutdown();
        drop(client);
        assert!(wait_until(|| listener.state() == ChannelState::Listening));

        let client = net.dial().expect("dial again");
        client.write(b"two\n").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "two");
        assert!(wait_until(|| listener.is_connected()));
        assert!(listener.send("to client"));
        assert_eq!(read_line(&client), "to client");
    }

    #[test]
    fn close_is_idempotent_and_unblocks_reader() {
        let net = MemoryNetwork::new();
        let (handler, _rx) = collector();
        let mut listener = ChannelEndpoint::listen("t", net.acceptor(), fast(), handler).unwrap();
        let _client = net.dial().expect("dial");
        assert!(wait_until(|| listener.is_connected()));

        let started = Instant::now();
        listener.close();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(listener.state(), ChannelState::Disconnected);
        assert!(!listener.send("after close"));
        listener.close();
    }

    #[test]
    fn frames_flatten_embedded_newlines() {
        assert_eq!(encode_frame("a\nb\r\n"), b"a b\n".to_vec());
        assert_eq!(encode_frame(""), b"\n".to_vec());
    }
}
