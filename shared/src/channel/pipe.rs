//! Windows named-pipe transport.
//!
//! Handles are opened with `FILE_FLAG_OVERLAPPED`: a synchronous pipe handle serializes all I/O,
//! so a reader blocked in `ReadFile` would stall every `WriteFile` from other threads. Each call
//! still blocks its caller until completion; `shutdown` cancels whatever is pending.

use super::{Acceptor, Connection, Connector};
use crate::win32::{wide, OwnedHandle};
use crate::constants::{pipe_path, CHANNEL_BUFFER_SIZE};
use log::{debug, info};
use std::ffi::OsStr;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_IO_PENDING, ERROR_MORE_DATA, ERROR_PIPE_CONNECTED, GENERIC_READ,
    GENERIC_WRITE, HANDLE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, WriteFile, FILE_FLAG_OVERLAPPED, OPEN_EXISTING, PIPE_ACCESS_DUPLEX,
};
use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, SetNamedPipeHandleState,
    WaitNamedPipeW, PIPE_READMODE_MESSAGE, PIPE_TYPE_MESSAGE, PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
};
use windows_sys::Win32::System::Threading::CreateEventW;

fn manual_reset_event() -> io::Result<OwnedHandle> {
    let event = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
    OwnedHandle::new(event).ok_or_else(io::Error::last_os_error)
}

/// Runs one overlapped operation to completion and returns the byte count.
///
/// A message larger than the read buffer completes with `ERROR_MORE_DATA`; the partial read is
/// returned and the rest arrives on the next call, where the line decoder stitches it together.
fn run_overlapped<F>(handle: HANDLE, op: F) -> io::Result<u32>
where
    F: FnOnce(*mut OVERLAPPED) -> i32,
{
    let event = manual_reset_event()?;
    let mut ov: OVERLAPPED = unsafe { std::mem::zeroed() };
    ov.hEvent = event.raw();

    if op(&mut ov) == 0 {
        let code = unsafe { GetLastError() };
        if code != ERROR_IO_PENDING && code != ERROR_MORE_DATA {
            return Err(io::Error::from_raw_os_error(code as i32));
        }
    }

    let mut transferred = 0u32;
    if unsafe { GetOverlappedResult(handle, &ov, &mut transferred, 1) } == 0 {
        let code = unsafe { GetLastError() };
        if code == ERROR_MORE_DATA {
            return Ok(transferred);
        }
        return Err(io::Error::from_raw_os_error(code as i32));
    }
    Ok(transferred)
}

/// One connected pipe instance, client or server side.
pub struct PipeConnection {
    handle: OwnedHandle,
    server: bool,
    closed: AtomicBool,
}

impl PipeConnection {
    fn new(handle: OwnedHandle, server: bool) -> Self {
        Self { handle, server, closed: AtomicBool::new(false) }
    }
}

impl Connection for PipeConnection {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::ConnectionAborted.into());
        }
        let h = self.handle.raw();
        let len = buf.len().min(u32::MAX as usize) as u32;
        let ptr = buf.as_mut_ptr();
        run_overlapped(h, |ov| unsafe { ReadFile(h, ptr, len, ptr::null_mut(), ov) })
            .map(|n| n as usize)
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let h = self.handle.raw();
        let len = data.len().min(u32::MAX as usize) as u32;
        run_overlapped(h, |ov| unsafe { WriteFile(h, data.as_ptr(), len, ptr::null_mut(), ov) })
            .map(|n| n as usize)
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        unsafe {
            CancelIoEx(self.handle.raw(), ptr::null());
            if self.server {
                DisconnectNamedPipe(self.handle.raw());
            }
        }
    }
}

/// Controller side: opens an existing pipe by name.
pub struct PipeConnector {
    path: Vec<u16>,
    display: String,
}

impl PipeConnector {
    pub fn new(name: &str) -> Self {
        let display = pipe_path(name);
        Self { path: wide(OsStr::new(&display)), display }
    }
}

impl Connector for PipeConnector {
    type Conn = PipeConnection;

    fn connect(&self, timeout: Duration) -> io::Result<PipeConnection> {
        let wait_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
        if unsafe { WaitNamedPipeW(self.path.as_ptr(), wait_ms) } == 0 {
            return Err(io::Error::last_os_error());
        }

        let raw = unsafe {
            CreateFileW(
                self.path.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null(),
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        let handle = OwnedHandle::new(raw).ok_or_else(io::Error::last_os_error)?;

        let mode = PIPE_READMODE_MESSAGE;
        if unsafe { SetNamedPipeHandleState(handle.raw(), &mode, ptr::null(), ptr::null()) } == 0 {
            return Err(io::Error::last_os_error());
        }

        debug!("opened {}", self.display);
        Ok(PipeConnection::new(handle, false))
    }
}

/// Module side: creates a fresh pipe instance per accepted connector.
pub struct PipeListener {
    path: Vec<u16>,
    display: String,
    /// Instance currently waiting in `ConnectNamedPipe`, as a raw value for `interrupt`.
    pending: Mutex<Option<usize>>,
    interrupted: AtomicBool,
}

impl PipeListener {
    pub fn new(name: &str) -> Self {
        let display = pipe_path(name);
        Self {
            path: wide(OsStr::new(&display)),
            display,
            pending: Mutex::new(None),
            interrupted: AtomicBool::new(false),
        }
    }

    fn set_pending(&self, value: Option<usize>) {
        *self.pending.lock().unwrap_or_else(|p| p.into_inner()) = value;
    }

    fn wait_for_client(&self, h: HANDLE) -> io::Result<()> {
        let event = manual_reset_event()?;
        let mut ov: OVERLAPPED = unsafe { std::mem::zeroed() };
        ov.hEvent = event.raw();

        if unsafe { ConnectNamedPipe(h, &mut ov) } == 0 {
            match unsafe { GetLastError() } {
                // Client attached between create and connect; the event is never signaled.
                ERROR_PIPE_CONNECTED => return Ok(()),
                ERROR_IO_PENDING => {}
                code => return Err(io::Error::from_raw_os_error(code as i32)),
            }
        }

        let mut unused = 0u32;
        if unsafe { GetOverlappedResult(h, &ov, &mut unused, 1) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Acceptor for PipeListener {
    type Conn = PipeConnection;

    fn accept(&self) -> io::Result<PipeConnection> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(io::ErrorKind::Interrupted.into());
        }

        let raw = unsafe {
            CreateNamedPipeW(
                self.path.as_ptr(),
                PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT,
                PIPE_UNLIMITED_INSTANCES,
                CHANNEL_BUFFER_SIZE as u32,
                CHANNEL_BUFFER_SIZE as u32,
                0,
                ptr::null(),
            )
        };
        let handle = OwnedHandle::new(raw).ok_or_else(io::Error::last_os_error)?;

        self.set_pending(Some(raw as usize));
        // interrupt() may have run before the instance was published.
        if self.interrupted.load(Ordering::SeqCst) {
            self.set_pending(None);
            return Err(io::ErrorKind::Interrupted.into());
        }
        let result = self.wait_for_client(raw);
        self.set_pending(None);
        result?;

        info!("client connected on {}", self.display);
        Ok(PipeConnection::new(handle, true))
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if let Some(raw) = *self.pending.lock().unwrap_or_else(|p| p.into_inner()) {
            unsafe {
                CancelIoEx(raw as HANDLE, ptr::null());
            }
        }
    }
}
