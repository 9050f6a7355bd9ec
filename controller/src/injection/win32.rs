//! `LoadLibraryW` / `FreeLibrary` through a remote thread, with the module's own shutdown export
//! run in between.

use super::pe::{export_rva, ImageReader};
use super::LoaderBackend;
use crate::win32::{from_wide, wide, OwnedHandle};
use log::{debug, error};
use shared::constants::{MODULE_SHUTDOWN_EXPORT, MODULE_SHUTDOWN_TIMEOUT};
use shared::errors::InjectError;
use shared::handles::{ModuleHandle, ProcessHandle};
use std::ffi::{c_void, OsStr};
use std::io;
use std::mem::{size_of, transmute, zeroed};
use std::path::Path;
use std::ptr;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, STILL_ACTIVE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows_sys::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, MODULEENTRY32W, TH32CS_SNAPMODULE,
    TH32CS_SNAPMODULE32,
};
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows_sys::Win32::System::Memory::{
    VirtualAllocEx, VirtualFreeEx, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use windows_sys::Win32::System::Threading::{
    CreateRemoteThread, GetExitCodeProcess, GetExitCodeThread, OpenProcess, WaitForSingleObject,
    INFINITE, PROCESS_CREATE_THREAD, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
    PROCESS_VM_READ, PROCESS_VM_WRITE,
};

type ThreadStart = unsafe extern "system" fn(*mut c_void) -> u32;

fn last_error() -> String {
    io::Error::last_os_error().to_string()
}

fn raw(process: ProcessHandle) -> HANDLE {
    process.into_raw() as HANDLE
}

/// Memory committed inside the target. Released on drop, whatever happened in between.
struct RemoteBuffer {
    process: HANDLE,
    base: *mut c_void,
}

impl RemoteBuffer {
    fn alloc(process: HANDLE, pid: u32, len: usize) -> Result<Self, InjectError> {
        let base = unsafe { VirtualAllocEx(process, ptr::null(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
        if base.is_null() {
            return Err(InjectError::RemoteAlloc { pid, reason: last_error() });
        }
        Ok(Self { process, base })
    }

    fn write(&self, pid: u32, bytes: &[u8]) -> Result<(), InjectError> {
        let mut written = 0usize;
        let ok = unsafe {
            WriteProcessMemory(self.process, self.base, bytes.as_ptr().cast(), bytes.len(), &mut written)
        };
        if ok == 0 {
            return Err(InjectError::RemoteWrite { pid, reason: last_error() });
        }
        if written != bytes.len() {
            return Err(InjectError::RemoteWrite {
                pid,
                reason: format!("short write: {written} of {} bytes", bytes.len()),
            });
        }
        Ok(())
    }
}

impl Drop for RemoteBuffer {
    fn drop(&mut self) {
        unsafe {
            VirtualFreeEx(self.process, self.base, 0, MEM_RELEASE);
        }
    }
}

/// Address of a kernel32 export. kernel32 is mapped at the same base in every process of the
/// session, so the local address is valid in the target.
fn kernel32_export(symbol: &'static str) -> Result<ThreadStart, InjectError> {
    let module_name = wide(OsStr::new("kernel32.dll"));
    let module = unsafe { GetModuleHandleW(module_name.as_ptr()) };
    if module.is_null() {
        return Err(InjectError::ResolveEntryPoint { symbol, reason: last_error() });
    }
    let c_name: Vec<u8> = symbol.bytes().chain(Some(0)).collect();
    match unsafe { GetProcAddress(module, c_name.as_ptr()) } {
        // SAFETY: both exports take one pointer-sized argument and return a 32-bit-compatible value.
        Some(proc) => Ok(unsafe { transmute::<unsafe extern "system" fn() -> isize, ThreadStart>(proc) }),
        None => Err(InjectError::ResolveEntryPoint { symbol, reason: last_error() }),
    }
}

fn start_remote(process: HANDLE, pid: u32, entry: ThreadStart, param: *const c_void) -> Result<OwnedHandle, InjectError> {
    let thread = unsafe {
        CreateRemoteThread(process, ptr::null(), 0, Some(entry), param, 0, ptr::null_mut())
    };
    OwnedHandle::new(thread).ok_or_else(|| InjectError::CreateRemoteThread { pid, reason: last_error() })
}

/// Starts `entry(param)` in the target, waits for it without timeout and returns its exit code.
fn run_remote(process: HANDLE, pid: u32, entry: ThreadStart, param: *const c_void) -> Result<u32, InjectError> {
    let thread = start_remote(process, pid, entry, param)?;
    unsafe { WaitForSingleObject(thread.raw(), INFINITE) };
    let mut code = 0u32;
    if unsafe { GetExitCodeThread(thread.raw(), &mut code) } == 0 {
        error!("GetExitCodeThread in process {pid} failed: {}", last_error());
        return Ok(0);
    }
    Ok(code)
}

/// Full base address of `file_name` in `pid`, from a module snapshot.
fn find_module_base(pid: u32, file_name: &OsStr) -> Option<usize> {
    let snapshot = OwnedHandle::new(unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) })?;
    let wanted = file_name.to_string_lossy().to_lowercase();

    let mut entry: MODULEENTRY32W = unsafe { zeroed() };
    entry.dwSize = size_of::<MODULEENTRY32W>() as u32;
    let mut more = unsafe { Module32FirstW(snapshot.raw(), &mut entry) } != 0;
    while more {
        if from_wide(&entry.szModule).to_lowercase() == wanted {
            return Some(entry.modBaseAddr as usize);
        }
        more = unsafe { Module32NextW(snapshot.raw(), &mut entry) } != 0;
    }
    None
}

/// A module image mapped in the target, read through `ReadProcessMemory`.
struct RemoteImage {
    process: HANDLE,
    base: usize,
}

impl ImageReader for RemoteImage {
    fn read(&self, rva: u32, buf: &mut [u8]) -> bool {
        let Some(addr) = self.base.checked_add(rva as usize) else {
            return false;
        };
        let mut read = 0usize;
        let ok = unsafe {
            ReadProcessMemory(self.process, addr as *const c_void, buf.as_mut_ptr().cast(), buf.len(), &mut read)
        };
        ok != 0 && read == buf.len()
    }
}

/// Classic remote-thread loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Loader;

impl LoaderBackend for Win32Loader {
    fn open_process(&self, pid: u32) -> Result<ProcessHandle, InjectError> {
        let access = PROCESS_CREATE_THREAD
            | PROCESS_QUERY_INFORMATION
            | PROCESS_VM_OPERATION
            | PROCESS_VM_WRITE
            | PROCESS_VM_READ;
        let handle = unsafe { OpenProcess(access, 0, pid) };
        if handle.is_null() {
            return Err(InjectError::OpenProcess { pid, reason: last_error() });
        }
        let process = ProcessHandle::from_raw(handle as usize);
        if !self.is_alive(process) {
            self.close_process(process);
            return Err(InjectError::ProcessGone { pid });
        }
        Ok(process)
    }

    fn is_alive(&self, process: ProcessHandle) -> bool {
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(raw(process), &mut code) != 0 && code == STILL_ACTIVE as u32 }
    }

    fn load_module(&self, process: ProcessHandle, pid: u32, path: &Path) -> Result<ModuleHandle, InjectError> {
        let file_name = path.file_name().ok_or_else(|| InjectError::InvalidPath(path.to_path_buf()))?;
        let path_w = wide(path.as_os_str());
        let bytes: Vec<u8> = path_w.iter().flat_map(|c| c.to_le_bytes()).collect();

        let buffer = RemoteBuffer::alloc(raw(process), pid, bytes.len())?;
        buffer.write(pid, &bytes)?;
        let entry = kernel32_export("LoadLibraryW")?;
        let code = run_remote(raw(process), pid, entry, buffer.base)?;
        if code == 0 {
            return Err(InjectError::NullModule { pid });
        }

        // The exit code holds only the low 32 bits of the module base.
        let base = find_module_base(pid, file_name).unwrap_or_else(|| {
            debug!("module snapshot of {pid} missed {}; using thread exit code", file_name.to_string_lossy());
            code as usize
        });
        Ok(ModuleHandle::from_raw(base))
    }

    fn shutdown_module(&self, process: ProcessHandle, pid: u32, module: ModuleHandle) -> Result<(), InjectError> {
        let symbol = MODULE_SHUTDOWN_EXPORT;
        let base = module.into_raw();
        let image = RemoteImage { process: raw(process), base };
        let rva = export_rva(&image, symbol).ok_or_else(|| InjectError::ResolveEntryPoint {
            symbol,
            reason: format!("no such export in the module at {base:#x}"),
        })?;
        // SAFETY: the export has the thread-start signature.
        let entry = unsafe { transmute::<usize, ThreadStart>(base + rva as usize) };

        let thread = start_remote(raw(process), pid, entry, ptr::null())?;
        let timeout_ms = MODULE_SHUTDOWN_TIMEOUT.as_millis() as u32;
        match unsafe { WaitForSingleObject(thread.raw(), timeout_ms) } {
            WAIT_OBJECT_0 => Ok(()),
            WAIT_TIMEOUT => Err(InjectError::Shutdown {
                pid,
                reason: format!("{symbol} did not return within {MODULE_SHUTDOWN_TIMEOUT:?}"),
            }),
            _ => Err(InjectError::Shutdown { pid, reason: last_error() }),
        }
    }

    fn unload_module(&self, process: ProcessHandle, pid: u32, module: ModuleHandle) -> Result<(), InjectError> {
        let entry = kernel32_export("FreeLibrary")?;
        let code = run_remote(raw(process), pid, entry, module.into_raw() as *const c_void)?;
        if code == 0 {
            return Err(InjectError::Unload { pid, reason: "FreeLibrary returned FALSE".into() });
        }
        Ok(())
    }

    fn close_process(&self, process: ProcessHandle) {
        unsafe {
            CloseHandle(raw(process));
        }
    }
}
