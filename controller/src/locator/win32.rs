use super::{ProcessCandidate, WindowCandidate, WindowEnumerator};
use crate::win32::{from_wide, rect, window_handle, OwnedHandle};
use log::warn;
use std::io;
use std::mem::{size_of, zeroed};
use windows_sys::Win32::Foundation::{HWND, LPARAM, RECT};
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetClientRect, GetWindowRect, GetWindowTextW,
    GetWindowThreadProcessId, IsIconic, IsWindowVisible,
};

/// Enumerates top-level windows with `EnumWindows` and processes with a Toolhelp snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Enumerator;

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> i32 {
    let out = unsafe { &mut *(lparam as *mut Vec<HWND>) };
    out.push(hwnd);
    1
}

fn describe(hwnd: HWND) -> WindowCandidate {
    let mut title = [0u16; 256];
    let mut class = [0u16; 256];
    let mut pid = 0u32;
    let mut outer: RECT = unsafe { zeroed() };
    let mut client: RECT = unsafe { zeroed() };
    unsafe {
        let n = GetWindowTextW(hwnd, title.as_mut_ptr(), title.len() as i32).max(0) as usize;
        title[n.min(title.len() - 1)] = 0;
        let n = GetClassNameW(hwnd, class.as_mut_ptr(), class.len() as i32).max(0) as usize;
        class[n.min(class.len() - 1)] = 0;
        GetWindowThreadProcessId(hwnd, &mut pid);
        GetWindowRect(hwnd, &mut outer);
        GetClientRect(hwnd, &mut client);
    }
    WindowCandidate {
        handle: window_handle(hwnd),
        pid,
        title: from_wide(&title),
        class_name: from_wide(&class),
        rect: rect(&outer),
        client: rect(&client),
        visible: unsafe { IsWindowVisible(hwnd) } != 0,
        iconic: unsafe { IsIconic(hwnd) } != 0,
    }
}

impl WindowEnumerator for Win32Enumerator {
    fn windows(&self) -> Vec<WindowCandidate> {
        let mut handles: Vec<HWND> = Vec::new();
        let ok = unsafe { EnumWindows(Some(collect_window), &mut handles as *mut Vec<HWND> as LPARAM) };
        if ok == 0 {
            warn!("EnumWindows failed: {}", io::Error::last_os_error());
        }
        handles.into_iter().map(describe).collect()
    }

    fn processes(&self) -> Vec<ProcessCandidate> {
        let Some(snapshot) = OwnedHandle::new(unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }) else {
            warn!("process snapshot failed: {}", io::Error::last_os_error());
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut entry: PROCESSENTRY32W = unsafe { zeroed() };
        entry.dwSize = size_of::<PROCESSENTRY32W>() as u32;
        let mut more = unsafe { Process32FirstW(snapshot.raw(), &mut entry) } != 0;
        while more {
            out.push(ProcessCandidate {
                pid: entry.th32ProcessID,
                image_name: from_wide(&entry.szExeFile),
            });
            more = unsafe { Process32NextW(snapshot.raw(), &mut entry) } != 0;
        }
        out
    }
}
