use crate::locator::TargetProcess;
use shared::handles::WindowHandle;
use std::fmt;

/// Which side of a bridge went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostResource {
    TargetWindow(WindowHandle),
    ContainerWindow(WindowHandle),
    TargetProcess(u32),
}

/// Lifecycle notifications for the host UI. Delivered on the monitor thread's schedule; receivers
/// that were dropped are pruned on the next send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeNotice {
    TargetFound(TargetProcess),
    Injected { pid: u32 },
    InjectionFailed { pid: u32, stage: &'static str, message: String },
    Connected,
    Disconnected,
    Embedded { container: WindowHandle, target: WindowHandle },
    Lost(LostResource),
}

impl fmt::Display for LostResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LostResource::TargetWindow(w) => write!(f, "game window {w:?} closed"),
            LostResource::ContainerWindow(w) => write!(f, "container window {w:?} closed"),
            LostResource::TargetProcess(pid) => write!(f, "game process {pid} exited"),
        }
    }
}

impl fmt::Display for BridgeNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeNotice::TargetFound(t) => match t.window {
                Some(w) => write!(f, "found game process {} with window {w:?}", t.pid),
                None => write!(f, "found game process {} (no window yet)", t.pid),
            },
            BridgeNotice::Injected { pid } => write!(f, "overlay module loaded into process {pid}"),
            BridgeNotice::InjectionFailed { pid, stage, message } => {
                write!(f, "loading overlay module into {pid} failed at {stage}: {message}")
            }
            BridgeNotice::Connected => f.write_str("overlay channel connected"),
            BridgeNotice::Disconnected => f.write_str("overlay channel disconnected"),
            BridgeNotice::Embedded { container, target } => {
                write!(f, "game window {target:?} embedded into {container:?}")
            }
            BridgeNotice::Lost(what) => write!(f, "{what}; searching again"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_notice_names_the_side() {
        let n = BridgeNotice::Lost(LostResource::ContainerWindow(WindowHandle::from_raw(0x10)));
        assert!(n.to_string().starts_with("container window"));
        let n = BridgeNotice::Lost(LostResource::TargetProcess(7));
        assert_eq!(n.to_string(), "game process 7 exited; searching again");
    }
}
