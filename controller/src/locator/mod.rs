//! Process Locator: finds the target process and its top-level window.
//!
//! Every call re-enumerates through a [`WindowEnumerator`]; nothing is cached between calls. The
//! polling loop that calls [`ProcessLocator::find_target`] belongs to the caller.

mod heuristics;
#[cfg(windows)]
mod win32;

pub use heuristics::TargetMatcher;
#[cfg(windows)]
pub use win32::Win32Enumerator;

use log::debug;
use shared::geometry::Rect;
use shared::handles::WindowHandle;

/// One top-level window as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCandidate {
    pub handle: WindowHandle,
    pub pid: u32,
    pub title: String,
    pub class_name: String,
    /// Screen rectangle including decorations.
    pub rect: Rect,
    pub client: Rect,
    pub visible: bool,
    pub iconic: bool,
}

/// One running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCandidate {
    pub pid: u32,
    pub image_name: String,
}

/// The located target. `window` is `None` when the process runs but no window qualified yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetProcess {
    pub pid: u32,
    pub window: Option<WindowHandle>,
}

/// Source of windows and processes, in OS enumeration order.
pub trait WindowEnumerator: Send + Sync {
    fn windows(&self) -> Vec<WindowCandidate>;
    fn processes(&self) -> Vec<ProcessCandidate>;
}

pub struct ProcessLocator<E> {
    enumerator: E,
    matcher: TargetMatcher,
}

impl<E: WindowEnumerator> ProcessLocator<E> {
    pub fn new(enumerator: E, matcher: TargetMatcher) -> Self {
        Self { enumerator, matcher }
    }

    pub fn set_matcher(&mut self, matcher: TargetMatcher) {
        self.matcher = matcher;
    }

    pub fn matcher(&self) -> &TargetMatcher {
        &self.matcher
    }

    /// First qualifying window in enumeration order, else the first process whose image name
    /// matches (with no window).
    pub fn find_target(&self) -> Option<TargetProcess> {
        if let Some(w) = self.enumerator.windows().into_iter().find(|w| self.matcher.accepts_window(w)) {
            debug!("target window {:?} `{}` [{}] in pid {}", w.handle, w.title, w.class_name, w.pid);
            return Some(TargetProcess { pid: w.pid, window: Some(w.handle) });
        }
        self.enumerator
            .processes()
            .into_iter()
            .find(|p| self.matcher.accepts_process(p))
            .map(|p| {
                debug!("target process {} `{}` has no qualifying window", p.pid, p.image_name);
                TargetProcess { pid: p.pid, window: None }
            })
    }

    /// Whether `pid` still shows up in the process list, matched or not.
    pub fn is_running(&self, pid: u32) -> bool {
        self.enumerator.processes().iter().any(|p| p.pid == pid)
    }
}

/// Fixed candidate lists, for tests and for hosts that enumerate on their own.
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    pub windows: Vec<WindowCandidate>,
    pub processes: Vec<ProcessCandidate>,
}

impl WindowEnumerator for StaticEnumerator {
    fn windows(&self) -> Vec<WindowCandidate> {
        self.windows.clone()
    }

    fn processes(&self) -> Vec<ProcessCandidate> {
        self.processes.clone()
    }
}

#[cfg(test)]
pub(crate) fn window(raw: usize, pid: u32, title: &str, class_name: &str, width: i32, height: i32) -> WindowCandidate {
    WindowCandidate {
        handle: WindowHandle::from_raw(raw),
        pid,
        title: title.into(),
        class_name: class_name.into(),
        rect: Rect::from_xywh(100, 100, width, height),
        client: Rect::from_xywh(0, 0, width - 16, height - 39),
        visible: true,
        iconic: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocatorConfig;

    fn locator(enumerator: StaticEnumerator) -> ProcessLocator<StaticEnumerator> {
        ProcessLocator::new(enumerator, TargetMatcher::from_config(&LocatorConfig::default()))
    }

    fn process(pid: u32, name: &str) -> ProcessCandidate {
        ProcessCandidate { pid, image_name: name.into() }
    }

    #[test]
    fn finds_example_game_window() {
        let loc = ProcessLocator::new(
            StaticEnumerator {
                windows: vec![
                    window(1, 10, "Untitled - Notepad", "Notepad", 800, 600),
                    window(2, 42, "ExampleGame \u{2014} Match", "ExampleGameWnd", 1280, 720),
                ],
                processes: vec![process(42, "ExampleGame.exe")],
            },
            TargetMatcher::from_config(&LocatorConfig {
                process_names: vec!["examplegame".into()],
                title_needles: vec!["examplegame".into()],
                title_keywords: vec!["match".into()],
                ..LocatorConfig::default()
            }),
        );
        assert_eq!(
            loc.find_target(),
            Some(TargetProcess { pid: 42, window: Some(WindowHandle::from_raw(2)) })
        );
    }

    #[test]
    fn first_match_in_enumeration_order_wins() {
        let loc = locator(StaticEnumerator {
            windows: vec![
                window(5, 1, "Dolphin 5.0 | 60 FPS", "wxWindowNR", 1024, 768),
                window(6, 2, "Faster Melee - Slippi", "wxWindowNR", 1024, 768),
            ],
            processes: vec![],
        });
        assert_eq!(loc.find_target().and_then(|t| t.window), Some(WindowHandle::from_raw(5)));
    }

    #[test]
    fn falls_back_to_process_without_window() {
        let loc = locator(StaticEnumerator {
            windows: vec![window(1, 7, "Slippi Launcher", "Chrome_WidgetWin_1", 1200, 800)],
            processes: vec![process(3, "explorer.exe"), process(7, "Slippi Dolphin.exe")],
        });
        assert_eq!(loc.find_target(), Some(TargetProcess { pid: 7, window: None }));
    }

    #[test]
    fn nothing_matches() {
        let loc = locator(StaticEnumerator {
            windows: vec![window(1, 3, "Inbox", "Outlook", 1200, 800)],
            processes: vec![process(3, "outlook.exe")],
        });
        assert_eq!(loc.find_target(), None);
    }

    #[test]
    fn every_call_re_enumerates() {
        let mut enumerator = StaticEnumerator::default();
        enumerator.windows.push(window(9, 4, "Dolphin | Melee", "DolphinClass", 800, 600));
        let mut loc = locator(enumerator);
        assert!(loc.find_target().is_some());

        loc.enumerator.windows.clear();
        assert_eq!(loc.find_target(), None);
    }

    #[test]
    fn is_running_ignores_matcher() {
        let loc = locator(StaticEnumerator {
            windows: vec![],
            processes: vec![process(3, "explorer.exe")],
        });
        assert!(loc.is_running(3));
        assert!(!loc.is_running(4));
    }
}
