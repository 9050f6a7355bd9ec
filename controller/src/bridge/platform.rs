use crate::embedding::WindowOps;
use crate::injection::LoaderBackend;
use crate::locator::WindowEnumerator;
use shared::channel::{Connection, Connector};
use shared::handles::WindowHandle;

/// Everything the monitor needs from the operating system, bundled so tests can swap the whole
/// set for in-memory doubles.
pub trait Platform: Send + Sync + 'static {
    type Enumerator: WindowEnumerator + 'static;
    type Loader: LoaderBackend + 'static;
    type Windows: WindowOps + 'static;
    type Conn: Connection;
    type Connector: Connector<Conn = Self::Conn>;

    fn enumerator(&self) -> Self::Enumerator;
    fn loader(&self) -> Self::Loader;
    fn window_ops(&self) -> Self::Windows;
    fn connector(&self, channel_name: &str) -> Self::Connector;
    /// Looks up the controller's own container window by title.
    fn find_container(&self, title: &str) -> Option<WindowHandle>;
}

#[cfg(windows)]
pub use win32::Win32Platform;

#[cfg(windows)]
mod win32 {
    use super::Platform;
    use crate::embedding::{find_window_by_title, Win32WindowOps};
    use crate::injection::Win32Loader;
    use crate::locator::Win32Enumerator;
    use shared::channel::{PipeConnection, PipeConnector};
    use shared::handles::WindowHandle;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct Win32Platform;

    impl Platform for Win32Platform {
        type Enumerator = Win32Enumerator;
        type Loader = Win32Loader;
        type Windows = Win32WindowOps;
        type Conn = PipeConnection;
        type Connector = PipeConnector;

        fn enumerator(&self) -> Win32Enumerator {
            Win32Enumerator
        }

        fn loader(&self) -> Win32Loader {
            Win32Loader
        }

        fn window_ops(&self) -> Win32WindowOps {
            Win32WindowOps
        }

        fn connector(&self, channel_name: &str) -> PipeConnector {
            PipeConnector::new(channel_name)
        }

        fn find_container(&self, title: &str) -> Option<WindowHandle> {
            find_window_by_title(title)
        }
    }
}
