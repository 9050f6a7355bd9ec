//! Remote Module Loader: maps the helper module into the target and unloads it again.

mod injector;
mod path;
mod pe;
#[cfg(windows)]
mod win32;

pub use injector::{InjectionRecord, Injector, LoaderBackend};
pub use path::resolve_module_path;
#[cfg(windows)]
pub use win32::Win32Loader;

#[cfg(test)]
pub(crate) use injector::mock::MockLoader;
